use grammers_client::grammers_tl_types as tl;
use grammers_client::types::photo_sizes::VecExt;
use tracing::debug;

use crate::client::IncomingUpdate;
use tg_core::model::{FileLocation, MediaKind, TGFile};

/// 把新消息转换为提交入口的形态; 服务消息与空消息丢弃
pub fn incoming_from_message(message: &grammers_client::types::Message) -> Option<IncomingUpdate> {
    if message.action().is_some() {
        return None;
    }

    let chat_id = message.peer_id().bot_api_dialog_id();
    let text = message.text().to_string();
    let file = tgfile_from_message(message);

    if text.trim().is_empty() && file.is_none() {
        return None;
    }

    Some(IncomingUpdate::Message {
        chat_id,
        message_id: message.id() as i64,
        text,
        file,
    })
}

pub fn incoming_from_callback(
    query: &grammers_client::types::CallbackQuery,
) -> Option<IncomingUpdate> {
    let data = String::from_utf8(query.data().to_vec()).ok()?;
    Some(IncomingUpdate::Callback {
        chat_id: query.chat().id(),
        data,
    })
}

/// 从消息媒体提取可下载描述; 保留原始定位字段, 核心层不接触 grammers 类型
pub fn tgfile_from_message(message: &grammers_client::types::Message) -> Option<TGFile> {
    let chat_id = message.peer_id().bot_api_dialog_id();
    let text = message.text().to_string();
    let grouped_id = message.grouped_id();

    match message.media() {
        Some(grammers_client::types::Media::Photo(photo)) => {
            let thumbs = photo.thumbs();
            let largest = thumbs.largest();
            let (size, thumb_type) = match largest {
                Some(thumb) => (thumb.size() as i64, thumb.photo_type()),
                None => (0, String::new()),
            };

            let raw = match &photo.raw.photo {
                Some(tl::enums::Photo::Photo(p)) => p,
                _ => {
                    debug!("照片缺少原始字段: msg={}", message.id());
                    return None;
                }
            };

            Some(TGFile {
                name: String::new(),
                size,
                mime_type: None,
                kind: MediaKind::Photo,
                location: FileLocation {
                    media_id: raw.id,
                    access_hash: raw.access_hash,
                    file_reference: raw.file_reference.clone(),
                    thumb_size: thumb_type,
                },
                chat_id,
                message_id: message.id() as i64,
                message_text: text,
                grouped_id,
            })
        }
        Some(grammers_client::types::Media::Document(doc)) => {
            let raw = doc.raw.document.as_ref().and_then(|d| match d {
                tl::enums::Document::Document(inner) => Some(inner),
                _ => None,
            })?;

            let mime = doc.mime_type().map(|m| m.to_string());
            let kind = if mime
                .as_deref()
                .map(|m| m.starts_with("video/"))
                .unwrap_or(false)
            {
                MediaKind::Video
            } else {
                MediaKind::Document
            };

            Some(TGFile {
                name: doc.name().to_string(),
                size: doc.size(),
                mime_type: mime,
                kind,
                location: FileLocation {
                    media_id: raw.id,
                    access_hash: raw.access_hash,
                    file_reference: raw.file_reference.clone(),
                    thumb_size: String::new(),
                },
                chat_id,
                message_id: message.id() as i64,
                message_text: text,
                grouped_id,
            })
        }
        _ => None,
    }
}
