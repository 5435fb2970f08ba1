use anyhow::Result;
use async_trait::async_trait;
use grammers_client::{button, grammers_tl_types as tl, reply_markup, types::InputMessage};
use tracing::debug;

use crate::client::TgClient;
use tg_core::msg::{Button, StatusSink, StyledMessage, TextPart};

/// 把核心层的样式消息编辑到聊天中的状态消息
pub struct TgStatusSink {
    client: TgClient,
}

impl TgStatusSink {
    pub fn new(client: TgClient) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self { client })
    }
}

fn utf16_len(s: &str) -> i32 {
    s.chars().map(|c| c.len_utf16() as i32).sum()
}

/// 样式片段转为文本 + Telegram 实体 (偏移按 UTF-16 计)
pub fn render_message(message: &StyledMessage) -> (String, Vec<tl::enums::MessageEntity>) {
    let mut text = String::new();
    let mut entities = Vec::new();
    let mut offset: i32 = 0;

    for part in &message.parts {
        match part {
            TextPart::Plain(s) => {
                text.push_str(s);
                offset += utf16_len(s);
            }
            TextPart::Bold(s) => {
                let length = utf16_len(s);
                entities.push(tl::enums::MessageEntity::Bold(tl::types::MessageEntityBold {
                    offset,
                    length,
                }));
                text.push_str(s);
                offset += length;
            }
            TextPart::Code(s) => {
                let length = utf16_len(s);
                entities.push(tl::enums::MessageEntity::Code(tl::types::MessageEntityCode {
                    offset,
                    length,
                }));
                text.push_str(s);
                offset += length;
            }
        }
    }

    (text, entities)
}

#[async_trait]
impl StatusSink for TgStatusSink {
    async fn edit_status(
        &self,
        chat_id: i64,
        message_id: i32,
        message: &StyledMessage,
        buttons: &[Button],
    ) -> Result<()> {
        let (text, entities) = render_message(message);

        let mut input = InputMessage::new().text(text);
        if !entities.is_empty() {
            input = input.fmt_entities(entities);
        }
        if !buttons.is_empty() {
            let row: Vec<_> = buttons
                .iter()
                .map(|b| button::inline(b.text.clone(), b.data.as_bytes().to_vec()))
                .collect();
            input = input.reply_markup(&reply_markup::inline(vec![row]));
        }

        let peer = TgClient::dialog_peer(chat_id);
        self.client
            .client()
            .edit_message(peer, message_id, input)
            .await?;
        debug!("状态消息已更新: chat={} msg={}", chat_id, message_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_offsets_are_utf16() {
        let mut message = StyledMessage::default();
        message.bold("标题").plain("\n").code("文件名.pdf");

        let (text, entities) = render_message(&message);
        assert_eq!(text, "标题\n文件名.pdf");
        assert_eq!(entities.len(), 2);

        match &entities[0] {
            tl::enums::MessageEntity::Bold(e) => {
                assert_eq!(e.offset, 0);
                assert_eq!(e.length, 2);
            }
            other => panic!("应为 Bold: {:?}", other),
        }
        match &entities[1] {
            tl::enums::MessageEntity::Code(e) => {
                // "标题\n" 共 3 个 UTF-16 单元
                assert_eq!(e.offset, 3);
                assert_eq!(e.length, 7);
            }
            other => panic!("应为 Code: {:?}", other),
        }
    }

    #[test]
    fn test_render_emoji_counts_two_units() {
        let mut message = StyledMessage::default();
        message.plain("🚀").bold("x");

        let (_, entities) = render_message(&message);
        match &entities[0] {
            tl::enums::MessageEntity::Bold(e) => assert_eq!(e.offset, 2),
            other => panic!("应为 Bold: {:?}", other),
        }
    }
}
