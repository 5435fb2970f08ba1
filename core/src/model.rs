#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Tgfile,
    BatchTgfile,
    TphPics,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Tgfile => "tgfile",
            TaskKind::BatchTgfile => "batchtgfile",
            TaskKind::TphPics => "tphpics",
        }
    }
}

/// MTProto 可解析为字节流的不透明位置句柄
///
/// 只保留原始标识字段, 核心 crate 不依赖具体客户端库。
#[derive(Debug, Clone)]
pub struct FileLocation {
    pub media_id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
    /// 照片下载需要的尺寸类型, 文档为空
    pub thumb_size: String,
}

/// 一条可下载的 Telegram 媒体
#[derive(Debug, Clone)]
pub struct TGFile {
    /// 原始文件名, 可能为空 (照片没有文件名)
    pub name: String,
    pub size: i64,
    pub mime_type: Option<String>,
    pub kind: MediaKind,
    pub location: FileLocation,
    pub chat_id: i64,
    pub message_id: i64,
    /// 所在消息的文本, 供重命名与规则匹配使用
    pub message_text: String,
    pub grouped_id: Option<i64>,
}

impl TGFile {
    pub fn is_album(&self) -> bool {
        matches!(self.grouped_id, Some(id) if id != 0)
    }

    /// 展示与落盘时使用的名字, 永不为空
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        format!("{}{}", self.message_id, self.extension())
    }

    /// 扩展名 (含点): 原始文件名 > MIME 推断 > 照片默认 .jpg > 空
    pub fn extension(&self) -> String {
        if let Some(idx) = self.name.rfind('.') {
            if idx > 0 {
                return self.name[idx..].to_string();
            }
        }

        if self.kind == MediaKind::Document || self.kind == MediaKind::Video {
            if let Some(mime) = &self.mime_type {
                if let Some(exts) = mime_guess::get_mime_extensions_str(mime) {
                    if let Some(ext) = exts.first() {
                        return format!(".{}", ext);
                    }
                }
            }
        }

        if self.kind == MediaKind::Photo {
            return ".jpg".to_string();
        }

        String::new()
    }
}
