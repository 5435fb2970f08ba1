use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncRead;

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Alist,
    Webdav,
    Local,
    Telegram,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Alist => "alist",
            StorageKind::Webdav => "webdav",
            StorageKind::Local => "local",
            StorageKind::Telegram => "telegram",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "alist" => Some(StorageKind::Alist),
            "webdav" => Some(StorageKind::Webdav),
            "local" => Some(StorageKind::Local),
            "telegram" => Some(StorageKind::Telegram),
            _ => None,
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 上传数据来源
///
/// 声明 cannot_stream 的后端总是拿到已落盘的缓存文件 (local_path 非空),
/// 需要重试的驱动重新打开该文件, 而不是把整个文件留在内存里。
pub struct SaveSource<'a> {
    reader: &'a mut (dyn AsyncRead + Send + Unpin),
    local_path: Option<&'a Path>,
    size: i64,
}

impl<'a> SaveSource<'a> {
    pub fn stream(reader: &'a mut (dyn AsyncRead + Send + Unpin), size: i64) -> Self {
        Self {
            reader,
            local_path: None,
            size,
        }
    }

    pub fn staged(
        reader: &'a mut (dyn AsyncRead + Send + Unpin),
        local_path: &'a Path,
        size: i64,
    ) -> Self {
        Self {
            reader,
            local_path: Some(local_path),
            size,
        }
    }

    pub fn reader(&mut self) -> &mut (dyn AsyncRead + Send + Unpin) {
        self.reader
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path
    }

    pub fn size(&self) -> i64 {
        self.size
    }
}

/// 统一的存储后端能力
#[async_trait]
pub trait Storage: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> StorageKind;

    /// 把逻辑路径拼接到后端根目录下
    fn join_storage_path(&self, path: &str) -> String;

    /// 返回非空原因时, 任务引擎必须先把文件完整落盘再调用 save
    fn cannot_stream(&self) -> Option<&'static str> {
        None
    }

    async fn save(
        &self,
        source: &mut SaveSource<'_>,
        storage_path: &str,
    ) -> Result<(), StorageError>;

    /// 确认存在返回 true, 确认不存在返回 false; 无法确认时必须返回错误而不是 false
    async fn exists(&self, storage_path: &str) -> Result<bool, StorageError>;
}

/// 以 '/' 拼接并去掉重复分隔符
pub fn join_path(base: &str, rest: &str) -> String {
    let base = base.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    let joined = if base.is_empty() {
        format!("/{}", rest)
    } else if rest.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, rest)
    };

    let mut result = String::with_capacity(joined.len());
    let mut prev_slash = false;
    for ch in joined.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        result.push(ch);
    }
    result
}

/// 在扩展名前追加冲突后缀: base_1.ext, base_2.ext ...
pub fn collision_candidate(storage_path: &str, index: usize) -> String {
    let (base, ext) = split_extension(storage_path);
    format!("{}_{}{}", base, index, ext)
}

/// 按最后一个路径分段中的最后一个 '.' 切分扩展名 (含点)
pub fn split_extension(path: &str) -> (&str, &str) {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => path.split_at(name_start + dot),
        _ => (path, ""),
    }
}
