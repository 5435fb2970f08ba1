use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use config::TelegramConfig;

use crate::error::StorageError;
use crate::traits::{SaveSource, Storage, StorageKind};

/// 客户端侧的上传能力, 由 tgclient 实现
#[async_trait]
pub trait ChannelUploader: Send + Sync {
    async fn upload_file(
        &self,
        chat_id: i64,
        local_path: &Path,
        filename: &str,
    ) -> anyhow::Result<()>;

    async fn chat_accessible(&self, chat_id: i64) -> bool;
}

/// 把文件转发到指定会话的存储后端
pub struct TelegramStorage {
    config: TelegramConfig,
    uploader: Arc<dyn ChannelUploader>,
}

impl TelegramStorage {
    pub fn new(
        config: TelegramConfig,
        uploader: Arc<dyn ChannelUploader>,
    ) -> Result<Self, StorageError> {
        if config.chat_id == 0 {
            return Err(StorageError::Validation("Telegram 存储缺少 chat_id".to_string()));
        }
        Ok(Self { config, uploader })
    }
}

#[async_trait]
impl Storage for TelegramStorage {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Telegram
    }

    fn join_storage_path(&self, path: &str) -> String {
        path.to_string()
    }

    fn cannot_stream(&self) -> Option<&'static str> {
        Some("Telegram 上传需要已知大小的完整文件")
    }

    async fn save(
        &self,
        source: &mut SaveSource<'_>,
        storage_path: &str,
    ) -> Result<(), StorageError> {
        let local_path = source.local_path().ok_or_else(|| {
            StorageError::Validation("Telegram 存储需要先落盘的缓存文件".to_string())
        })?;

        let filename = storage_path
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("file");

        self.uploader
            .upload_file(self.config.chat_id, local_path, filename)
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        info!(
            "Telegram[{}] 文件已发送到会话 {}: {}",
            self.config.name, self.config.chat_id, filename
        );
        Ok(())
    }

    async fn exists(&self, storage_path: &str) -> Result<bool, StorageError> {
        let _ = storage_path;
        // 会话没有路径命名空间; 可达即视为"不存在冲突"
        if self.uploader.chat_accessible(self.config.chat_id).await {
            Ok(false)
        } else {
            Err(StorageError::Transport(format!(
                "无法访问目标会话 {}",
                self.config.chat_id
            )))
        }
    }
}
