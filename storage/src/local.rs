use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use config::LocalConfig;

use crate::error::StorageError;
use crate::traits::{collision_candidate, join_path, SaveSource, Storage, StorageKind};

/// 本地磁盘存储
pub struct LocalStorage {
    config: LocalConfig,
}

impl LocalStorage {
    pub fn new(config: LocalConfig) -> Result<Self, StorageError> {
        if config.base_path.trim().is_empty() {
            return Err(StorageError::Validation("本地存储缺少 base_path".to_string()));
        }
        Ok(Self { config })
    }

    fn fs_path(&self, storage_path: &str) -> PathBuf {
        PathBuf::from(storage_path)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    fn join_storage_path(&self, path: &str) -> String {
        join_path(&self.config.base_path, path)
    }

    async fn save(
        &self,
        source: &mut SaveSource<'_>,
        storage_path: &str,
    ) -> Result<(), StorageError> {
        let storage_path = match common::validate_storage_path(storage_path) {
            Ok(()) => storage_path.to_string(),
            Err(reason) => {
                warn!("Local[{}] 路径未通过校验 ({}), 尝试清理", self.config.name, reason);
                let sanitized = common::sanitize_storage_path(storage_path);
                common::validate_storage_path(&sanitized).map_err(StorageError::Safety)?;
                sanitized
            }
        };

        let mut candidate = storage_path.clone();
        let mut index = 1;
        while tokio::fs::try_exists(self.fs_path(&candidate)).await? {
            candidate = collision_candidate(&storage_path, index);
            index += 1;
        }

        let target = self.fs_path(&candidate);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&target).await?;
        tokio::io::copy(source.reader(), &mut file).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        info!("Local[{}] 文件已保存: {:?}", self.config.name, target);
        Ok(())
    }

    async fn exists(&self, storage_path: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(Path::new(storage_path)).await?)
    }
}
