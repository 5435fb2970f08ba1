use std::sync::Arc;

use config::StorageConfig;

use crate::alist::AlistStorage;
use crate::error::StorageError;
use crate::local::LocalStorage;
use crate::telegram::{ChannelUploader, TelegramStorage};
use crate::traits::Storage;
use crate::webdav::WebdavStorage;

/// 按配置类型分发到对应驱动, 构造前先做类型级校验
pub async fn new_storage(
    config: &StorageConfig,
    uploader: Option<Arc<dyn ChannelUploader>>,
) -> Result<Arc<dyn Storage>, StorageError> {
    config
        .validate()
        .map_err(|e| StorageError::Validation(e.to_string()))?;

    let storage: Arc<dyn Storage> = match config {
        StorageConfig::Alist(c) => AlistStorage::new(c.clone()).await?,
        StorageConfig::Webdav(c) => Arc::new(WebdavStorage::new(c.clone())?),
        StorageConfig::Local(c) => Arc::new(LocalStorage::new(c.clone())?),
        StorageConfig::Telegram(c) => {
            let uploader = uploader.ok_or_else(|| {
                StorageError::Validation("Telegram 存储需要客户端上传通道".to_string())
            })?;
            Arc::new(TelegramStorage::new(c.clone(), uploader)?)
        }
    };
    Ok(storage)
}
