use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::engine::TaskEngine;
use crate::model::TGFile;
use crate::msg::StatusSink;
use crate::rename::RenameService;
use storage::StorageManager;

/// 媒体字节来源, 由 tgclient 基于 MTProto 实现
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// 打开流式读取器
    async fn open_stream(
        &self,
        file: &TGFile,
    ) -> anyhow::Result<Box<dyn AsyncRead + Send + Unpin>>;

    /// 完整下载到本地文件, 进度增量累加到 counter
    async fn download_to_file(
        &self,
        file: &TGFile,
        dest: &Path,
        counter: Arc<AtomicI64>,
    ) -> anyhow::Result<()>;
}

/// 显式的运行时聚合, 处理入口只闭包这一个对象
///
/// 存储注册表、重命名服务、任务引擎等都从这里取, 不设模块级全局量。
pub struct Runtime {
    pub config: config::AppConfig,
    pub db: database::Database,
    pub engine: Arc<TaskEngine>,
    pub storages: Arc<StorageManager>,
    pub rename: Arc<RenameService>,
    pub source: Arc<dyn MediaSource>,
    pub status: Arc<dyn StatusSink>,
}

impl Runtime {
    /// 用户默认存储; 未设置或不可解析时返回 None
    pub async fn default_storage(
        &self,
        chat_id: i64,
    ) -> Option<Arc<dyn storage::Storage>> {
        let user = database::queries::get_user_by_chat_id(&self.db, chat_id)
            .await
            .ok()??;
        if user.default_storage.is_empty() {
            return None;
        }
        self.storages
            .get_user_storage_by_name(chat_id, &user.default_storage)
            .await
            .ok()
    }
}
