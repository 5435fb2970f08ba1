use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

use crate::model::TaskKind;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("任务已取消")]
    Canceled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<storage::StorageError> for TaskError {
    fn from(err: storage::StorageError) -> Self {
        match err {
            storage::StorageError::Canceled => TaskError::Canceled,
            other => TaskError::Other(anyhow::anyhow!(other)),
        }
    }
}

/// 每个任务独立的取消句柄
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 一直等到被取消; 先注册再查标志, 避免丢通知
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_canceled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// 进度展示用的任务摘要
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub task_id: String,
    pub file_name: String,
    pub total_size: i64,
    pub storage_name: String,
    pub storage_path: String,
    /// 批量任务的文件数, 单文件为 1
    pub file_count: usize,
}

/// 任务引擎调度的工作单元
///
/// execute 内部负责响应取消、清理缓存文件并通过 tracker 发出
/// 起止事件; 引擎只保证恰好调用一次。
#[async_trait]
pub trait Task: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> TaskKind;

    fn chat_id(&self) -> i64;

    async fn execute(&self, cancel: CancelHandle) -> Result<(), TaskError>;

    /// 出队前就被取消时调用, 只发终态事件, 不打开任何读取器
    async fn report_canceled(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_handle_wakes_waiter() {
        let handle = CancelHandle::new();
        let waiter = handle.clone();
        let join = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert!(tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .unwrap()
            .unwrap());
    }

    #[tokio::test]
    async fn test_cancel_before_wait_returns_immediately() {
        let handle = CancelHandle::new();
        handle.cancel();
        tokio::time::timeout(Duration::from_millis(100), handle.cancelled())
            .await
            .unwrap();
    }
}
