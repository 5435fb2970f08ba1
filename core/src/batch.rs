use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::model::{TGFile, TaskKind};
use crate::progress::{ProgressReader, ProgressTracker};
use crate::runtime::MediaSource;
use crate::task::{CancelHandle, Task, TaskError, TaskInfo};
use storage::{SaveSource, Storage};

/// 批量任务中的一个元素: 已解析好存储与目标路径的单个文件
pub struct TaskElement {
    pub storage: Arc<dyn Storage>,
    pub storage_path: String,
    pub file: TGFile,
}

/// 批量传输任务; 元素在同一个 worker 上按提交顺序执行
pub struct BatchTask {
    id: String,
    chat_id: i64,
    elements: Vec<TaskElement>,
    tracker: Arc<dyn ProgressTracker>,
    source: Arc<dyn MediaSource>,
    global_stream: bool,
    temp_base: PathBuf,
}

impl BatchTask {
    pub fn new(
        id: String,
        chat_id: i64,
        elements: Vec<TaskElement>,
        tracker: Arc<dyn ProgressTracker>,
        source: Arc<dyn MediaSource>,
        global_stream: bool,
        temp_base: PathBuf,
    ) -> Self {
        Self {
            id,
            chat_id,
            elements,
            tracker,
            source,
            global_stream,
            temp_base,
        }
    }

    pub fn total_size(&self) -> i64 {
        self.elements.iter().map(|e| e.file.size).sum()
    }

    pub fn count(&self) -> usize {
        self.elements.len()
    }

    fn info(&self) -> TaskInfo {
        let first_name = self
            .elements
            .first()
            .map(|e| e.file.display_name())
            .unwrap_or_default();
        TaskInfo {
            task_id: self.id.clone(),
            file_name: first_name,
            total_size: self.total_size(),
            storage_name: self
                .elements
                .first()
                .map(|e| e.storage.name().to_string())
                .unwrap_or_default(),
            storage_path: self
                .elements
                .first()
                .map(|e| e.storage_path.clone())
                .unwrap_or_default(),
            file_count: self.count(),
        }
    }

    async fn transfer_element(
        &self,
        element: &TaskElement,
        index: usize,
        cancel: &CancelHandle,
        counter: &Arc<AtomicI64>,
    ) -> Result<(), TaskError> {
        let stream = self.global_stream && element.storage.cannot_stream().is_none();

        if stream {
            let reader = tokio::select! {
                _ = cancel.cancelled() => return Err(TaskError::Canceled),
                reader = self.source.open_stream(&element.file) => {
                    reader.map_err(TaskError::Other)?
                }
            };
            let mut reader = ProgressReader::new(reader, counter.clone());
            let mut save_source = SaveSource::stream(&mut reader, element.file.size);

            tokio::select! {
                _ = cancel.cancelled() => Err(TaskError::Canceled),
                result = element.storage.save(&mut save_source, &element.storage_path) => {
                    result.map_err(TaskError::from)
                }
            }
        } else {
            let safe_name = common::sanitize_filename(&element.file.display_name());
            let cache_path = self
                .temp_base
                .join(format!("{}_{}_{}", self.id, index, safe_name));
            if let Some(parent) = cache_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| TaskError::Other(e.into()))?;
            }

            let result = self
                .transfer_staged(element, &cache_path, cancel, counter)
                .await;

            // 缓存文件无论成败都清掉
            if let Err(e) = tokio::fs::remove_file(&cache_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("清理批量缓存文件失败: {:?} error={}", cache_path, e);
                }
            }
            result
        }
    }

    async fn transfer_staged(
        &self,
        element: &TaskElement,
        cache_path: &std::path::Path,
        cancel: &CancelHandle,
        counter: &Arc<AtomicI64>,
    ) -> Result<(), TaskError> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(TaskError::Canceled),
            result = self.source.download_to_file(&element.file, cache_path, counter.clone()) => {
                result.map_err(TaskError::Other)?;
            }
        }

        let mut reader = tokio::fs::File::open(cache_path)
            .await
            .map_err(|e| TaskError::Other(e.into()))?;
        let mut save_source = SaveSource::staged(&mut reader, cache_path, element.file.size);

        tokio::select! {
            _ = cancel.cancelled() => Err(TaskError::Canceled),
            result = element.storage.save(&mut save_source, &element.storage_path) => {
                result.map_err(TaskError::from)
            }
        }
    }
}

#[async_trait]
impl Task for BatchTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::BatchTgfile
    }

    fn chat_id(&self) -> i64 {
        self.chat_id
    }

    async fn execute(&self, cancel: CancelHandle) -> Result<(), TaskError> {
        let info = self.info();
        self.tracker.on_start(&info).await;

        let counter = Arc::new(AtomicI64::new(0));
        let ticker = {
            let tracker = self.tracker.clone();
            let info = info.clone();
            let counter = counter.clone();
            let total = self.total_size();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_millis(500)) => {
                            tracker
                                .on_progress(&info, counter.load(Ordering::Relaxed), total)
                                .await;
                        }
                    }
                }
            })
        };

        let mut result = Ok(());
        for (index, element) in self.elements.iter().enumerate() {
            if cancel.is_canceled() {
                result = Err(TaskError::Canceled);
                break;
            }
            if let Err(e) = self.transfer_element(element, index, &cancel, &counter).await {
                result = Err(e);
                break;
            }
        }

        ticker.abort();
        self.tracker.on_done(&info, result.as_ref().err()).await;
        result
    }

    async fn report_canceled(&self) {
        let info = self.info();
        self.tracker.on_done(&info, Some(&TaskError::Canceled)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tftask::tests::{test_file, FakeSource, RecordingTracker, SinkStorage, TrackEvent};

    fn temp_base(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "batch_test_{}_{}_{}",
            tag,
            std::process::id(),
            common::next_task_id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_elements_processed_in_order() {
        let storage = SinkStorage::new(false);
        let tracker = RecordingTracker::new();
        let source = Arc::new(FakeSource {
            data: vec![5u8; 100],
        });
        let base = temp_base("order");

        let elements = (0..4)
            .map(|i| TaskElement {
                storage: storage.clone(),
                storage_path: format!("/sink/f{}.bin", i),
                file: test_file(&format!("f{}.bin", i), 100),
            })
            .collect();

        let task = BatchTask::new(
            common::next_task_id(),
            10,
            elements,
            tracker.clone(),
            source,
            true,
            base.clone(),
        );
        assert_eq!(task.total_size(), 400);

        task.execute(CancelHandle::new()).await.unwrap();

        let received = storage.received.lock().unwrap();
        let paths: Vec<&str> = received.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/sink/f0.bin", "/sink/f1.bin", "/sink/f2.bin", "/sink/f3.bin"]
        );

        let events = tracker.events();
        assert_eq!(events.first(), Some(&TrackEvent::Start));
        assert_eq!(events.last(), Some(&TrackEvent::Done(None)));
        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn test_staged_elements_clean_cache() {
        let storage = SinkStorage::new(true);
        let tracker = RecordingTracker::new();
        let source = Arc::new(FakeSource {
            data: vec![3u8; 64],
        });
        let base = temp_base("staged");

        let elements = vec![
            TaskElement {
                storage: storage.clone(),
                storage_path: "/sink/x.bin".to_string(),
                file: test_file("x.bin", 64),
            },
            TaskElement {
                storage: storage.clone(),
                storage_path: "/sink/y.bin".to_string(),
                file: test_file("y.bin", 64),
            },
        ];

        let task = BatchTask::new(
            common::next_task_id(),
            10,
            elements,
            tracker.clone(),
            source,
            true,
            base.clone(),
        );
        task.execute(CancelHandle::new()).await.unwrap();

        assert_eq!(storage.received.lock().unwrap().len(), 2);
        // 缓存目录应当只剩空壳
        let leftovers: Vec<_> = std::fs::read_dir(&base).unwrap().collect();
        assert!(leftovers.is_empty());
        std::fs::remove_dir_all(&base).ok();
    }
}
