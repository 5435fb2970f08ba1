use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::model::{TGFile, TaskKind};
use crate::progress::{ProgressReader, ProgressTracker};
use crate::runtime::MediaSource;
use crate::task::{CancelHandle, Task, TaskError, TaskInfo};
use storage::{SaveSource, Storage};

/// 单文件传输任务
pub struct FileTask {
    id: String,
    chat_id: i64,
    file: TGFile,
    storage: Arc<dyn Storage>,
    storage_path: String,
    tracker: Arc<dyn ProgressTracker>,
    source: Arc<dyn MediaSource>,
    /// 流式直传; false 时先落盘到 cache_path
    stream: bool,
    cache_path: Option<PathBuf>,
    custom_name: Option<String>,
}

impl FileTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        chat_id: i64,
        file: TGFile,
        storage: Arc<dyn Storage>,
        storage_path: String,
        tracker: Arc<dyn ProgressTracker>,
        source: Arc<dyn MediaSource>,
        global_stream: bool,
        temp_base: &std::path::Path,
    ) -> Self {
        let cannot_stream = storage.cannot_stream();
        if let Some(reason) = cannot_stream {
            debug!("存储 {} 要求落盘: {}", storage.name(), reason);
        }

        let stream = global_stream && cannot_stream.is_none();
        let cache_path = if stream {
            None
        } else {
            let safe_name = common::sanitize_filename(&file.display_name());
            Some(temp_base.join(format!("{}_{}", id, safe_name)))
        };

        Self {
            id,
            chat_id,
            file,
            storage,
            storage_path,
            tracker,
            source,
            stream,
            cache_path,
            custom_name: None,
        }
    }

    /// 展示用名字覆盖 (例如 AI 重命名结果)
    pub fn set_custom_name(&mut self, name: impl Into<String>) {
        self.custom_name = Some(name.into());
    }

    fn info(&self) -> TaskInfo {
        TaskInfo {
            task_id: self.id.clone(),
            file_name: self
                .custom_name
                .clone()
                .unwrap_or_else(|| self.file.display_name()),
            total_size: self.file.size,
            storage_name: self.storage.name().to_string(),
            storage_path: self.storage_path.clone(),
            file_count: 1,
        }
    }

    async fn run_transfer(
        &self,
        cancel: &CancelHandle,
        counter: &Arc<AtomicI64>,
    ) -> Result<(), TaskError> {
        if let Some(cache_path) = &self.cache_path {
            if let Some(parent) = cache_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| TaskError::Other(e.into()))?;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(TaskError::Canceled),
                result = self.source.download_to_file(&self.file, cache_path, counter.clone()) => {
                    result.map_err(TaskError::Other)?;
                }
            }

            let mut reader = tokio::fs::File::open(cache_path)
                .await
                .map_err(|e| TaskError::Other(e.into()))?;
            let mut save_source = SaveSource::staged(&mut reader, cache_path, self.file.size);

            tokio::select! {
                _ = cancel.cancelled() => Err(TaskError::Canceled),
                result = self.storage.save(&mut save_source, &self.storage_path) => {
                    result.map_err(TaskError::from)
                }
            }
        } else {
            let reader = tokio::select! {
                _ = cancel.cancelled() => return Err(TaskError::Canceled),
                reader = self.source.open_stream(&self.file) => reader.map_err(TaskError::Other)?,
            };
            let mut reader = ProgressReader::new(reader, counter.clone());
            let mut save_source = SaveSource::stream(&mut reader, self.file.size);

            tokio::select! {
                _ = cancel.cancelled() => Err(TaskError::Canceled),
                result = self.storage.save(&mut save_source, &self.storage_path) => {
                    result.map_err(TaskError::from)
                }
            }
        }
    }

    async fn cleanup_cache(&self) {
        if let Some(cache_path) = &self.cache_path {
            if let Err(e) = tokio::fs::remove_file(cache_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("清理缓存文件失败: {:?} error={}", cache_path, e);
                }
            }
        }
    }
}

#[async_trait]
impl Task for FileTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Tgfile
    }

    fn chat_id(&self) -> i64 {
        self.chat_id
    }

    async fn execute(&self, cancel: CancelHandle) -> Result<(), TaskError> {
        let info = self.info();
        self.tracker.on_start(&info).await;

        let counter = Arc::new(AtomicI64::new(0));

        // 进度上报循环; 节流在 tracker 内部
        let ticker = {
            let tracker = self.tracker.clone();
            let info = info.clone();
            let counter = counter.clone();
            let total = self.file.size;
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

        let result = self.run_transfer(&cancel, &counter).await;

        ticker.abort();
        self.cleanup_cache().await;
        self.tracker.on_done(&info, result.as_ref().err()).await;
        result
    }

    async fn report_canceled(&self) {
        let info = self.info();
        self.tracker.on_done(&info, Some(&TaskError::Canceled)).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{FileLocation, MediaKind};
    use std::path::Path;
    use std::sync::Mutex;
    use tokio::io::AsyncRead;

    pub(crate) fn test_file(name: &str, size: i64) -> TGFile {
        TGFile {
            name: name.to_string(),
            size,
            mime_type: None,
            kind: MediaKind::Document,
            location: FileLocation {
                media_id: 1,
                access_hash: 1,
                file_reference: Vec::new(),
                thumb_size: String::new(),
            },
            chat_id: 10,
            message_id: 20,
            message_text: String::new(),
            grouped_id: None,
        }
    }

    /// 产出固定字节的假媒体源
    pub(crate) struct FakeSource {
        pub data: Vec<u8>,
    }

    #[async_trait]
    impl MediaSource for FakeSource {
        async fn open_stream(
            &self,
            _file: &TGFile,
        ) -> anyhow::Result<Box<dyn AsyncRead + Send + Unpin>> {
            Ok(Box::new(std::io::Cursor::new(self.data.clone())))
        }

        async fn download_to_file(
            &self,
            _file: &TGFile,
            dest: &Path,
            counter: Arc<AtomicI64>,
        ) -> anyhow::Result<()> {
            tokio::fs::write(dest, &self.data).await?;
            counter.fetch_add(self.data.len() as i64, Ordering::Relaxed);
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum TrackEvent {
        Start,
        Progress(i64),
        Done(Option<String>),
    }

    pub(crate) struct RecordingTracker {
        pub events: Mutex<Vec<TrackEvent>>,
    }

    impl RecordingTracker {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        pub fn events(&self) -> Vec<TrackEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProgressTracker for RecordingTracker {
        async fn on_start(&self, _info: &TaskInfo) {
            self.events.lock().unwrap().push(TrackEvent::Start);
        }

        async fn on_progress(&self, _info: &TaskInfo, downloaded: i64, _total: i64) {
            self.events
                .lock()
                .unwrap()
                .push(TrackEvent::Progress(downloaded));
        }

        async fn on_done(&self, _info: &TaskInfo, err: Option<&TaskError>) {
            self.events
                .lock()
                .unwrap()
                .push(TrackEvent::Done(err.map(|e| e.to_string())));
        }
    }

    /// 接收字节的假存储, 可配置为"不支持流式"
    pub(crate) struct SinkStorage {
        pub name: String,
        pub cannot_stream: bool,
        pub received: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl SinkStorage {
        pub fn new(cannot_stream: bool) -> Arc<Self> {
            Arc::new(Self {
                name: "sink".to_string(),
                cannot_stream,
                received: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Storage for SinkStorage {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> storage::StorageKind {
            storage::StorageKind::Local
        }

        fn join_storage_path(&self, path: &str) -> String {
            storage::join_path("/sink", path)
        }

        fn cannot_stream(&self) -> Option<&'static str> {
            if self.cannot_stream {
                Some("测试存储要求落盘")
            } else {
                None
            }
        }

        async fn save(
            &self,
            source: &mut SaveSource<'_>,
            storage_path: &str,
        ) -> Result<(), storage::StorageError> {
            let mut data = Vec::new();
            tokio::io::AsyncReadExt::read_to_end(source.reader(), &mut data).await?;
            self.received
                .lock()
                .unwrap()
                .push((storage_path.to_string(), data));
            Ok(())
        }

        async fn exists(&self, _storage_path: &str) -> Result<bool, storage::StorageError> {
            Ok(false)
        }
    }

    fn temp_base(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tftask_test_{}_{}_{}",
            tag,
            std::process::id(),
            common::next_task_id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_stream_mode_events_in_order() {
        let storage = SinkStorage::new(false);
        let tracker = RecordingTracker::new();
        let source = Arc::new(FakeSource {
            data: vec![1u8; 4096],
        });
        let base = temp_base("stream");

        let task = FileTask::new(
            common::next_task_id(),
            10,
            test_file("a.bin", 4096),
            storage.clone(),
            "/sink/a.bin".to_string(),
            tracker.clone(),
            source,
            true,
            &base,
        );

        task.execute(CancelHandle::new()).await.unwrap();

        let events = tracker.events();
        assert_eq!(events.first(), Some(&TrackEvent::Start));
        assert_eq!(events.last(), Some(&TrackEvent::Done(None)));
        // 进度值单调不减
        let progresses: Vec<i64> = events
            .iter()
            .filter_map(|e| match e {
                TrackEvent::Progress(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert!(progresses.windows(2).all(|w| w[0] <= w[1]));

        let received = storage.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].1.len(), 4096);
        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn test_cannot_stream_stages_then_cleans_cache() {
        let storage = SinkStorage::new(true);
        let tracker = RecordingTracker::new();
        let source = Arc::new(FakeSource {
            data: vec![9u8; 1024],
        });
        let base = temp_base("staged");

        let task = FileTask::new(
            common::next_task_id(),
            10,
            test_file("b.bin", 1024),
            storage.clone(),
            "/sink/b.bin".to_string(),
            tracker.clone(),
            source,
            true,
            &base,
        );
        let cache = task.cache_path.clone().unwrap();

        task.execute(CancelHandle::new()).await.unwrap();

        assert_eq!(storage.received.lock().unwrap().len(), 1);
        // 缓存文件无论成败都被清掉
        assert!(!cache.exists());
        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn test_canceled_before_execute_reports_once() {
        let storage = SinkStorage::new(false);
        let tracker = RecordingTracker::new();
        let source = Arc::new(FakeSource { data: Vec::new() });
        let base = temp_base("cancel");

        let task = FileTask::new(
            common::next_task_id(),
            10,
            test_file("c.bin", 1),
            storage.clone(),
            "/sink/c.bin".to_string(),
            tracker.clone(),
            source,
            true,
            &base,
        );

        task.report_canceled().await;
        let events = tracker.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TrackEvent::Done(Some(msg)) if msg.contains("取消")));
        // 没有打开过读取器
        assert!(storage.received.lock().unwrap().is_empty());
        std::fs::remove_dir_all(&base).ok();
    }
}
