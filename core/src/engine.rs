use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::task::{CancelHandle, Task, TaskError};

enum EngineMessage {
    Task(Arc<dyn Task>, CancelHandle),
    Shutdown,
}

/// 任务引擎: FIFO 队列 + 有界并行的 worker 池
///
/// 提交方只在入队时同步, 执行全部异步; 每个任务从入队到终态
/// 恰好经历一次 execute 或 report_canceled。
pub struct TaskEngine {
    sender: tokio::sync::mpsc::UnboundedSender<EngineMessage>,
    receiver: std::sync::Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<EngineMessage>>>,
    inner: Arc<EngineInner>,
}

struct EngineInner {
    semaphore: Arc<tokio::sync::Semaphore>,
    /// pending + running 总数
    queued: AtomicUsize,
    inflight: AtomicUsize,
    idle_notify: Notify,
    closed: AtomicBool,
    cancels: std::sync::Mutex<HashMap<String, CancelHandle>>,
    retention: Duration,
}

impl EngineInner {
    fn remove_cancel_later(self: &Arc<Self>, task_id: String) {
        // 终态后保留一个短窗口, 晚到的取消回调仍然是无害的幂等操作
        let inner = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.retention).await;
            if let Ok(mut cancels) = inner.cancels.lock() {
                cancels.remove(&task_id);
            }
        });
    }

    fn task_finished(&self, task_id: &str, result: &Result<(), TaskError>) {
        match result {
            Ok(()) => info!("任务完成: {}", task_id),
            Err(TaskError::Canceled) => info!("任务已取消: {}", task_id),
            Err(e) => error!("任务失败: {} error={}", task_id, e),
        }
        self.queued.fetch_sub(1, Ordering::AcqRel);
        if self.inflight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle_notify.notify_waiters();
        }
    }
}

impl TaskEngine {
    pub fn new(worker_count: usize, retention: Duration) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        Self {
            sender,
            receiver: std::sync::Mutex::new(Some(receiver)),
            inner: Arc::new(EngineInner {
                semaphore: Arc::new(tokio::sync::Semaphore::new(worker_count.max(1))),
                queued: AtomicUsize::new(0),
                inflight: AtomicUsize::new(0),
                idle_notify: Notify::new(),
                closed: AtomicBool::new(false),
                cancels: std::sync::Mutex::new(HashMap::new()),
                retention,
            }),
        }
    }

    /// 启动调度循环; 只能调用一次
    pub fn start(&self) {
        let mut receiver = self
            .receiver
            .lock()
            .expect("接收端锁被污染")
            .take()
            .expect("引擎已启动");
        let inner = self.inner.clone();

        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let (task, cancel) = match message {
                    EngineMessage::Task(task, cancel) => (task, cancel),
                    EngineMessage::Shutdown => break,
                };

                inner.inflight.fetch_add(1, Ordering::Relaxed);
                let inner = inner.clone();
                tokio::spawn(async move {
                    let task_id = task.id().to_string();

                    // 排队等 worker 期间也要能被取消
                    let permit = tokio::select! {
                        _ = cancel.cancelled() => None,
                        permit = inner.semaphore.clone().acquire_owned() => permit.ok(),
                    };

                    let result = match permit {
                        None => {
                            task.report_canceled().await;
                            Err(TaskError::Canceled)
                        }
                        Some(_permit) if cancel.is_canceled() => {
                            task.report_canceled().await;
                            Err(TaskError::Canceled)
                        }
                        Some(_permit) => task.execute(cancel.clone()).await,
                    };

                    inner.task_finished(&task_id, &result);
                    inner.remove_cancel_later(task_id);
                });
            }
        });
    }

    /// 入队; 引擎关闭后拒绝
    pub fn add_task(&self, task: Arc<dyn Task>) -> anyhow::Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            anyhow::bail!("任务引擎已关闭");
        }

        let cancel = CancelHandle::new();
        if let Ok(mut cancels) = self.inner.cancels.lock() {
            cancels.insert(task.id().to_string(), cancel.clone());
        }
        self.inner.queued.fetch_add(1, Ordering::AcqRel);

        if self
            .sender
            .send(EngineMessage::Task(task, cancel))
            .is_err()
        {
            self.inner.queued.fetch_sub(1, Ordering::AcqRel);
            anyhow::bail!("任务引擎已停止");
        }
        Ok(())
    }

    /// 幂等取消: 未知或已终态的任务 ID 是无害的空操作
    pub fn cancel_task(&self, task_id: &str) {
        let handle = self
            .inner
            .cancels
            .lock()
            .ok()
            .and_then(|cancels| cancels.get(task_id).cloned());

        match handle {
            Some(handle) => {
                info!("取消任务: {}", task_id);
                handle.cancel();
            }
            None => {
                warn!("取消请求的任务不存在或已结束: {}", task_id);
            }
        }
    }

    /// 当前 pending + running 数量
    pub fn len(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 停止接收新任务, 取消在跑任务, 限期等待收尾
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        self.inner.closed.store(true, Ordering::Release);
        let _ = self.sender.send(EngineMessage::Shutdown);

        if let Ok(cancels) = self.inner.cancels.lock() {
            for handle in cancels.values() {
                handle.cancel();
            }
        }

        let drained = tokio::time::timeout(deadline, self.wait_idle()).await.is_ok();
        if !drained {
            warn!("任务引擎关闭超时, 放弃仍在执行的任务");
        }
        drained
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle_notify.notified();
            if self.inner.inflight.load(Ordering::Acquire) == 0 {
                break;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Executed(String),
        Canceled(String),
    }

    struct FakeTask {
        id: String,
        delay: Duration,
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl FakeTask {
        fn new(id: &str, delay: Duration, events: Arc<Mutex<Vec<Event>>>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                delay,
                events,
            })
        }
    }

    #[async_trait]
    impl Task for FakeTask {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Tgfile
        }

        fn chat_id(&self) -> i64 {
            1
        }

        async fn execute(&self, cancel: CancelHandle) -> Result<(), TaskError> {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.events.lock().unwrap().push(Event::Canceled(self.id.clone()));
                    return Err(TaskError::Canceled);
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
            self.events.lock().unwrap().push(Event::Executed(self.id.clone()));
            Ok(())
        }

        async fn report_canceled(&self) {
            self.events.lock().unwrap().push(Event::Canceled(self.id.clone()));
        }
    }

    fn engine(workers: usize) -> TaskEngine {
        let engine = TaskEngine::new(workers, Duration::from_millis(50));
        engine.start();
        engine
    }

    async fn wait_drained(engine: &TaskEngine) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !engine.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("任务应在限期内跑完");
    }

    #[tokio::test]
    async fn test_all_tasks_execute_exactly_once() {
        let engine = engine(2);
        let events = Arc::new(Mutex::new(Vec::new()));

        for i in 0..8 {
            let task = FakeTask::new(&format!("t{}", i), Duration::from_millis(5), events.clone());
            engine.add_task(task).unwrap();
        }

        wait_drained(&engine).await;
        assert!(engine.shutdown(Duration::from_secs(5)).await);
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 8);
        for i in 0..8 {
            let id = format!("t{}", i);
            assert_eq!(
                events.iter().filter(|e| matches!(e, Event::Executed(x) if *x == id)).count(),
                1
            );
        }
    }

    #[tokio::test]
    async fn test_cancel_pending_task_never_executes() {
        let engine = engine(1);
        let events = Arc::new(Mutex::new(Vec::new()));

        // 占住唯一的 worker
        let blocker = FakeTask::new("blocker", Duration::from_millis(200), events.clone());
        engine.add_task(blocker).unwrap();

        let pending = FakeTask::new("pending", Duration::from_millis(5), events.clone());
        engine.add_task(pending).unwrap();
        assert_eq!(engine.len(), 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.cancel_task("pending");

        assert!(engine.shutdown(Duration::from_secs(5)).await);
        let events = events.lock().unwrap();
        assert!(events.contains(&Event::Canceled("pending".to_string())));
        assert!(!events.contains(&Event::Executed("pending".to_string())));
    }

    #[tokio::test]
    async fn test_cancel_running_task() {
        let engine = engine(1);
        let events = Arc::new(Mutex::new(Vec::new()));

        let task = FakeTask::new("run", Duration::from_secs(30), events.clone());
        engine.add_task(task).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        engine.cancel_task("run");
        assert!(engine.shutdown(Duration::from_secs(5)).await);
        let events = events.lock().unwrap();
        assert_eq!(events.as_slice(), &[Event::Canceled("run".to_string())]);
    }

    #[tokio::test]
    async fn test_len_and_reject_after_shutdown() {
        let engine = engine(2);
        let events = Arc::new(Mutex::new(Vec::new()));
        assert_eq!(engine.len(), 0);

        let task = FakeTask::new("a", Duration::from_millis(5), events.clone());
        engine.add_task(task).unwrap();
        assert_eq!(engine.len(), 1);

        wait_drained(&engine).await;
        assert!(engine.shutdown(Duration::from_secs(5)).await);
        assert_eq!(engine.len(), 0);

        let late = FakeTask::new("late", Duration::from_millis(5), events.clone());
        assert!(engine.add_task(late).is_err());
    }

    #[tokio::test]
    async fn test_cancel_unknown_id_is_noop() {
        let engine = engine(1);
        engine.cancel_task("ghost");
        assert!(engine.shutdown(Duration::from_secs(1)).await);
    }
}
