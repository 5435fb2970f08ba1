use async_trait::async_trait;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::warn;

use crate::msg::{self, Button, StatusSink};
use crate::task::{TaskError, TaskInfo};

/// 任务生命周期回调
#[async_trait]
pub trait ProgressTracker: Send + Sync {
    async fn on_start(&self, info: &TaskInfo);
    async fn on_progress(&self, info: &TaskInfo, downloaded: i64, total: i64);
    async fn on_done(&self, info: &TaskInfo, err: Option<&TaskError>);
}

/// 状态编辑节流: 距上次 ≥2 秒且百分比有变化才更新
pub struct ProgressThrottle {
    state: Mutex<ThrottleState>,
    min_interval: Duration,
}

struct ThrottleState {
    last_update: Option<Instant>,
    last_percent: i32,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(2))
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            state: Mutex::new(ThrottleState {
                last_update: None,
                last_percent: -1,
            }),
            min_interval,
        }
    }

    pub fn should_update(&self, downloaded: i64, total: i64) -> bool {
        if total <= 0 {
            return false;
        }
        let percent = ((downloaded * 100) / total) as i32;

        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if percent == state.last_percent {
            return false;
        }
        let now = Instant::now();
        if let Some(last) = state.last_update {
            if now.duration_since(last) < self.min_interval {
                return false;
            }
        }
        state.last_update = Some(now);
        state.last_percent = percent;
        true
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new()
    }
}

/// 读取计数器: 包装底层读取器, 把读到的字节数累加到共享计数
pub struct ProgressReader<R> {
    inner: R,
    counter: Arc<AtomicI64>,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, counter: Arc<AtomicI64>) -> Self {
        Self { inner, counter }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let delta = (buf.filled().len() - before) as i64;
                if delta > 0 {
                    this.counter.fetch_add(delta, Ordering::Relaxed);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// 把进度编辑到源会话状态消息的跟踪器
pub struct TelegramProgress {
    sink: Arc<dyn StatusSink>,
    chat_id: i64,
    message_id: i32,
    start: Mutex<Instant>,
    throttle: ProgressThrottle,
}

impl TelegramProgress {
    pub fn new(sink: Arc<dyn StatusSink>, chat_id: i64, message_id: i32) -> Arc<Self> {
        Arc::new(Self {
            sink,
            chat_id,
            message_id,
            start: Mutex::new(Instant::now()),
            throttle: ProgressThrottle::new(),
        })
    }

    fn started_at(&self) -> Instant {
        *self.start.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn edit(&self, message: msg::StyledMessage, buttons: Vec<Button>) {
        if let Err(e) = self
            .sink
            .edit_status(self.chat_id, self.message_id, &message, &buttons)
            .await
        {
            warn!(
                "编辑状态消息失败: chat={} msg={} error={}",
                self.chat_id, self.message_id, e
            );
        }
    }
}

#[async_trait]
impl ProgressTracker for TelegramProgress {
    async fn on_start(&self, info: &TaskInfo) {
        *self.start.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
        let message = msg::build_start_message(info);
        self.edit(message, vec![msg::cancel_button(&info.task_id)]).await;
    }

    async fn on_progress(&self, info: &TaskInfo, downloaded: i64, total: i64) {
        if !self.throttle.should_update(downloaded, total) {
            return;
        }
        let message = msg::build_progress_message(info, downloaded, total, self.started_at());
        self.edit(
            message,
            vec![
                msg::cancel_button(&info.task_id),
                msg::detail_button(&info.task_id),
            ],
        )
        .await;
    }

    async fn on_done(&self, info: &TaskInfo, err: Option<&TaskError>) {
        // 终态更新不受节流限制
        let elapsed = self.started_at().elapsed();
        let message = msg::build_done_message(info, err, elapsed);
        self.edit(message, Vec::new()).await;
    }
}
