use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::task::{TaskError, TaskInfo};

/// 样式片段; 由客户端侧转换为 Telegram 实体
#[derive(Debug, Clone, PartialEq)]
pub enum TextPart {
    Plain(String),
    Bold(String),
    Code(String),
}

#[derive(Debug, Clone, Default)]
pub struct StyledMessage {
    pub parts: Vec<TextPart>,
}

impl StyledMessage {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.parts.push(TextPart::Plain(text.into()));
        self
    }

    pub fn bold(&mut self, text: impl Into<String>) -> &mut Self {
        self.parts.push(TextPart::Bold(text.into()));
        self
    }

    pub fn code(&mut self, text: impl Into<String>) -> &mut Self {
        self.parts.push(TextPart::Code(text.into()));
        self
    }

    /// 纯文本内容 (无样式回退)
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                TextPart::Plain(s) | TextPart::Bold(s) | TextPart::Code(s) => s.as_str(),
            })
            .collect()
    }
}

/// 行内按钮; data 即回调负载 ("cancel <id>" / "task_detail <id>")
#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

pub fn cancel_button(task_id: &str) -> Button {
    Button {
        text: "取消任务".to_string(),
        data: format!("cancel {}", task_id),
    }
}

pub fn detail_button(task_id: &str) -> Button {
    Button {
        text: "任务详情".to_string(),
        data: format!("task_detail {}", task_id),
    }
}

/// 状态消息编辑通道, 由 tgclient 实现
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn edit_status(
        &self,
        chat_id: i64,
        message_id: i32,
        message: &StyledMessage,
        buttons: &[Button],
    ) -> anyhow::Result<()>;
}

const PROGRESS_BAR_LEN: usize = 12;

/// 12 格方块进度条, 附百分比
pub fn format_progress_bar(processed: i64, total: i64) -> String {
    if total <= 0 {
        return format!("{} 0.0%", "░".repeat(PROGRESS_BAR_LEN));
    }
    let percent = processed as f64 / total as f64 * 100.0;
    let filled = ((percent * PROGRESS_BAR_LEN as f64 / 100.0) as usize).min(PROGRESS_BAR_LEN);
    format!(
        "{}{} {:.1}%",
        "█".repeat(filled),
        "░".repeat(PROGRESS_BAR_LEN - filled),
        percent
    )
}

fn dir_of(storage_path: &str) -> &str {
    match storage_path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &storage_path[..idx],
        None => "/",
    }
}

fn item(message: &mut StyledMessage, icon: &str, label: &str, value: &str, code: bool) {
    message.plain(format!("{} ", icon));
    message.bold(label.to_string());
    message.plain(": ");
    if code {
        message.code(value.to_string());
    } else {
        message.plain(value.to_string());
    }
    message.plain("\n");
}

pub fn build_start_message(info: &TaskInfo) -> StyledMessage {
    let mut message = StyledMessage::default();
    if info.file_count > 1 {
        message.bold("🚀 开始批量下载").plain("\n\n");
        item(&mut message, "📦", "文件数量", &info.file_count.to_string(), false);
        item(&mut message, "📏", "总大小", &common::format_size(info.total_size), false);
    } else {
        message.bold("🚀 开始下载").plain("\n\n");
        item(&mut message, "📄", "文件名", &info.file_name, true);
        item(
            &mut message,
            "📂",
            "保存路径",
            &format!("[{}]:{}", info.storage_name, dir_of(&info.storage_path)),
            true,
        );
        item(&mut message, "📦", "文件大小", &common::format_size(info.total_size), false);
    }
    message
}

pub fn build_progress_message(
    info: &TaskInfo,
    downloaded: i64,
    total: i64,
    started: Instant,
) -> StyledMessage {
    let mut message = StyledMessage::default();
    if info.file_count > 1 {
        message.bold("⏳ 批量下载中").plain("\n\n");
        item(&mut message, "📦", "文件数量", &info.file_count.to_string(), false);
    } else {
        message.bold("⏳ 正在下载").plain("\n\n");
        item(&mut message, "📄", "文件名", &info.file_name, true);
        item(
            &mut message,
            "📂",
            "保存路径",
            &format!("[{}]:{}", info.storage_name, dir_of(&info.storage_path)),
            true,
        );
        item(&mut message, "📦", "文件大小", &common::format_size(total), false);
    }

    item(&mut message, "📊", "传输进度", &format_progress_bar(downloaded, total), false);

    let elapsed = started.elapsed();
    let speed = common::average_speed(downloaded, elapsed);
    item(
        &mut message,
        "🚀",
        "平均速度",
        &format!("{}/s", common::format_size(speed as i64)),
        false,
    );
    item(&mut message, "⌚", "运行时间", &common::format_duration(elapsed), false);

    if speed > 0.0 && total > downloaded {
        let remaining = ((total - downloaded) as f64 / speed) as u64;
        if remaining > 0 {
            item(
                &mut message,
                "⏱️",
                "预计剩余",
                &common::format_duration(Duration::from_secs(remaining)),
                false,
            );
        }
    }

    message
}

pub fn build_done_message(
    info: &TaskInfo,
    err: Option<&TaskError>,
    elapsed: Duration,
) -> StyledMessage {
    let mut message = StyledMessage::default();

    match err {
        Some(TaskError::Canceled) => {
            message.bold("🚫 任务已取消").plain("\n\n");
            item(&mut message, "📄", "文件名", &info.file_name, true);
        }
        Some(e) => {
            message.bold("❌ 下载失败").plain("\n\n");
            item(&mut message, "📄", "文件名", &info.file_name, true);
            item(&mut message, "❗", "错误信息", &e.to_string(), false);
        }
        None => {
            message.bold("✅ 下载完成").plain("\n\n");
            if info.file_count > 1 {
                item(&mut message, "📦", "文件数量", &info.file_count.to_string(), false);
                item(&mut message, "📏", "总大小", &common::format_size(info.total_size), false);
            } else {
                item(&mut message, "📄", "文件名", &info.file_name, true);
                item(
                    &mut message,
                    "📂",
                    "保存路径",
                    &format!("[{}]:{}", info.storage_name, dir_of(&info.storage_path)),
                    true,
                );
            }
            item(&mut message, "⌚", "总用时", &common::format_duration(elapsed), false);
        }
    }

    message
}

pub fn build_task_added_message(file_name: &str, queue_len: usize) -> StyledMessage {
    let mut message = StyledMessage::default();
    message.bold("📥 已加入任务队列").plain("\n\n");
    item(&mut message, "📄", "文件名", file_name, true);
    item(&mut message, "📊", "当前排队", &queue_len.to_string(), false);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> TaskInfo {
        TaskInfo {
            task_id: "abc".to_string(),
            file_name: "报告.pdf".to_string(),
            total_size: 1024,
            storage_name: "nas".to_string(),
            storage_path: "/docs/2024/报告.pdf".to_string(),
            file_count: 1,
        }
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(format_progress_bar(0, 100), "░░░░░░░░░░░░ 0.0%");
        assert_eq!(format_progress_bar(50, 100), "██████░░░░░░ 50.0%");
        assert_eq!(format_progress_bar(100, 100), "████████████ 100.0%");
        assert_eq!(format_progress_bar(10, 0), "░░░░░░░░░░░░ 0.0%");
    }

    #[test]
    fn test_buttons_payload() {
        assert_eq!(cancel_button("t1").data, "cancel t1");
        assert_eq!(detail_button("t1").data, "task_detail t1");
    }

    #[test]
    fn test_start_message_contains_target() {
        let text = build_start_message(&info()).text();
        assert!(text.contains("报告.pdf"));
        assert!(text.contains("[nas]:/docs/2024"));
        assert!(text.contains("1.00 KiB"));
    }

    #[test]
    fn test_done_message_variants() {
        let ok = build_done_message(&info(), None, Duration::from_secs(3)).text();
        assert!(ok.contains("下载完成"));
        assert!(ok.contains("3秒"));

        let canceled =
            build_done_message(&info(), Some(&TaskError::Canceled), Duration::ZERO).text();
        assert!(canceled.contains("任务已取消"));

        let failed = build_done_message(
            &info(),
            Some(&TaskError::Other(anyhow::anyhow!("磁盘已满"))),
            Duration::ZERO,
        )
        .text();
        assert!(failed.contains("下载失败"));
        assert!(failed.contains("磁盘已满"));
    }
}
