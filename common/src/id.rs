use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

static TASK_ID_SEQ: OnceLock<AtomicU64> = OnceLock::new();

/// 生成任务 ID: 毫秒时间戳左移 16 位拼接进程内序号
///
/// 同一进程内严格递增且不重复, 字典序与生成顺序一致。
pub fn next_task_id() -> String {
    let seq = TASK_ID_SEQ.get_or_init(|| {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        AtomicU64::new(millis << 16)
    });
    format!("{:016x}", seq.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_unique_and_ordered() {
        let ids: Vec<String> = (0..64).map(|_| next_task_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        sorted.dedup();
        assert_eq!(sorted.len(), 64);
    }
}
