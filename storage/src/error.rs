use std::time::Duration;
use thiserror::Error;

/// 存储层错误, 按语义分类; 驱动内部可恢复的错误不会出现在这里
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("任务已取消")]
    Canceled,

    #[error("认证失败: {0}")]
    Auth(String),

    #[error("认证冷却中, 剩余 {0:?}")]
    Cooldown(Duration),

    #[error("网络错误: {0}")]
    Transport(String),

    #[error("配置无效: {0}")]
    Validation(String),

    #[error("远端错误 (code {code}): {message}")]
    Remote { code: i64, message: String },

    #[error("路径不安全: {0}")]
    Safety(String),

    /// 存在性检查结果不可信 (非认证的远端错误); 调用方应按"已存在"处理以避免覆盖
    #[error("无法确认文件状态: {0}")]
    AmbiguousExists(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        StorageError::Transport(err.to_string())
    }
}
