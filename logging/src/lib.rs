use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub type LogGuard = WorkerGuard;

fn ensure_log_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// 初始化日志: 终端 + 文件双输出, 文件端异步写入
///
/// guard 在进程存续期间必须保持存活, 否则缓冲日志会丢失。
pub fn init(log_file: &Path, level: &str) -> &'static WorkerGuard {
    LOG_GUARD.get_or_init(|| {
        ensure_log_dir(log_file).expect("无法创建日志目录");

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(level)
                .add_directive("grammers_mtsender=warn".parse().unwrap())
                .add_directive("grammers_mtproto=info".parse().unwrap())
                .add_directive("grammers_session=warn".parse().unwrap())
                .add_directive("hyper=warn".parse().unwrap())
                .add_directive("reqwest=info".parse().unwrap())
        });

        let (non_blocking, guard) = tracing_appender::non_blocking(
            std::fs::File::create(log_file).expect("无法创建日志文件"),
        );

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stdout))
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .init();

        guard
    })
}
