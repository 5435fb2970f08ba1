use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ai::AiConfig;
use super::paths::{project_root, resolve_path};
use super::storages::{load_storage_configs, StorageConfig};
use super::validate::validate_config;
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api_id: i32,
    pub api_hash: String,
    pub bot_token: String,

    #[serde(default = "default_session_name")]
    pub session_name: String,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// 全局流式开关; 为 false 时所有任务先落盘缓存再上传
    #[serde(default = "default_stream")]
    pub stream: bool,

    pub temp_base: PathBuf,
    pub db_path: PathBuf,
    pub log_file: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_shutdown_drain_timeout")]
    pub shutdown_drain_timeout: u64,

    /// 任务终态后状态保留时间 (秒)
    #[serde(default = "default_task_retention")]
    pub task_retention: u64,

    #[serde(skip)]
    pub storages: Vec<StorageConfig>,

    #[serde(default)]
    pub ai: AiConfig,
}

fn default_session_name() -> String {
    "bot_session".to_string()
}
fn default_worker_count() -> usize {
    3
}
fn default_stream() -> bool {
    true
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_shutdown_drain_timeout() -> u64 {
    30
}
fn default_task_retention() -> u64 {
    30
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub fn load_config() -> Result<AppConfig> {
    let project_root = project_root();
    let env_path = project_root.join(".env");

    if env_path.exists() {
        dotenv::from_path(&env_path)?;
    }

    let api_id_str = env::var("TG_API_ID").unwrap_or_default().trim().to_string();
    let api_id = api_id_str.parse::<i32>().context("TG_API_ID 必须为整数")?;

    let api_hash = env::var("TG_API_HASH")
        .context("请设置 TG_API_HASH")?
        .trim()
        .to_string();

    let bot_token = env::var("TG_BOT_TOKEN")
        .context("请设置 TG_BOT_TOKEN")?
        .trim()
        .to_string();

    let session_name = env::var("TG_SESSION_NAME").unwrap_or_else(|_| default_session_name());

    let worker_count = env_parse("TG_WORKER_COUNT", default_worker_count());
    let stream = env_bool("TG_STREAM", default_stream());

    let temp_base_raw = env::var("TG_TEMP_DIR").unwrap_or_else(|_| "cache".to_string());
    let temp_base = resolve_path(&temp_base_raw, "cache");

    let db_path_raw = env::var("TG_DB_PATH").unwrap_or_else(|_| "data/bot.db".to_string());
    let db_path = resolve_path(&db_path_raw, "data/bot.db");

    let log_file_raw = env::var("TG_LOG_FILE").unwrap_or_else(|_| "logs/bot.log".to_string());
    let log_file = resolve_path(&log_file_raw, "logs/bot.log");

    let log_level = env::var("TG_LOG_LEVEL").unwrap_or_else(|_| default_log_level());

    let shutdown_drain_timeout = env_parse(
        "TG_SHUTDOWN_DRAIN_TIMEOUT",
        default_shutdown_drain_timeout(),
    );
    let task_retention = env_parse("TG_TASK_RETENTION", default_task_retention());

    let storage_file_raw =
        env::var("TG_STORAGE_FILE").unwrap_or_else(|_| "storages.json".to_string());
    let storage_file = resolve_path(&storage_file_raw, "storages.json");
    let storages = load_storage_configs(&storage_file)
        .with_context(|| format!("加载存储配置失败: {:?}", storage_file))?;
    tracing::info!("已加载 {} 个存储配置", storages.len());

    let ai = AiConfig {
        enable: env_bool("TG_AI_ENABLE", false),
        base_url: env::var("TG_AI_BASE_URL")
            .unwrap_or_default()
            .trim()
            .to_string(),
        api_key: env::var("TG_AI_API_KEY")
            .unwrap_or_default()
            .trim()
            .to_string(),
        model: env::var("TG_AI_MODEL").unwrap_or_default().trim().to_string(),
        timeout: env_parse("TG_AI_TIMEOUT", 30),
        max_retries: env_parse("TG_AI_MAX_RETRIES", 3),
    };

    let config = AppConfig {
        api_id,
        api_hash,
        bot_token,
        session_name,
        worker_count,
        stream,
        temp_base,
        db_path,
        log_file,
        log_level,
        shutdown_drain_timeout,
        task_retention,
        storages,
        ai,
    };

    validate_config(&config)?;

    Ok(config)
}
