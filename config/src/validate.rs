use super::AppConfig;
use anyhow::Result;

pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.api_id <= 0 {
        anyhow::bail!("TG_API_ID 必须为正整数");
    }

    if config.api_hash.is_empty() {
        anyhow::bail!("TG_API_HASH 不能为空");
    }

    if config.bot_token.is_empty() {
        anyhow::bail!("TG_BOT_TOKEN 不能为空");
    }

    if config.worker_count == 0 {
        anyhow::bail!("TG_WORKER_COUNT 必须大于 0");
    }

    if config.shutdown_drain_timeout == 0 {
        anyhow::bail!("TG_SHUTDOWN_DRAIN_TIMEOUT 必须大于 0");
    }

    if config.temp_base.as_os_str().is_empty() {
        anyhow::bail!("TG_TEMP_DIR 不能为空");
    }

    if config.db_path.as_os_str().is_empty() {
        anyhow::bail!("TG_DB_PATH 不能为空");
    }

    config.ai.validate()?;

    Ok(())
}
