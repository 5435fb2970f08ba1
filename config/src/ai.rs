use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// AI 重命名服务配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    /// 请求超时 (秒)
    #[serde(default)]
    pub timeout: i64,
    #[serde(default)]
    pub max_retries: i64,
}

impl AiConfig {
    pub fn timeout(&self) -> Duration {
        if self.timeout <= 0 {
            return Duration::from_secs(30);
        }
        Duration::from_secs(self.timeout as u64)
    }

    pub fn max_retries(&self) -> usize {
        if self.max_retries <= 0 {
            return 3;
        }
        self.max_retries as usize
    }

    pub fn is_enabled(&self) -> bool {
        self.enable && !self.base_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enable {
            return Ok(());
        }

        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            anyhow::bail!("启用 AI 时 TG_AI_BASE_URL 不能为空");
        }

        let parsed = Url::parse(base_url).map_err(|e| anyhow::anyhow!("TG_AI_BASE_URL 不是合法 URL: {}", e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("TG_AI_BASE_URL 必须为 http/https 地址");
        }

        if self.api_key.trim().is_empty() {
            anyhow::bail!("启用 AI 时 TG_AI_API_KEY 不能为空");
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("启用 AI 时 TG_AI_MODEL 不能为空");
        }
        if self.timeout < 0 {
            anyhow::bail!("TG_AI_TIMEOUT 不能为负数");
        }
        if self.max_retries < 0 {
            anyhow::bail!("TG_AI_MAX_RETRIES 不能为负数");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> AiConfig {
        AiConfig {
            enable: true,
            base_url: "https://api.example.com/v1".to_string(),
            api_key: "sk-test".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: 30,
            max_retries: 3,
        }
    }

    #[test]
    fn test_disabled_skips_validation() {
        let config = AiConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_valid_config() {
        let config = enabled_config();
        assert!(config.validate().is_ok());
        assert!(config.is_enabled());
    }

    #[test]
    fn test_rejects_missing_fields() {
        let mut config = enabled_config();
        config.base_url = String::new();
        assert!(config.validate().is_err());

        let mut config = enabled_config();
        config.api_key = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = enabled_config();
        config.model = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_url() {
        let mut config = enabled_config();
        config.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_for_nonpositive() {
        let config = AiConfig {
            timeout: 0,
            max_retries: -1,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.max_retries(), 3);
    }
}
