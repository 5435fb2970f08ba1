use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 操作员在 storages.json 中声明的存储, 与用户自定义存储共用同一套配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Alist(AlistConfig),
    Webdav(WebdavConfig),
    Local(LocalConfig),
    Telegram(TelegramConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlistConfig {
    pub name: String,
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub token: Option<String>,
    /// token 有效期 (秒), 同时也是后台刷新间隔
    #[serde(default = "default_token_exp")]
    pub token_exp: i64,
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebdavConfig {
    pub name: String,
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub name: String,
    pub base_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub name: String,
    pub chat_id: i64,
}

fn default_token_exp() -> i64 {
    3600
}

fn default_base_path() -> String {
    "/".to_string()
}

impl StorageConfig {
    pub fn name(&self) -> &str {
        match self {
            StorageConfig::Alist(c) => &c.name,
            StorageConfig::Webdav(c) => &c.name,
            StorageConfig::Local(c) => &c.name,
            StorageConfig::Telegram(c) => &c.name,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            StorageConfig::Alist(_) => "alist",
            StorageConfig::Webdav(_) => "webdav",
            StorageConfig::Local(_) => "local",
            StorageConfig::Telegram(_) => "telegram",
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name().trim().is_empty() {
            anyhow::bail!("存储名称不能为空");
        }
        match self {
            StorageConfig::Alist(c) => {
                if c.url.trim().is_empty() {
                    anyhow::bail!("Alist 存储 '{}' 缺少 url", c.name);
                }
                if c.token.is_none() && (c.username.is_empty() || c.password.is_empty()) {
                    anyhow::bail!("Alist 存储 '{}' 需要 token 或用户名密码", c.name);
                }
                if c.token_exp <= 0 {
                    anyhow::bail!("Alist 存储 '{}' 的 token_exp 必须为正数 (秒)", c.name);
                }
            }
            StorageConfig::Webdav(c) => {
                if c.url.trim().is_empty() {
                    anyhow::bail!("WebDAV 存储 '{}' 缺少 url", c.name);
                }
                if c.username.is_empty() || c.password.is_empty() {
                    anyhow::bail!("WebDAV 存储 '{}' 缺少用户名或密码", c.name);
                }
            }
            StorageConfig::Local(c) => {
                if c.base_path.trim().is_empty() {
                    anyhow::bail!("本地存储 '{}' 缺少 base_path", c.name);
                }
            }
            StorageConfig::Telegram(c) => {
                if c.chat_id == 0 {
                    anyhow::bail!("Telegram 存储 '{}' 的 chat_id 无效", c.name);
                }
            }
        }
        Ok(())
    }

    /// 从用户自定义存储记录还原配置 (type + JSON 字段)
    pub fn from_user_storage(name: &str, storage_type: &str, config_json: &str) -> Result<Self> {
        if config_json.is_empty() {
            anyhow::bail!("存储配置不能为空");
        }
        let mut value: serde_json::Value =
            serde_json::from_str(config_json).context("存储配置不是合法 JSON")?;
        let obj = value
            .as_object_mut()
            .context("存储配置必须为 JSON 对象")?;
        obj.insert("name".to_string(), serde_json::Value::String(name.to_string()));
        obj.insert(
            "type".to_string(),
            serde_json::Value::String(storage_type.to_lowercase()),
        );

        let config: StorageConfig =
            serde_json::from_value(value).with_context(|| format!("不支持的存储类型或字段缺失: {}", storage_type))?;
        config.validate()?;
        Ok(config)
    }
}

/// 加载操作员声明的存储列表; 文件不存在时返回空列表
pub fn load_storage_configs(path: &Path) -> Result<Vec<StorageConfig>> {
    if !path.exists() {
        tracing::warn!("存储配置文件不存在: {:?}", path);
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let configs: Vec<StorageConfig> = serde_json::from_str(&content)?;

    let mut seen = std::collections::HashSet::new();
    for config in &configs {
        config.validate()?;
        if !seen.insert(config.name().to_string()) {
            anyhow::bail!("存储名称重复: {}", config.name());
        }
    }

    Ok(configs)
}
