use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

use config::StorageConfig;
use database::{queries, Database, UserStorage};

use crate::registry::new_storage;
use crate::telegram::ChannelUploader;
use crate::traits::{Storage, StorageKind};

/// 存储管理器: 合并操作员声明的存储与用户自定义存储
///
/// 解析顺序: 用户自定义 (仅启用的) 优先, 其次操作员声明。
pub struct StorageManager {
    db: Database,
    operator: Vec<Arc<dyn Storage>>,
    uploader: Option<Arc<dyn ChannelUploader>>,
}

impl StorageManager {
    pub fn new(
        db: Database,
        operator: Vec<Arc<dyn Storage>>,
        uploader: Option<Arc<dyn ChannelUploader>>,
    ) -> Self {
        Self {
            db,
            operator,
            uploader,
        }
    }

    fn operator_by_name(&self, name: &str) -> Option<Arc<dyn Storage>> {
        self.operator.iter().find(|s| s.name() == name).cloned()
    }

    async fn build_user_storage(&self, record: &UserStorage) -> Result<Arc<dyn Storage>> {
        let config =
            StorageConfig::from_user_storage(&record.name, &record.storage_type, &record.config)?;
        let storage = new_storage(&config, self.uploader.clone())
            .await
            .context("创建存储实例失败")?;
        Ok(storage)
    }

    /// 按名称解析用户可见的存储; 禁用的自定义存储视为不存在
    pub async fn get_user_storage_by_name(
        &self,
        chat_id: i64,
        name: &str,
    ) -> Result<Arc<dyn Storage>> {
        if let Some(user) = queries::get_user_by_chat_id(&self.db, chat_id).await? {
            if let Some(record) =
                queries::get_user_storage_by_name(&self.db, user.id, name).await?
            {
                if record.enable {
                    return self.build_user_storage(&record).await;
                }
            }
        }

        self.operator_by_name(name)
            .ok_or_else(|| anyhow::anyhow!("存储 '{}' 不存在或不可用", name))
    }

    /// 用户所有可用存储: 操作员声明 + 启用的自定义存储
    pub async fn all_user_storages(&self, chat_id: i64) -> Result<Vec<Arc<dyn Storage>>> {
        let mut storages = self.operator.clone();

        let Some(user) = queries::get_user_by_chat_id(&self.db, chat_id).await? else {
            return Ok(storages);
        };

        for record in queries::enabled_user_storages_by_user(&self.db, user.id).await? {
            match self.build_user_storage(&record).await {
                Ok(storage) => storages.push(storage),
                Err(e) => {
                    warn!("跳过无法构造的用户存储 '{}': {}", record.name, e);
                }
            }
        }

        Ok(storages)
    }

    pub async fn storage_names(&self, chat_id: i64) -> Result<Vec<String>> {
        Ok(self
            .all_user_storages(chat_id)
            .await?
            .iter()
            .map(|s| s.name().to_string())
            .collect())
    }

    pub async fn create_user_storage(
        &self,
        chat_id: i64,
        name: &str,
        storage_type: &str,
        config_json: &str,
        description: &str,
    ) -> Result<()> {
        if StorageKind::parse(storage_type).is_none() {
            anyhow::bail!("不支持的存储类型: {}", storage_type);
        }

        let user = queries::get_or_create_user(&self.db, chat_id).await?;

        let config = StorageConfig::from_user_storage(name, storage_type, config_json)
            .context("配置验证失败")?;
        self.test_connection(&config)
            .await
            .context("存储连接测试失败")?;

        queries::create_user_storage(&self.db, user.id, name, storage_type, config_json, description)
            .await?;
        Ok(())
    }

    pub async fn update_user_storage(
        &self,
        chat_id: i64,
        storage_id: i64,
        name: &str,
        config_json: &str,
        description: &str,
    ) -> Result<()> {
        let (_, record) = self.owned_storage(chat_id, storage_id).await?;

        let config = StorageConfig::from_user_storage(name, &record.storage_type, config_json)
            .context("配置验证失败")?;
        self.test_connection(&config)
            .await
            .context("存储连接测试失败")?;

        queries::update_user_storage(&self.db, storage_id, name, config_json, description).await?;
        Ok(())
    }

    pub async fn delete_user_storage(&self, chat_id: i64, storage_id: i64) -> Result<()> {
        let (user, record) = self.owned_storage(chat_id, storage_id).await?;

        if user.default_storage == record.name {
            anyhow::bail!("无法删除默认存储, 请先设置其他存储为默认");
        }

        queries::delete_user_storage(&self.db, storage_id).await?;
        Ok(())
    }

    pub async fn toggle_user_storage(&self, chat_id: i64, storage_id: i64) -> Result<bool> {
        let (user, record) = self.owned_storage(chat_id, storage_id).await?;

        if record.enable && user.default_storage == record.name {
            anyhow::bail!("无法禁用默认存储, 请先设置其他存储为默认");
        }

        let toggled = queries::toggle_user_storage(&self.db, storage_id).await?;
        Ok(toggled.enable)
    }

    pub async fn test_user_storage_connection(&self, chat_id: i64, name: &str) -> Result<()> {
        let user = queries::get_user_by_chat_id(&self.db, chat_id)
            .await?
            .context("用户不存在")?;
        let record = queries::get_user_storage_by_name(&self.db, user.id, name)
            .await?
            .context("存储配置不存在")?;
        if !record.enable {
            anyhow::bail!("存储已禁用");
        }

        let config =
            StorageConfig::from_user_storage(&record.name, &record.storage_type, &record.config)?;
        self.test_connection(&config).await
    }

    /// 连接测试按类型区分: 本地看路径, Telegram 看会话可达, 网络类能构造即可
    pub async fn test_connection(&self, config: &StorageConfig) -> Result<()> {
        let storage = new_storage(config, self.uploader.clone())
            .await
            .context("创建存储实例失败")?;

        match storage.kind() {
            StorageKind::Local => {
                let root = storage.join_storage_path("/");
                if !storage.exists(&root).await.unwrap_or(false) {
                    anyhow::bail!("本地路径不存在或无访问权限");
                }
            }
            StorageKind::Telegram => {
                // exists 在会话不可达时返回错误
                storage
                    .exists("/")
                    .await
                    .map_err(|e| anyhow::anyhow!("{}", e))?;
            }
            // 网络存储能成功构造即视为配置有效, 真正的连通性推迟到首次使用
            StorageKind::Alist | StorageKind::Webdav => {}
        }

        Ok(())
    }

    async fn owned_storage(
        &self,
        chat_id: i64,
        storage_id: i64,
    ) -> Result<(database::User, UserStorage)> {
        let user = queries::get_user_by_chat_id(&self.db, chat_id)
            .await?
            .context("用户不存在")?;
        let record = queries::get_user_storage_by_id(&self.db, storage_id)
            .await?
            .context("存储配置不存在")?;
        if record.user_id != user.id {
            anyhow::bail!("无权限操作此存储配置");
        }
        Ok((user, record))
    }
}

/// 把向导式的参数列表转换为类型对应的 JSON 配置
pub fn validate_storage_config_data(storage_type: &str, fields: &[String]) -> Result<String> {
    let trimmed: Vec<String> = fields.iter().map(|f| f.trim().to_string()).collect();

    let value = match storage_type.to_lowercase().as_str() {
        "alist" => {
            if trimmed.len() < 3 {
                anyhow::bail!("Alist 存储至少需要 3 个参数: URL,用户名,密码");
            }
            let base_path = trimmed.get(3).filter(|s| !s.is_empty()).cloned();
            serde_json::json!({
                "url": trimmed[0],
                "username": trimmed[1],
                "password": trimmed[2],
                "base_path": base_path.unwrap_or_else(|| "/".to_string()),
            })
        }
        "webdav" => {
            if trimmed.len() < 3 {
                anyhow::bail!("WebDAV 存储至少需要 3 个参数: URL,用户名,密码");
            }
            let base_path = trimmed.get(3).filter(|s| !s.is_empty()).cloned();
            serde_json::json!({
                "url": trimmed[0],
                "username": trimmed[1],
                "password": trimmed[2],
                "base_path": base_path.unwrap_or_else(|| "/".to_string()),
            })
        }
        "local" => {
            if trimmed.is_empty() || trimmed[0].is_empty() {
                anyhow::bail!("本地存储需要 1 个参数: 路径");
            }
            serde_json::json!({ "base_path": trimmed[0] })
        }
        "telegram" => {
            let chat_id = trimmed
                .first()
                .and_then(|s| s.parse::<i64>().ok())
                .context("无效的 chat_id 格式")?;
            serde_json::json!({ "chat_id": chat_id })
        }
        other => anyhow::bail!("不支持的存储类型: {}", other),
    };

    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "manager_test_{}_{}_{}",
            tag,
            std::process::id(),
            common::next_task_id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn manager_with_operator(dir: &PathBuf) -> StorageManager {
        let db = Database::open_in_memory().await.unwrap();
        let config = StorageConfig::Local(config::LocalConfig {
            name: "op-disk".to_string(),
            base_path: dir.to_string_lossy().to_string(),
        });
        let operator = vec![new_storage(&config, None).await.unwrap()];
        StorageManager::new(db, operator, None)
    }

    fn local_config_json(dir: &PathBuf) -> String {
        serde_json::json!({ "base_path": dir.to_string_lossy() }).to_string()
    }

    #[tokio::test]
    async fn test_resolution_order_prefers_user_storage() {
        let op_dir = temp_dir("op");
        let user_dir = temp_dir("user");
        let manager = manager_with_operator(&op_dir).await;

        // 同名的用户自定义存储优先于操作员存储
        manager
            .create_user_storage(100, "op-disk", "local", &local_config_json(&user_dir), "")
            .await
            .unwrap();

        let storage = manager.get_user_storage_by_name(100, "op-disk").await.unwrap();
        assert!(storage
            .join_storage_path("/")
            .starts_with(&*user_dir.to_string_lossy()));

        std::fs::remove_dir_all(&op_dir).ok();
        std::fs::remove_dir_all(&user_dir).ok();
    }

    #[tokio::test]
    async fn test_disabled_storage_invisible() {
        let op_dir = temp_dir("op2");
        let user_dir = temp_dir("user2");
        let manager = manager_with_operator(&op_dir).await;

        manager
            .create_user_storage(101, "mine", "local", &local_config_json(&user_dir), "")
            .await
            .unwrap();
        assert!(manager.get_user_storage_by_name(101, "mine").await.is_ok());

        let user = queries::get_user_by_chat_id(&manager.db, 101)
            .await
            .unwrap()
            .unwrap();
        let record = queries::get_user_storage_by_name(&manager.db, user.id, "mine")
            .await
            .unwrap()
            .unwrap();
        manager.toggle_user_storage(101, record.id).await.unwrap();

        // 禁用后按不存在处理
        assert!(manager.get_user_storage_by_name(101, "mine").await.is_err());
        // 操作员存储不受影响
        assert!(manager.get_user_storage_by_name(101, "op-disk").await.is_ok());

        std::fs::remove_dir_all(&op_dir).ok();
        std::fs::remove_dir_all(&user_dir).ok();
    }

    #[tokio::test]
    async fn test_default_storage_guard() {
        let op_dir = temp_dir("op3");
        let user_dir = temp_dir("user3");
        let manager = manager_with_operator(&op_dir).await;

        manager
            .create_user_storage(102, "main", "local", &local_config_json(&user_dir), "")
            .await
            .unwrap();
        let user = queries::get_user_by_chat_id(&manager.db, 102)
            .await
            .unwrap()
            .unwrap();
        queries::set_default_storage(&manager.db, user.id, "main")
            .await
            .unwrap();
        let record = queries::get_user_storage_by_name(&manager.db, user.id, "main")
            .await
            .unwrap()
            .unwrap();

        assert!(manager.toggle_user_storage(102, record.id).await.is_err());
        assert!(manager.delete_user_storage(102, record.id).await.is_err());

        queries::set_default_storage(&manager.db, user.id, "op-disk")
            .await
            .unwrap();
        assert!(manager.delete_user_storage(102, record.id).await.is_ok());

        std::fs::remove_dir_all(&op_dir).ok();
        std::fs::remove_dir_all(&user_dir).ok();
    }

    #[test]
    fn test_validate_storage_config_data() {
        let json = validate_storage_config_data(
            "alist",
            &[
                "http://127.0.0.1:5244".to_string(),
                "admin".to_string(),
                "pw".to_string(),
            ],
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["base_path"], "/");

        assert!(validate_storage_config_data("alist", &["only-url".to_string()]).is_err());
        assert!(validate_storage_config_data("telegram", &["abc".to_string()]).is_err());
        assert!(validate_storage_config_data("minio", &[]).is_err());

        let json =
            validate_storage_config_data("telegram", &["-1001234".to_string()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["chat_id"], -1001234);
    }
}
