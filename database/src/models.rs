/// 用户记录, 首次交互时创建
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub chat_id: i64,
    pub silent: bool,
    pub default_storage: String,
    pub apply_rule: bool,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub id: i64,
    pub user_id: i64,
    /// FILENAME-REGEX / MESSAGE-REGEX / IS-ALBUM
    pub rule_type: String,
    pub data: String,
    pub storage_name: String,
    pub dir_path: String,
}

#[derive(Debug, Clone)]
pub struct Dir {
    pub id: i64,
    pub user_id: i64,
    pub storage_name: String,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct WatchChat {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub filter: String,
}

/// 用户自定义存储, config 为类型相关字段的 JSON 串
#[derive(Debug, Clone)]
pub struct UserStorage {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub storage_type: String,
    pub enable: bool,
    pub config: String,
    pub description: String,
}
