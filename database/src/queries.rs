use anyhow::{Context, Result};
use rusqlite::params;

use crate::models::{Dir, Rule, User, UserStorage, WatchChat};
use crate::Database;

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        silent: row.get::<_, i64>(2)? != 0,
        default_storage: row.get(3)?,
        apply_rule: row.get::<_, i64>(4)? != 0,
    })
}

fn row_to_rule(row: &rusqlite::Row<'_>) -> rusqlite::Result<Rule> {
    Ok(Rule {
        id: row.get(0)?,
        user_id: row.get(1)?,
        rule_type: row.get(2)?,
        data: row.get(3)?,
        storage_name: row.get(4)?,
        dir_path: row.get(5)?,
    })
}

fn row_to_user_storage(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserStorage> {
    Ok(UserStorage {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        storage_type: row.get(3)?,
        enable: row.get::<_, i64>(4)? != 0,
        config: row.get(5)?,
        description: row.get(6)?,
    })
}

// ---- users ----

/// 首次交互时创建用户, 已存在则直接返回
pub async fn get_or_create_user(db: &Database, chat_id: i64) -> Result<User> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (chat_id) VALUES (?1)",
                params![chat_id],
            )?;
            let user = conn.query_row(
                "SELECT id, chat_id, silent, default_storage, apply_rule
                 FROM users WHERE chat_id = ?1",
                params![chat_id],
                row_to_user,
            )?;
            Ok(user)
        })
        .await
        .context("获取用户失败")
}

pub async fn get_user_by_chat_id(db: &Database, chat_id: i64) -> Result<Option<User>> {
    db.connection()
        .call(move |conn| {
            let user = conn
                .query_row(
                    "SELECT id, chat_id, silent, default_storage, apply_rule
                     FROM users WHERE chat_id = ?1",
                    params![chat_id],
                    row_to_user,
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok(user)
        })
        .await
        .context("查询用户失败")
}

pub async fn set_default_storage(db: &Database, user_id: i64, storage_name: &str) -> Result<()> {
    let storage_name = storage_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE users SET default_storage = ?1 WHERE id = ?2",
                params![storage_name, user_id],
            )?;
            Ok(())
        })
        .await
        .context("更新默认存储失败")
}

pub async fn set_apply_rule(db: &Database, user_id: i64, apply: bool) -> Result<()> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE users SET apply_rule = ?1 WHERE id = ?2",
                params![apply as i64, user_id],
            )?;
            Ok(())
        })
        .await
        .context("更新规则开关失败")
}

// ---- rules ----

pub async fn rules_by_user(db: &Database, user_id: i64) -> Result<Vec<Rule>> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, type, data, storage_name, dir_path
                 FROM rules WHERE user_id = ?1 ORDER BY id ASC",
            )?;
            let rules = stmt
                .query_map(params![user_id], row_to_rule)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rules)
        })
        .await
        .context("查询规则失败")
}

pub async fn create_rule(
    db: &Database,
    user_id: i64,
    rule_type: &str,
    data: &str,
    storage_name: &str,
    dir_path: &str,
) -> Result<i64> {
    let rule_type = rule_type.to_string();
    let data = data.to_string();
    let storage_name = storage_name.to_string();
    let dir_path = dir_path.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO rules (user_id, type, data, storage_name, dir_path)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, rule_type, data, storage_name, dir_path],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .context("创建规则失败")
}

pub async fn delete_rule(db: &Database, user_id: i64, rule_id: i64) -> Result<bool> {
    db.connection()
        .call(move |conn| {
            let affected = conn.execute(
                "DELETE FROM rules WHERE id = ?1 AND user_id = ?2",
                params![rule_id, user_id],
            )?;
            Ok(affected > 0)
        })
        .await
        .context("删除规则失败")
}

// ---- dirs ----

pub async fn dirs_by_user(db: &Database, user_id: i64) -> Result<Vec<Dir>> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, storage_name, path
                 FROM dirs WHERE user_id = ?1 ORDER BY id ASC",
            )?;
            let dirs = stmt
                .query_map(params![user_id], |row| {
                    Ok(Dir {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        storage_name: row.get(2)?,
                        path: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(dirs)
        })
        .await
        .context("查询目录失败")
}

pub async fn create_dir(db: &Database, user_id: i64, storage_name: &str, path: &str) -> Result<i64> {
    let storage_name = storage_name.to_string();
    let path = path.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO dirs (user_id, storage_name, path) VALUES (?1, ?2, ?3)",
                params![user_id, storage_name, path],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .context("创建目录失败")
}

pub async fn delete_dir(db: &Database, user_id: i64, dir_id: i64) -> Result<bool> {
    db.connection()
        .call(move |conn| {
            let affected = conn.execute(
                "DELETE FROM dirs WHERE id = ?1 AND user_id = ?2",
                params![dir_id, user_id],
            )?;
            Ok(affected > 0)
        })
        .await
        .context("删除目录失败")
}

// ---- watch_chats ----

pub async fn watch_chats_by_user(db: &Database, user_id: i64) -> Result<Vec<WatchChat>> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, chat_id, filter
                 FROM watch_chats WHERE user_id = ?1 ORDER BY id ASC",
            )?;
            let chats = stmt
                .query_map(params![user_id], |row| {
                    Ok(WatchChat {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        chat_id: row.get(2)?,
                        filter: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(chats)
        })
        .await
        .context("查询监听会话失败")
}

// ---- user_storages ----

const USER_STORAGE_COLUMNS: &str = "id, user_id, name, type, enable, config, description";

pub async fn create_user_storage(
    db: &Database,
    user_id: i64,
    name: &str,
    storage_type: &str,
    config: &str,
    description: &str,
) -> Result<i64> {
    let name = name.to_string();
    let storage_type = storage_type.to_string();
    let config = config.to_string();
    let description = description.to_string();
    db.connection()
        .call(move |conn| {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM user_storages WHERE user_id = ?1 AND name = ?2",
                params![user_id, name],
                |row| row.get(0),
            )?;
            if exists > 0 {
                return Err(tokio_rusqlite::Error::Other(
                    format!("存储名称 '{}' 已存在", name).into(),
                ));
            }
            conn.execute(
                "INSERT INTO user_storages (user_id, name, type, enable, config, description)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                params![user_id, name, storage_type, config, description],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .context("创建用户存储失败")
}

pub async fn get_user_storage_by_id(db: &Database, id: i64) -> Result<Option<UserStorage>> {
    db.connection()
        .call(move |conn| {
            let storage = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM user_storages WHERE id = ?1",
                        USER_STORAGE_COLUMNS
                    ),
                    params![id],
                    row_to_user_storage,
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok(storage)
        })
        .await
        .context("查询用户存储失败")
}

pub async fn get_user_storage_by_name(
    db: &Database,
    user_id: i64,
    name: &str,
) -> Result<Option<UserStorage>> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let storage = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM user_storages WHERE user_id = ?1 AND name = ?2",
                        USER_STORAGE_COLUMNS
                    ),
                    params![user_id, name],
                    row_to_user_storage,
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok(storage)
        })
        .await
        .context("查询用户存储失败")
}

pub async fn user_storages_by_user(db: &Database, user_id: i64) -> Result<Vec<UserStorage>> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM user_storages WHERE user_id = ?1 ORDER BY id ASC",
                USER_STORAGE_COLUMNS
            ))?;
            let storages = stmt
                .query_map(params![user_id], row_to_user_storage)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(storages)
        })
        .await
        .context("查询用户存储失败")
}

pub async fn enabled_user_storages_by_user(db: &Database, user_id: i64) -> Result<Vec<UserStorage>> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM user_storages WHERE user_id = ?1 AND enable = 1 ORDER BY id ASC",
                USER_STORAGE_COLUMNS
            ))?;
            let storages = stmt
                .query_map(params![user_id], row_to_user_storage)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(storages)
        })
        .await
        .context("查询用户存储失败")
}

pub async fn update_user_storage(
    db: &Database,
    id: i64,
    name: &str,
    config: &str,
    description: &str,
) -> Result<()> {
    let name = name.to_string();
    let config = config.to_string();
    let description = description.to_string();
    db.connection()
        .call(move |conn| {
            let user_id: i64 = conn.query_row(
                "SELECT user_id FROM user_storages WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            // 改名时排除自身检查冲突
            let conflict: i64 = conn.query_row(
                "SELECT COUNT(*) FROM user_storages
                 WHERE user_id = ?1 AND name = ?2 AND id != ?3",
                params![user_id, name, id],
                |row| row.get(0),
            )?;
            if conflict > 0 {
                return Err(tokio_rusqlite::Error::Other(
                    format!("存储名称 '{}' 已存在", name).into(),
                ));
            }
            conn.execute(
                "UPDATE user_storages SET name = ?1, config = ?2, description = ?3 WHERE id = ?4",
                params![name, config, description, id],
            )?;
            Ok(())
        })
        .await
        .context("更新用户存储失败")
}

pub async fn delete_user_storage(db: &Database, id: i64) -> Result<()> {
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM user_storages WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .context("删除用户存储失败")
}

/// 切换启用状态, 返回切换后的记录
pub async fn toggle_user_storage(db: &Database, id: i64) -> Result<UserStorage> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE user_storages SET enable = 1 - enable WHERE id = ?1",
                params![id],
            )?;
            let storage = conn.query_row(
                &format!(
                    "SELECT {} FROM user_storages WHERE id = ?1",
                    USER_STORAGE_COLUMNS
                ),
                params![id],
                row_to_user_storage,
            )?;
            Ok(storage)
        })
        .await
        .context("切换存储状态失败")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_user_bootstrap() {
        let db = Database::open_in_memory().await.unwrap();
        let user = get_or_create_user(&db, 1001).await.unwrap();
        assert_eq!(user.chat_id, 1001);
        assert!(!user.apply_rule);

        let again = get_or_create_user(&db, 1001).await.unwrap();
        assert_eq!(again.id, user.id);

        set_default_storage(&db, user.id, "nas").await.unwrap();
        let loaded = get_user_by_chat_id(&db, 1001).await.unwrap().unwrap();
        assert_eq!(loaded.default_storage, "nas");
    }

    #[tokio::test]
    async fn test_rules_crud() {
        let db = Database::open_in_memory().await.unwrap();
        let user = get_or_create_user(&db, 1).await.unwrap();

        let id = create_rule(&db, user.id, "FILENAME-REGEX", r"\.mp4$", "nas", "/video")
            .await
            .unwrap();
        let rules = rules_by_user(&db, user.id).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_type, "FILENAME-REGEX");

        assert!(delete_rule(&db, user.id, id).await.unwrap());
        assert!(rules_by_user(&db, user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_storage_name_unique() {
        let db = Database::open_in_memory().await.unwrap();
        let user = get_or_create_user(&db, 2).await.unwrap();

        create_user_storage(&db, user.id, "dav", "webdav", "{}", "")
            .await
            .unwrap();
        assert!(create_user_storage(&db, user.id, "dav", "webdav", "{}", "")
            .await
            .is_err());

        // 其他用户可以使用同名存储
        let other = get_or_create_user(&db, 3).await.unwrap();
        create_user_storage(&db, other.id, "dav", "webdav", "{}", "")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_toggle_user_storage() {
        let db = Database::open_in_memory().await.unwrap();
        let user = get_or_create_user(&db, 4).await.unwrap();
        let id = create_user_storage(&db, user.id, "disk", "local", r#"{"base_path":"/x"}"#, "")
            .await
            .unwrap();

        let toggled = toggle_user_storage(&db, id).await.unwrap();
        assert!(!toggled.enable);
        let enabled = enabled_user_storages_by_user(&db, user.id).await.unwrap();
        assert!(enabled.is_empty());

        let toggled = toggle_user_storage(&db, id).await.unwrap();
        assert!(toggled.enable);
    }
}
