pub mod models;
pub mod queries;

use anyhow::{Context, Result};
use std::path::Path;

pub use models::*;

/// 所有写入经由 tokio-rusqlite 的单一后台线程串行化
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .context("打开数据库失败")?;
        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    async fn migrate(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode = WAL;
                    PRAGMA foreign_keys = ON;

                    CREATE TABLE IF NOT EXISTS users (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        chat_id INTEGER NOT NULL UNIQUE,
                        silent INTEGER NOT NULL DEFAULT 0,
                        default_storage TEXT NOT NULL DEFAULT '',
                        apply_rule INTEGER NOT NULL DEFAULT 0
                    );

                    CREATE TABLE IF NOT EXISTS rules (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                        type TEXT NOT NULL,
                        data TEXT NOT NULL,
                        storage_name TEXT NOT NULL DEFAULT '',
                        dir_path TEXT NOT NULL DEFAULT ''
                    );

                    CREATE TABLE IF NOT EXISTS dirs (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                        storage_name TEXT NOT NULL,
                        path TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS watch_chats (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                        chat_id INTEGER NOT NULL,
                        filter TEXT NOT NULL DEFAULT ''
                    );

                    CREATE TABLE IF NOT EXISTS user_storages (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                        name TEXT NOT NULL,
                        type TEXT NOT NULL,
                        enable INTEGER NOT NULL DEFAULT 1,
                        config TEXT NOT NULL DEFAULT '',
                        description TEXT NOT NULL DEFAULT '',
                        UNIQUE(user_id, name)
                    );
                    "#,
                )?;
                Ok(())
            })
            .await
            .context("初始化数据库表失败")?;
        Ok(())
    }
}
