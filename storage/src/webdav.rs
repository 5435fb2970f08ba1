use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;
use tracing::{debug, info, warn};

use config::WebdavConfig;

use crate::error::StorageError;
use crate::traits::{collision_candidate, join_path, SaveSource, Storage, StorageKind};

/// WebDAV 存储, 基于 PUT/MKCOL/PROPFIND
pub struct WebdavStorage {
    config: WebdavConfig,
    client: reqwest::Client,
    base_url: String,
}

impl WebdavStorage {
    pub fn new(config: WebdavConfig) -> Result<Self, StorageError> {
        if config.url.trim().is_empty() {
            return Err(StorageError::Validation("WebDAV 存储缺少 url".to_string()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(StorageError::transport)?;
        let base_url = config.url.trim_end_matches('/').to_string();
        Ok(Self {
            config,
            client,
            base_url,
        })
    }

    /// 把存储路径编码为请求 URL, 逐段转义
    fn url_for(&self, storage_path: &str) -> String {
        let encoded = storage_path
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.base_url, encoded)
    }

    /// 逐级 MKCOL; 目录已存在时服务端返回 405, 一律忽略
    async fn ensure_collections(&self, dir: &str) {
        let segments: Vec<&str> = dir
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let mut current = String::new();
        for segment in segments {
            current.push('/');
            current.push_str(segment);
            let url = self.url_for(&current);
            let result = self
                .client
                .request(Method::from_bytes(b"MKCOL").expect("合法方法名"), url)
                .basic_auth(&self.config.username, Some(&self.config.password))
                .timeout(Duration::from_secs(15))
                .send()
                .await;
            if let Err(e) = result {
                debug!("WebDAV[{}] MKCOL {} 失败: {}", self.config.name, current, e);
                return;
            }
        }
    }
}

#[async_trait]
impl Storage for WebdavStorage {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Webdav
    }

    fn join_storage_path(&self, path: &str) -> String {
        join_path(&self.config.base_path, path)
    }

    async fn save(
        &self,
        source: &mut SaveSource<'_>,
        storage_path: &str,
    ) -> Result<(), StorageError> {
        let storage_path = match common::validate_storage_path(storage_path) {
            Ok(()) => storage_path.to_string(),
            Err(reason) => {
                warn!(
                    "WebDAV[{}] 路径未通过校验 ({}), 尝试清理",
                    self.config.name, reason
                );
                let sanitized = common::sanitize_storage_path(storage_path);
                common::validate_storage_path(&sanitized).map_err(StorageError::Safety)?;
                sanitized
            }
        };

        if let Some(idx) = storage_path.rfind('/') {
            if idx > 0 {
                self.ensure_collections(&storage_path[..idx]).await;
            }
        }

        let mut candidate = storage_path.clone();
        let mut index = 1;
        loop {
            match self.exists(&candidate).await {
                Ok(false) => break,
                Ok(true) => {}
                Err(StorageError::AmbiguousExists(msg)) => {
                    warn!(
                        "WebDAV[{}] 无法确认 {} 是否存在 ({}), 按已存在处理",
                        self.config.name, candidate, msg
                    );
                }
                Err(e) => return Err(e),
            }
            if index > 100 {
                return Err(StorageError::Remote {
                    code: 0,
                    message: format!("冲突探测超过上限: {}", storage_path),
                });
            }
            candidate = collision_candidate(&storage_path, index);
            index += 1;
        }

        // 已落盘的任务直接流式读文件, 纯流式来源只能一次性读入
        let body = if let Some(path) = source.local_path() {
            let file = tokio::fs::File::open(path).await?;
            let stream = futures_util::stream::unfold(file, |mut file| async move {
                let mut buf = vec![0u8; 64 * 1024];
                match tokio::io::AsyncReadExt::read(&mut file, &mut buf).await {
                    Ok(0) => None,
                    Ok(n) => {
                        buf.truncate(n);
                        Some((Ok::<_, std::io::Error>(buf), file))
                    }
                    Err(e) => Some((Err(e), file)),
                }
            });
            reqwest::Body::wrap_stream(stream)
        } else {
            let mut data = Vec::new();
            tokio::io::AsyncReadExt::read_to_end(source.reader(), &mut data).await?;
            reqwest::Body::from(data)
        };

        let resp = self
            .client
            .put(self.url_for(&candidate))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(StorageError::transport)?;

        let status = resp.status();
        if status.is_success() {
            info!("WebDAV[{}] 文件已保存: {}", self.config.name, candidate);
            return Ok(());
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(StorageError::Auth(format!("上传被拒绝: {}", status)));
        }
        Err(StorageError::Remote {
            code: status.as_u16() as i64,
            message: format!("上传失败: {}", status),
        })
    }

    async fn exists(&self, storage_path: &str) -> Result<bool, StorageError> {
        let resp = self
            .client
            .request(
                Method::from_bytes(b"PROPFIND").expect("合法方法名"),
                self.url_for(storage_path),
            )
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Depth", "0")
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(StorageError::transport)?;

        let status = resp.status().as_u16();
        match status {
            200 | 207 => Ok(true),
            404 => Ok(false),
            401 | 403 => Err(StorageError::Auth(format!("存在性检查被拒绝: {}", status))),
            other => Err(StorageError::AmbiguousExists(format!("状态码 {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webdav() -> WebdavStorage {
        WebdavStorage::new(WebdavConfig {
            name: "dav".to_string(),
            url: "https://dav.example.com/remote.php".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
            base_path: "/files".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_url_encoding() {
        let storage = webdav();
        assert_eq!(
            storage.url_for("/a b/c#d.txt"),
            "https://dav.example.com/remote.php/a%20b/c%23d.txt"
        );
    }

    #[test]
    fn test_join_storage_path() {
        let storage = webdav();
        assert_eq!(storage.join_storage_path("x/y.bin"), "/files/x/y.bin");
    }
}
