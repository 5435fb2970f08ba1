mod api;
pub mod auth;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use api::{FsGetRequest, FsGetResponse, LoginRequest, LoginResponse, MeResponse, PutResponse};
use auth::{calculate_backoff, is_auth_error, AuthState};
use config::AlistConfig;

use crate::error::StorageError;
use crate::traits::{collision_candidate, join_path, SaveSource, Storage, StorageKind};

/// 操作内部最多尝试次数 (首次 + 重试)
const MAX_ATTEMPTS: usize = 3;
/// 冲突探测上限, 防止存在性检查持续不可信时无限追加后缀
const MAX_COLLISION_PROBES: usize = 100;
/// token 剩余不足该值时主动刷新
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

struct TokenState {
    token: String,
    expiry: Option<Instant>,
}

pub struct AlistStorage {
    config: AlistConfig,
    client: reqwest::Client,
    base_url: String,
    token: RwLock<TokenState>,
    /// 认证流程串行化; 同一实例任意时刻至多一次重新认证
    auth: Mutex<AuthState>,
    login: Option<LoginRequest>,
}

impl AlistStorage {
    pub async fn new(config: AlistConfig) -> Result<Arc<Self>, StorageError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(StorageError::transport)?;

        let base_url = config.url.trim_end_matches('/').to_string();
        let login = if config.token.is_none() {
            Some(LoginRequest {
                username: config.username.clone(),
                password: config.password.clone(),
            })
        } else {
            None
        };

        let storage = Arc::new(Self {
            client,
            base_url,
            token: RwLock::new(TokenState {
                token: config.token.clone().unwrap_or_default(),
                expiry: None,
            }),
            auth: Mutex::new(AuthState::new()),
            login,
            config,
        });

        if storage.login.is_none() {
            // 静态 token: 验证一次后直接使用, 不做定时刷新
            storage.verify_token().await?;
            storage.auth.lock().await.record_success();
            debug!("Alist[{}] 静态 token 验证通过", storage.config.name);
        } else {
            let token = storage.login_request().await?;
            storage.store_token(token).await;
            storage.auth.lock().await.record_success();
            debug!("Alist[{}] 登录成功", storage.config.name);
            Self::spawn_refresh_loop(&storage);
        }

        Ok(storage)
    }

    /// 后台按 token_exp 周期重登录; 实例释放后自动退出
    fn spawn_refresh_loop(storage: &Arc<Self>) {
        let weak = Arc::downgrade(storage);
        let interval = Duration::from_secs(storage.config.token_exp.max(1) as u64);
        let name = storage.config.name.clone();

        tokio::spawn(async move {
            info!("Alist[{}] token 刷新循环启动, 周期 {:?}", name, interval);
            loop {
                tokio::time::sleep(interval).await;
                let Some(storage) = weak.upgrade() else {
                    break;
                };

                match storage.login_request().await {
                    Ok(token) => {
                        storage.store_token(token).await;
                        storage.auth.lock().await.record_success();
                        debug!("Alist[{}] 定时刷新 token 成功", name);
                    }
                    Err(e) => {
                        error!("Alist[{}] 定时刷新 token 失败: {}", name, e);
                        // 刷新失败后等 30 秒再回到正常周期
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            }
            debug!("Alist[{}] token 刷新循环退出", name);
        });
    }

    async fn bearer_token(&self) -> String {
        let state = self.token.read().await;
        if state.token.is_empty() {
            return String::new();
        }
        if state.token.starts_with("Bearer ") {
            state.token.clone()
        } else {
            format!("Bearer {}", state.token)
        }
    }

    async fn store_token(&self, token: String) {
        let mut state = self.token.write().await;
        let changed = state.token != token;
        state.token = token;
        state.expiry = Some(Instant::now() + Duration::from_secs(self.config.token_exp as u64));
        debug!(
            "Alist[{}] token 已更新 ({})",
            self.config.name,
            if changed { "变更" } else { "续期" }
        );
    }

    async fn login_request(&self) -> Result<String, StorageError> {
        let login = self
            .login
            .as_ref()
            .ok_or_else(|| StorageError::Auth("没有可用的登录信息".to_string()))?;

        let resp = self
            .client
            .post(format!("{}/api/auth/login", self.base_url))
            .timeout(Duration::from_secs(30))
            .json(login)
            .send()
            .await
            .map_err(StorageError::transport)?;

        let login_resp: LoginResponse = resp.json().await.map_err(StorageError::transport)?;
        if login_resp.code != 200 {
            return Err(StorageError::Auth(format!(
                "登录失败 (code {}): {}",
                login_resp.code, login_resp.message
            )));
        }

        match login_resp.data {
            Some(data) if !data.token.is_empty() => Ok(data.token),
            _ => Err(StorageError::Auth("登录响应缺少 token".to_string())),
        }
    }

    /// 调用 /api/me 验证当前 token
    async fn verify_token(&self) -> Result<(), StorageError> {
        let resp = self
            .client
            .get(format!("{}/api/me", self.base_url))
            .timeout(Duration::from_secs(10))
            .header("Authorization", self.bearer_token().await)
            .send()
            .await
            .map_err(StorageError::transport)?;

        let me: MeResponse = resp.json().await.map_err(StorageError::transport)?;
        if me.code != 200 {
            if is_auth_error(me.code, &me.message) {
                return Err(StorageError::Auth(format!(
                    "token 验证失败 (code {}): {}",
                    me.code, me.message
                )));
            }
            return Err(StorageError::Remote {
                code: me.code,
                message: me.message,
            });
        }

        if let Some(data) = me.data {
            debug!("Alist[{}] 当前用户: {}", self.config.name, data.username);
        }
        Ok(())
    }

    /// 串行化的重新认证, 带指数退避与冷却
    async fn ensure_auth(&self) -> Result<(), StorageError> {
        let mut auth = self.auth.lock().await;

        let now = Instant::now();
        if let Some(remaining) = auth.cooldown_remaining(now) {
            warn!(
                "Alist[{}] 认证冷却中, 剩余 {:?}",
                self.config.name, remaining
            );
            return Err(StorageError::Cooldown(remaining));
        }

        if self.login.is_none() {
            auth.record_failure(now);
            return Err(StorageError::Auth(
                "静态 token 失效且没有登录信息, 无法重新认证".to_string(),
            ));
        }

        let backoff = calculate_backoff(auth.consecutive_failures);
        if let Some(last) = auth.last_attempt {
            let since = now.duration_since(last);
            if since < backoff {
                let wait = backoff - since;
                info!("Alist[{}] 认证退避等待 {:?}", self.config.name, wait);
                tokio::time::sleep(wait).await;
            }
        }

        info!(
            "Alist[{}] 尝试重新认证 (第 {} 次)",
            self.config.name,
            auth.consecutive_failures + 1
        );
        auth.last_attempt = Some(Instant::now());

        match self.login_request().await {
            Ok(token) => {
                self.store_token(token).await;
                auth.record_success();
                info!("Alist[{}] 重新认证成功", self.config.name);
                Ok(())
            }
            Err(e) => {
                if let Some(cooldown) = auth.record_failure(Instant::now()) {
                    error!(
                        "Alist[{}] 连续认证失败 {} 次, 进入冷却 {:?}",
                        self.config.name, auth.consecutive_failures, cooldown
                    );
                }
                Err(StorageError::Auth(format!(
                    "重新认证失败 (第 {} 次): {}",
                    auth.consecutive_failures, e
                )))
            }
        }
    }

    /// token 即将过期或状态未认证时, 先行校验/刷新
    async fn ensure_token_valid(&self) -> Result<(), StorageError> {
        let expiring = {
            let state = self.token.read().await;
            match state.expiry {
                Some(expiry) => expiry.saturating_duration_since(Instant::now()) < TOKEN_REFRESH_MARGIN,
                None => false,
            }
        };
        if expiring {
            info!("Alist[{}] token 即将过期, 主动刷新", self.config.name);
            return self.ensure_auth().await;
        }

        let authenticated = self.auth.lock().await.authenticated;
        if !authenticated {
            debug!("Alist[{}] 上次认证失败, 验证 token", self.config.name);
            match self.verify_token().await {
                Ok(()) => {
                    self.auth.lock().await.record_success();
                }
                Err(e) => {
                    info!("Alist[{}] token 验证失败: {}, 重新认证", self.config.name, e);
                    return self.ensure_auth().await;
                }
            }
        }

        Ok(())
    }

    async fn fs_get(&self, path: &str) -> Result<FsGetResponse, StorageError> {
        let resp = self
            .client
            .post(format!("{}/api/fs/get", self.base_url))
            .timeout(Duration::from_secs(30))
            .header("Authorization", self.bearer_token().await)
            .json(&FsGetRequest {
                path: path.to_string(),
                password: String::new(),
            })
            .send()
            .await
            .map_err(StorageError::transport)?;

        resp.json().await.map_err(StorageError::transport)
    }

    /// 深层目录的可达性探测; 只记录告警, Alist 会在上传时自动建目录
    async fn ensure_directory_accessible(&self, dir: &str) -> bool {
        for attempt in 0..MAX_ATTEMPTS {
            match self.fs_get(dir).await {
                Ok(resp) if resp.code == 200 => return true,
                Ok(resp) if is_auth_error(resp.code, &resp.message) => {
                    warn!(
                        "Alist[{}] 目录检查遇到认证错误 (code {}): {}",
                        self.config.name, resp.code, resp.message
                    );
                    if self.ensure_auth().await.is_err() {
                        continue;
                    }
                }
                Ok(resp) => {
                    debug!(
                        "Alist[{}] 目录检查失败 (code {}): {}",
                        self.config.name, resp.code, resp.message
                    );
                    return false;
                }
                Err(e) => {
                    debug!(
                        "Alist[{}] 目录检查请求失败 (第 {} 次): {}",
                        self.config.name,
                        attempt + 1,
                        e
                    );
                }
            }
        }
        false
    }

    async fn exists_inner(&self, storage_path: &str) -> Result<bool, StorageError> {
        let mut last_err: Option<StorageError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                debug!(
                    "Alist[{}] 重试存在性检查 (第 {}/{} 次): {}",
                    self.config.name,
                    attempt + 1,
                    MAX_ATTEMPTS,
                    storage_path
                );
            }

            match self.fs_get(storage_path).await {
                Ok(resp) if resp.code == 200 => return Ok(true),
                Ok(resp) if resp.code == 404 => return Ok(false),
                Ok(resp) if is_auth_error(resp.code, &resp.message) => {
                    warn!(
                        "Alist[{}] 存在性检查遇到认证错误 (code {}): {}",
                        self.config.name, resp.code, resp.message
                    );
                    match self.ensure_auth().await {
                        Ok(()) => continue,
                        Err(e) => last_err = Some(e),
                    }
                }
                Ok(resp) => {
                    // 非认证的远端错误不可重试, 结果不可信
                    return Err(StorageError::AmbiguousExists(format!(
                        "code {}: {}",
                        resp.code, resp.message
                    )));
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            StorageError::Transport("存在性检查重试耗尽".to_string())
        }))
    }

    /// 选出无冲突的目标路径; 结果不可信时按已存在处理继续追加后缀
    async fn resolve_candidate(&self, storage_path: &str) -> Result<String, StorageError> {
        let mut candidate = storage_path.to_string();

        for index in 1..=MAX_COLLISION_PROBES {
            match self.exists_inner(&candidate).await {
                Ok(false) => return Ok(candidate),
                Ok(true) => {}
                Err(StorageError::Cooldown(d)) => return Err(StorageError::Cooldown(d)),
                Err(e) => {
                    warn!(
                        "Alist[{}] 无法确认 {} 是否存在 ({}), 按已存在处理",
                        self.config.name, candidate, e
                    );
                }
            }
            candidate = collision_candidate(storage_path, index);
        }

        Err(StorageError::Remote {
            code: 0,
            message: format!("冲突探测超过 {} 次: {}", MAX_COLLISION_PROBES, storage_path),
        })
    }

    async fn upload_body(
        &self,
        source: &mut SaveSource<'_>,
        buffered: &mut Option<Vec<u8>>,
    ) -> Result<(reqwest::Body, u64), StorageError> {
        // 优先从缓存文件构造请求体, 重试时重新打开, 不在内存里保留整个文件
        if let Some(path) = source.local_path() {
            let file = tokio::fs::File::open(path).await?;
            let len = file.metadata().await?.len();
            let stream = futures_util::stream::unfold(file, |mut file| async move {
                let mut buf = vec![0u8; 64 * 1024];
                match file.read(&mut buf).await {
                    Ok(0) => None,
                    Ok(n) => {
                        buf.truncate(n);
                        Some((Ok::<_, std::io::Error>(buf), file))
                    }
                    Err(e) => Some((Err(e), file)),
                }
            });
            return Ok((reqwest::Body::wrap_stream(stream), len));
        }

        // 没有落盘文件时只读取一次, 重试共用这份缓冲
        if buffered.is_none() {
            let mut data = Vec::new();
            source.reader().read_to_end(&mut data).await?;
            *buffered = Some(data);
        }
        let data = buffered.as_ref().unwrap().clone();
        let len = data.len() as u64;
        Ok((reqwest::Body::from(data), len))
    }

    async fn save_with_retry(
        &self,
        source: &mut SaveSource<'_>,
        candidate: &str,
    ) -> Result<(), StorageError> {
        let mut buffered: Option<Vec<u8>> = None;
        let mut last_err: Option<StorageError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                info!(
                    "Alist[{}] 重试上传 (第 {}/{} 次): {}",
                    self.config.name,
                    attempt + 1,
                    MAX_ATTEMPTS,
                    candidate
                );
            }

            let (body, len) = self.upload_body(source, &mut buffered).await?;

            let result = self
                .client
                .put(format!("{}/api/fs/put", self.base_url))
                .header("Authorization", self.bearer_token().await)
                .header("File-Path", urlencoding::encode(candidate).into_owned())
                .header("Content-Type", "application/octet-stream")
                .header("Content-Length", len)
                .body(body)
                .send()
                .await;

            let resp = match result {
                Ok(resp) => resp,
                Err(e) => {
                    last_err = Some(StorageError::transport(e));
                    continue;
                }
            };

            let put_resp: PutResponse = match resp.json().await {
                Ok(parsed) => parsed,
                Err(e) => {
                    last_err = Some(StorageError::transport(e));
                    continue;
                }
            };

            if put_resp.code == 200 {
                info!("Alist[{}] 文件已保存: {}", self.config.name, candidate);
                return Ok(());
            }

            if is_auth_error(put_resp.code, &put_resp.message) {
                warn!(
                    "Alist[{}] 上传遇到认证错误 (code {}): {}",
                    self.config.name, put_resp.code, put_resp.message
                );
                match self.ensure_auth().await {
                    Ok(()) => continue,
                    Err(e) => {
                        last_err = Some(e);
                        continue;
                    }
                }
            }

            // 非认证的逻辑错误重试无意义
            return Err(StorageError::Remote {
                code: put_resp.code,
                message: put_resp.message,
            });
        }

        Err(last_err
            .unwrap_or_else(|| StorageError::Transport("上传重试耗尽".to_string())))
    }
}

#[async_trait]
impl Storage for AlistStorage {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Alist
    }

    fn join_storage_path(&self, path: &str) -> String {
        join_path(&self.config.base_path, path)
    }

    fn cannot_stream(&self) -> Option<&'static str> {
        Some("Alist 不支持分块传输编码")
    }

    async fn save(
        &self,
        source: &mut SaveSource<'_>,
        storage_path: &str,
    ) -> Result<(), StorageError> {
        info!("Alist[{}] 保存文件到 {}", self.config.name, storage_path);

        let storage_path = match common::validate_storage_path(storage_path) {
            Ok(()) => storage_path.to_string(),
            Err(reason) => {
                warn!(
                    "Alist[{}] 存储路径未通过校验 ({}), 尝试清理",
                    self.config.name, reason
                );
                let sanitized = common::sanitize_storage_path(storage_path);
                common::validate_storage_path(&sanitized)
                    .map_err(StorageError::Safety)?;
                info!("Alist[{}] 清理后的路径: {}", self.config.name, sanitized);
                sanitized
            }
        };

        if let Err(e) = self.ensure_token_valid().await {
            warn!("Alist[{}] token 预检失败: {}", self.config.name, e);
        }

        // 只探测两级以上的深层目录, 减少认证失败点
        let dir = match storage_path.rfind('/') {
            Some(idx) if idx > 0 => &storage_path[..idx],
            _ => "",
        };
        let depth = dir.trim_matches('/').split('/').filter(|s| !s.is_empty()).count();
        if depth > 2 && !self.ensure_directory_accessible(dir).await {
            warn!(
                "Alist[{}] 深层目录可能不可达: {}, 依赖自动建目录",
                self.config.name, dir
            );
        }

        let candidate = self.resolve_candidate(&storage_path).await?;
        self.save_with_retry(source, &candidate).await
    }

    async fn exists(&self, storage_path: &str) -> Result<bool, StorageError> {
        self.exists_inner(storage_path).await
    }
}
