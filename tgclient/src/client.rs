use anyhow::{Context, Result};
use async_trait::async_trait;
use grammers_client::{types::Update, Client, UpdatesConfiguration};
use grammers_mtsender::SenderPool;
use grammers_session::{defs::PeerRef, storages::SqliteSession, updates::UpdatesLike};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::convert;
use tg_core::model::TGFile;

/// grammers 客户端封装: 登录、更新流、状态编辑与上传
#[derive(Clone)]
pub struct TgClient {
    client: Client,
    updates_rx: Arc<tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<UpdatesLike>>>>,
    _runner: Arc<RunnerGuard>,
    runner_alive: Arc<AtomicBool>,
}

struct RunnerGuard {
    handle: JoinHandle<()>,
}

impl Drop for RunnerGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// 提交入口关心的更新形态
#[derive(Debug, Clone)]
pub enum IncomingUpdate {
    /// 新消息; 含媒体时附带可下载描述
    Message {
        chat_id: i64,
        message_id: i64,
        text: String,
        file: Option<TGFile>,
    },
    /// 行内按钮回调 ("cancel <id>" / "task_detail <id>")
    Callback { chat_id: i64, data: String },
}

impl TgClient {
    pub async fn connect(api_id: i32, session_name: &str) -> Result<Self> {
        let session = Arc::new(SqliteSession::open(session_name)?);
        let pool = SenderPool::new(session, api_id);
        let client = Client::new(&pool);

        let runner_alive = Arc::new(AtomicBool::new(true));
        let runner_alive_clone = runner_alive.clone();

        let runner = tokio::spawn(async move {
            pool.runner.run().await;
            runner_alive_clone.store(false, Ordering::Release);
            warn!("SenderPool runner 已退出 (网络断开或连接错误)");
        });

        Ok(Self {
            client,
            updates_rx: Arc::new(tokio::sync::Mutex::new(Some(pool.updates))),
            _runner: Arc::new(RunnerGuard { handle: runner }),
            runner_alive,
        })
    }

    pub fn is_runner_alive(&self) -> bool {
        self.runner_alive.load(Ordering::Acquire) && !self._runner.handle.is_finished()
    }

    /// 机器人令牌登录; 已授权时直接复用会话
    pub async fn authorize_bot(&self, token: &str) -> Result<()> {
        if self.client.is_authorized().await? {
            debug!("会话已授权, 跳过登录");
            return Ok(());
        }
        self.client
            .bot_sign_in(token)
            .await
            .context("机器人登录失败")?;
        info!("机器人登录成功");
        Ok(())
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn dialog_peer(dialog_id: i64) -> PeerRef {
        use grammers_session::defs::{PeerAuth, PeerId};

        if dialog_id <= -1000000000000 {
            let channel_id = -dialog_id - 1000000000000;
            PeerRef {
                id: PeerId::channel(channel_id),
                auth: PeerAuth::default(),
            }
        } else if dialog_id < 0 {
            PeerRef {
                id: PeerId::chat(-dialog_id),
                auth: PeerAuth::default(),
            }
        } else {
            PeerRef {
                id: PeerId::user(dialog_id),
                auth: PeerAuth::default(),
            }
        }
    }

    /// 向会话发送纯文本, 返回消息 ID (作为后续状态编辑的锚点)
    pub async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64> {
        let peer = Self::dialog_peer(chat_id);
        let message = self
            .client
            .send_message(peer, grammers_client::types::InputMessage::new().text(text))
            .await?;
        Ok(message.id() as i64)
    }

    /// 订阅更新流, 转换为任务提交需要的形态
    pub async fn subscribe_updates(&self) -> mpsc::UnboundedReceiver<IncomingUpdate> {
        let updates = {
            let mut guard = self.updates_rx.lock().await;
            guard.take().expect("更新通道已被消费, 无法重复订阅")
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let monitor = self.clone();

        tokio::spawn(async move {
            let mut stream = client.stream_updates(
                updates,
                UpdatesConfiguration {
                    catch_up: false,
                    ..Default::default()
                },
            );

            let mut consecutive_errors = 0u32;
            const MAX_CONSECUTIVE_ERRORS: u32 = 10;

            loop {
                match stream.next().await {
                    Ok(Update::NewMessage(message)) => {
                        consecutive_errors = 0;
                        if let Some(update) = convert::incoming_from_message(&message) {
                            let _ = sender.send(update);
                        }
                    }
                    Ok(Update::CallbackQuery(query)) => {
                        consecutive_errors = 0;
                        if let Some(update) = convert::incoming_from_callback(&query) {
                            let _ = sender.send(update);
                        }
                    }
                    Ok(_) => {
                        consecutive_errors = 0;
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        error!("更新流错误 ({}): {}", consecutive_errors, e);

                        if !monitor.is_runner_alive() {
                            error!("Runner 已崩溃, 更新流无法继续");
                            break;
                        }
                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            error!("连续错误次数过多 ({}), 更新流可能已损坏", consecutive_errors);
                            break;
                        }
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }

            drop(sender);
            warn!("更新流已停止");
        });

        receiver
    }
}

/// Telegram 频道存储的上传通道实现
pub struct ChannelUploaderImpl {
    client: TgClient,
}

impl ChannelUploaderImpl {
    pub fn new(client: TgClient) -> Arc<Self> {
        Arc::new(Self { client })
    }
}

#[async_trait]
impl storage::telegram::ChannelUploader for ChannelUploaderImpl {
    async fn upload_file(&self, chat_id: i64, local_path: &Path, filename: &str) -> Result<()> {
        let size = tokio::fs::metadata(local_path).await?.len() as usize;
        let mut file = tokio::fs::File::open(local_path).await?;

        let uploaded = self
            .client
            .client()
            .upload_stream(&mut file, size, filename.to_string())
            .await
            .context("上传文件分片失败")?;

        let peer = TgClient::dialog_peer(chat_id);
        self.client
            .client()
            .send_message(
                peer,
                grammers_client::types::InputMessage::new().document(uploaded),
            )
            .await
            .context("发送文件消息失败")?;
        Ok(())
    }

    async fn chat_accessible(&self, chat_id: i64) -> bool {
        let peer = TgClient::dialog_peer(chat_id);
        self.client.client().resolve_peer(peer).await.is_ok()
    }
}
