mod album_buffer;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use album_buffer::{AlbumAction, AlbumBuffer};
use storage::{new_storage, Storage, StorageManager};
use tg_core::engine::TaskEngine;
use tg_core::rename::RenameService;
use tg_core::runtime::Runtime;
use tg_core::submit;
use tgclient::client::{ChannelUploaderImpl, IncomingUpdate};
use tgclient::download::TgMediaSource;
use tgclient::status::TgStatusSink;
use tgclient::TgClient;

/// 相册静默期: 超过该时长没有新消息就提交整组
const ALBUM_FLUSH_DELAY: Duration = Duration::from_secs(3);
/// Telegram 相册上限
const ALBUM_MAX_ITEMS: usize = 10;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;
    let _log_guard = logging::init(&config.log_file, &config.log_level);
    info!("配置加载完成, workers={} stream={}", config.worker_count, config.stream);

    config::ensure_dir_exists(&config.temp_base)?;

    let db = database::Database::open(&config.db_path).await?;

    let client = TgClient::connect(config.api_id, &config.session_name)
        .await
        .context("连接 Telegram 失败")?;
    client.authorize_bot(&config.bot_token).await?;

    let uploader: Arc<dyn storage::telegram::ChannelUploader> =
        ChannelUploaderImpl::new(client.clone());

    // 操作员声明的存储在启动期构造, 坏配置跳过并告警
    let mut operator: Vec<Arc<dyn Storage>> = Vec::new();
    for storage_config in &config.storages {
        match new_storage(storage_config, Some(uploader.clone())).await {
            Ok(storage) => {
                info!(
                    "存储已就绪: {} ({})",
                    storage.name(),
                    storage.kind()
                );
                operator.push(storage);
            }
            Err(e) => {
                error!("存储 '{}' 初始化失败: {}", storage_config.name(), e);
            }
        }
    }
    if operator.is_empty() {
        warn!("没有可用的操作员存储, 仅用户自定义存储可用");
    }

    let storages = Arc::new(StorageManager::new(db.clone(), operator, Some(uploader)));
    let rename = RenameService::from_config(&config.ai)?;

    let engine = Arc::new(TaskEngine::new(
        config.worker_count,
        Duration::from_secs(config.task_retention),
    ));
    engine.start();

    let runtime = Arc::new(Runtime {
        db,
        engine: engine.clone(),
        storages,
        rename,
        source: TgMediaSource::new(client.clone()),
        status: TgStatusSink::new(client.clone()),
        config: config.clone(),
    });

    let albums = Arc::new(AlbumBuffer::new(ALBUM_MAX_ITEMS));
    spawn_album_flusher(runtime.clone(), client.clone(), albums.clone());

    let mut updates = client.subscribe_updates().await;
    info!("机器人已启动, 等待转发消息");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("收到退出信号");
                break;
            }
            update = updates.recv() => {
                let Some(update) = update else {
                    error!("更新流已关闭, 退出");
                    break;
                };
                handle_update(&runtime, &client, &albums, update).await;
            }
        }
    }

    // 冲掉还攒着的相册再关引擎
    for (key, files) in albums.drain_all().await {
        submit_album(&runtime, &client, key.chat_id, files).await;
    }

    let drained = engine
        .shutdown(Duration::from_secs(config.shutdown_drain_timeout))
        .await;
    info!("任务引擎已关闭, drained={}", drained);
    Ok(())
}

async fn handle_update(
    runtime: &Arc<Runtime>,
    client: &TgClient,
    albums: &Arc<AlbumBuffer>,
    update: IncomingUpdate,
) {
    match update {
        IncomingUpdate::Message { chat_id, file, .. } => {
            let Some(file) = file else {
                // 命令与帮助界面不在本进程处理
                return;
            };

            match albums.add(file).await {
                AlbumAction::NotAlbum(file) => {
                    let Some(storage) = resolve_target_storage(runtime, chat_id).await else {
                        notify(client, chat_id, "没有可用的存储, 请先配置").await;
                        return;
                    };
                    let Ok(msg_id) = client.send_text(chat_id, "正在创建任务...").await else {
                        return;
                    };
                    if let Err(e) = submit::create_and_add_file_task(
                        runtime,
                        chat_id,
                        msg_id as i32,
                        storage,
                        "",
                        file,
                    )
                    .await
                    {
                        error!("创建任务失败: {}", e);
                        notify(client, chat_id, &format!("创建任务失败: {}", e)).await;
                    }
                }
                AlbumAction::Cached => {}
                AlbumAction::Flush(files) => {
                    submit_album(runtime, client, chat_id, files).await;
                }
            }
        }
        IncomingUpdate::Callback { chat_id, data } => {
            if let Some(task_id) = data.strip_prefix("cancel ") {
                runtime.engine.cancel_task(task_id.trim());
            } else if let Some(task_id) = data.strip_prefix("task_detail ") {
                info!("查询任务详情: chat={} task={}", chat_id, task_id.trim());
            }
        }
    }
}

fn spawn_album_flusher(runtime: Arc<Runtime>, client: TgClient, albums: Arc<AlbumBuffer>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            for key in albums.expired_keys(ALBUM_FLUSH_DELAY).await {
                if let Some(files) = albums.flush(&key).await {
                    submit_album(&runtime, &client, key.chat_id, files).await;
                }
            }
        }
    });
}

async fn submit_album(
    runtime: &Arc<Runtime>,
    client: &TgClient,
    chat_id: i64,
    files: Vec<tg_core::model::TGFile>,
) {
    if files.is_empty() {
        return;
    }
    let Some(storage) = resolve_target_storage(runtime, chat_id).await else {
        notify(client, chat_id, "没有可用的存储, 请先配置").await;
        return;
    };
    let Ok(msg_id) = client
        .send_text(chat_id, &format!("正在创建批量任务 ({} 个文件)...", files.len()))
        .await
    else {
        return;
    };

    if let Err(e) =
        submit::create_and_add_batch_task(runtime, chat_id, msg_id as i32, storage, "", files)
            .await
    {
        error!("创建批量任务失败: {}", e);
        notify(client, chat_id, &format!("创建批量任务失败: {}", e)).await;
    }
}

/// 目标存储: 用户默认存储优先, 否则取首个可用存储
async fn resolve_target_storage(
    runtime: &Arc<Runtime>,
    chat_id: i64,
) -> Option<Arc<dyn Storage>> {
    if let Some(storage) = runtime.default_storage(chat_id).await {
        return Some(storage);
    }
    runtime
        .storages
        .all_user_storages(chat_id)
        .await
        .ok()?
        .into_iter()
        .next()
}

async fn notify(client: &TgClient, chat_id: i64, text: &str) {
    if let Err(e) = client.send_text(chat_id, text).await {
        warn!("发送提示消息失败: chat={} error={}", chat_id, e);
    }
}
