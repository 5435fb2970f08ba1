use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

use crate::album::{assemble_elements, RoutedFile};
use crate::batch::BatchTask;
use crate::model::TGFile;
use crate::msg;
use crate::naming;
use crate::progress::TelegramProgress;
use crate::rule::{self, CompiledRule, DirPath, RuleInput};
use crate::runtime::Runtime;
use crate::tftask::FileTask;
use storage::{join_path, Storage};

/// 加载用户启用的规则; 未开启规则时返回空
async fn load_rules(rt: &Runtime, user: &database::User) -> Vec<CompiledRule> {
    if !user.apply_rule {
        return Vec::new();
    }
    match database::queries::rules_by_user(&rt.db, user.id).await {
        Ok(records) => rule::compile_rules(&records),
        Err(e) => {
            warn!("加载用户规则失败: {}", e);
            Vec::new()
        }
    }
}

/// 应用规则并解析实际存储; 规则给出的存储不可用时保留默认
async fn route_file(
    rt: &Runtime,
    chat_id: i64,
    rules: &[CompiledRule],
    default_storage: &Arc<dyn Storage>,
    default_dir: &str,
    file: &TGFile,
) -> Result<(Arc<dyn Storage>, DirPath)> {
    let Some(matched) = rule::apply_rules(rules, &RuleInput::from_file(file)) else {
        return Ok((
            default_storage.clone(),
            DirPath::Literal(default_dir.to_string()),
        ));
    };

    let storage = if rule::storage_name_usable(&matched.storage_name)
        && matched.storage_name != default_storage.name()
    {
        rt.storages
            .get_user_storage_by_name(chat_id, &matched.storage_name)
            .await
            .context("获取规则指定的存储失败")?
    } else {
        default_storage.clone()
    };

    Ok((storage, matched.dir_path.clone()))
}

/// 创建并入队单文件任务, 通过编辑状态消息反馈结果
pub async fn create_and_add_file_task(
    rt: &Runtime,
    chat_id: i64,
    track_msg_id: i32,
    storage: Arc<dyn Storage>,
    dir_path: &str,
    file: TGFile,
) -> Result<()> {
    let user = database::queries::get_or_create_user(&rt.db, chat_id).await?;
    let rules = load_rules(rt, &user).await;

    let (storage, dir) = route_file(rt, chat_id, &rules, &storage, dir_path, &file).await?;
    // 单文件没有相册语境, 哨兵目录退化为存储根
    let dir_literal = dir.literal().to_string();

    let file_name = naming::gen_filename_from_message(&rt.rename, &file).await;
    let storage_path = storage.join_storage_path(&join_path(&dir_literal, &file_name));

    let tracker = TelegramProgress::new(rt.status.clone(), chat_id, track_msg_id);
    let task_id = common::next_task_id();
    let mut task = FileTask::new(
        task_id,
        chat_id,
        file,
        storage,
        storage_path,
        tracker,
        rt.source.clone(),
        rt.config.stream,
        &rt.config.temp_base,
    );
    task.set_custom_name(&file_name);

    rt.engine
        .add_task(Arc::new(task))
        .context("添加任务失败")?;

    let added = msg::build_task_added_message(&file_name, rt.engine.len());
    let _ = rt
        .status
        .edit_status(chat_id, track_msg_id, &added, &[])
        .await;
    Ok(())
}

/// 创建并入队批量任务; 相册分组与统一命名在装配阶段完成
pub async fn create_and_add_batch_task(
    rt: &Runtime,
    chat_id: i64,
    track_msg_id: i32,
    storage: Arc<dyn Storage>,
    dir_path: &str,
    files: Vec<TGFile>,
) -> Result<()> {
    let user = database::queries::get_or_create_user(&rt.db, chat_id).await?;
    let rules = load_rules(rt, &user).await;

    let mut routed = Vec::with_capacity(files.len());
    for file in files {
        let (file_storage, dir) =
            route_file(rt, chat_id, &rules, &storage, dir_path, &file).await?;
        routed.push(RoutedFile {
            file,
            storage: file_storage,
            dir,
        });
    }

    let elements = assemble_elements(&rt.rename, routed).await;
    if elements.is_empty() {
        anyhow::bail!("没有可下载的文件");
    }
    let count = elements.len();

    let tracker = TelegramProgress::new(rt.status.clone(), chat_id, track_msg_id);
    let task = BatchTask::new(
        common::next_task_id(),
        chat_id,
        elements,
        tracker,
        rt.source.clone(),
        rt.config.stream,
        rt.config.temp_base.clone(),
    );

    rt.engine
        .add_task(Arc::new(task))
        .context("添加批量任务失败")?;

    let mut added = msg::StyledMessage::default();
    added.plain(format!(
        "已添加批量任务, 共 {} 个文件, 当前排队 {}",
        count,
        rt.engine.len()
    ));
    let _ = rt
        .status
        .edit_status(chat_id, track_msg_id, &added, &[])
        .await;
    Ok(())
}
