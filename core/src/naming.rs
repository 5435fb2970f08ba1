use regex::Regex;
use std::sync::OnceLock;

use crate::model::TGFile;
use crate::rename::{fallback_naming, RenameService};

fn hashtag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([\p{L}\p{N}_]+)").expect("合法正则"))
}

/// 从消息文本提取话题标签, 下划线连接, 总长不超过 64 字符
fn tags_from_text(text: &str) -> Option<String> {
    let mut joined = String::new();
    for capture in hashtag_regex().captures_iter(text) {
        let tag = &capture[1];
        if !joined.is_empty() {
            joined.push('_');
        }
        joined.push_str(tag);
        if joined.chars().count() >= 64 {
            break;
        }
    }
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// 把消息文本压成文件名可用的片段 (64 字符)
fn name_from_text(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| {
            if c.is_control() || c.is_whitespace() {
                return '_';
            }
            match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                other => other,
            }
        })
        .take(64)
        .collect();

    mapped
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// 为单个文件合成完整文件名 (含扩展名), 永不为空
///
/// AI 启用时走重命名服务; 否则标签 > 消息文本 > 媒体原名 > 消息 ID。
pub async fn gen_filename_from_message(rename: &RenameService, file: &TGFile) -> String {
    let ext = file.extension();
    let text = file.message_text.trim();

    if rename.is_enabled() {
        let generated = rename.rename_file(&file.name, text).await;
        if !generated.is_empty() {
            return format!("{}{}", generated, ext);
        }
    }

    gen_filename_original(file, &ext, text)
}

fn gen_filename_original(file: &TGFile, ext: &str, text: &str) -> String {
    if text.is_empty() {
        if !file.name.is_empty() {
            return file.display_name();
        }
        return format!("{}_{}{}", file.message_id, common::next_task_id(), ext);
    }

    if let Some(tags) = tags_from_text(text) {
        return format!("{}_{}{}", tags, file.message_id, ext);
    }

    let name = name_from_text(text);
    if name.is_empty() {
        if !file.name.is_empty() {
            return file.display_name();
        }
        return format!("{}_{}{}", file.message_id, common::next_task_id(), ext);
    }

    format!("{}{}", name, ext)
}

/// 相册统一命名: 基础名 (AI 或回退) + 零填充序号 + 各自扩展名
pub async fn generate_album_filenames(rename: &RenameService, files: &[&TGFile]) -> Vec<String> {
    let message_content = files
        .first()
        .map(|f| f.message_text.trim())
        .unwrap_or_default();

    let mut base = if rename.is_enabled() {
        rename.rename_album(message_content).await
    } else {
        fallback_naming("", message_content, true)
    };

    if base.contains(['/', '\\', ':', '*', '?', '"', '<', '>', '|']) {
        base = common::sanitize_filename(&base);
    }

    crate::rename::generate_album_filenames(&base, files.len())
        .into_iter()
        .zip(files.iter())
        .map(|(name, file)| format!("{}{}", name, file.extension()))
        .collect()
}

/// 从首个相册文件名的主干剥掉尾部 1-3 位序号, 得到相册目录名
pub fn album_dir_from_filename(filename: &str) -> String {
    let stem = match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    };

    if let Some(idx) = stem.rfind('_') {
        if idx > 0 {
            let suffix = &stem[idx + 1..];
            if !suffix.is_empty()
                && suffix.len() <= 3
                && suffix.chars().all(|c| c.is_ascii_digit())
            {
                return stem[..idx].to_string();
            }
        }
    }
    stem.to_string()
}
