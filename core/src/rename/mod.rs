mod client;
mod prompt;

pub use client::AiClient;

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use config::AiConfig;

/// AI 重命名服务; 禁用或失败时走确定性的回退命名
pub struct RenameService {
    client: Option<AiClient>,
    enabled: bool,
}

impl RenameService {
    pub fn from_config(config: &AiConfig) -> Result<Arc<Self>> {
        if !config.is_enabled() {
            info!("AI 重命名服务未启用");
            return Ok(Arc::new(Self {
                client: None,
                enabled: false,
            }));
        }

        let client = AiClient::new(
            &config.base_url,
            &config.api_key,
            &config.model,
            config.timeout(),
        )?;
        info!(
            "AI 重命名服务已启用: model={} timeout={:?}",
            config.model,
            config.timeout()
        );
        Ok(Arc::new(Self {
            client: Some(client),
            enabled: true,
        }))
    }

    #[cfg(test)]
    pub fn disabled() -> Arc<Self> {
        Arc::new(Self {
            client: None,
            enabled: false,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.client.is_some()
    }

    /// 为单个文件生成安全文件名 (不含扩展名); 永不失败
    pub async fn rename_file(&self, original_filename: &str, message_content: &str) -> String {
        if !self.is_enabled() {
            return fallback_naming(original_filename, message_content, false);
        }

        let prompt_text = prompt::build_file_prompt(original_filename, message_content);
        match self.generate(&prompt_text).await {
            Some(name) => name,
            None => fallback_naming(original_filename, message_content, false),
        }
    }

    /// 为相册生成统一的基础名 (不含扩展名和序号); 永不失败
    pub async fn rename_album(&self, message_content: &str) -> String {
        if !self.is_enabled() {
            return fallback_naming("", message_content, true);
        }

        let prompt_text = prompt::build_album_prompt(message_content);
        match self.generate(&prompt_text).await {
            Some(name) => name,
            None => fallback_naming("", message_content, true),
        }
    }

    async fn generate(&self, prompt_text: &str) -> Option<String> {
        let client = self.client.as_ref()?;

        let raw = match client.generate_text(prompt_text).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("AI 重命名调用失败, 使用回退命名: {}", e);
                return None;
            }
        };

        let mut cleaned = common::sanitize_filename(raw.trim());
        if !prompt::ai_result_valid(&cleaned) {
            warn!("AI 生成的文件名不合规: {:?}", cleaned);
            return None;
        }

        // 清理后仍含路径分隔符说明模型没有遵守约束
        if cleaned.contains('/') || cleaned.contains('\\') {
            warn!("AI 生成的文件名含路径分隔符: {:?}", cleaned);
            cleaned = cleaned.replace(['/', '\\'], "_");
        }

        if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
            warn!("AI 生成的文件名不安全: {:?}", cleaned);
            return None;
        }

        debug!("AI 重命名成功: {:?}", cleaned);
        Some(cleaned)
    }
}

/// 回退命名链
///
/// 文件: 原名去扩展 > 消息前 50 字符清理 > file_<unix>
/// 相册: 消息前 50 字符清理 > album_<YYYYMMDD_HHMMSS>
pub fn fallback_naming(original_filename: &str, message_content: &str, is_album: bool) -> String {
    if is_album {
        if !message_content.is_empty() {
            return common::sanitize_filename(&clip_chars(message_content, 50));
        }
        return format!("album_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"));
    }

    if !original_filename.is_empty() {
        if let Some(idx) = original_filename.rfind('.') {
            if idx > 0 {
                return original_filename[..idx].to_string();
            }
        }
        return original_filename.to_string();
    }

    if !message_content.is_empty() {
        return common::sanitize_filename(&clip_chars(message_content, 50));
    }

    format!("file_{}", chrono::Local::now().timestamp())
}

fn clip_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// 相册序号文件名: base_01, base_02, ...; 零填充到 max(2, 位数)
pub fn generate_album_filenames(base: &str, count: usize) -> Vec<String> {
    let padding = digits(count).max(2);
    (1..=count)
        .map(|i| format!("{}_{:0width$}", base, i, width = padding))
        .collect()
}

fn digits(n: usize) -> usize {
    n.to_string().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_file_prefers_stem() {
        assert_eq!(fallback_naming("movie.2024.mkv", "text", false), "movie.2024");
        assert_eq!(fallback_naming("noext", "text", false), "noext");
        // 隐藏文件开头的点不算扩展名分隔
        assert_eq!(fallback_naming(".bashrc", "", false), ".bashrc");
    }

    #[test]
    fn test_fallback_uses_message_content() {
        assert_eq!(fallback_naming("", "季度报告: 终稿?", false), "季度报告_ 终稿");
        let long = "很长的消息".repeat(30);
        let name = fallback_naming("", &long, false);
        assert!(name.chars().count() <= 200);
    }

    #[test]
    fn test_fallback_timestamp_shapes() {
        let name = fallback_naming("", "", false);
        assert!(name.starts_with("file_"));

        let album = fallback_naming("", "", true);
        assert!(album.starts_with("album_"));
        // album_YYYYMMDD_HHMMSS
        assert_eq!(album.len(), "album_20240101_120000".len());
    }

    #[test]
    fn test_generate_album_filenames() {
        assert_eq!(
            generate_album_filenames("trip", 3),
            vec!["trip_01", "trip_02", "trip_03"]
        );

        let many = generate_album_filenames("pic", 120);
        assert_eq!(many.len(), 120);
        assert_eq!(many[0], "pic_001");
        assert_eq!(many[119], "pic_120");

        // 全部唯一
        let mut sorted = many.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 120);
    }

    #[tokio::test]
    async fn test_disabled_service_uses_fallback() {
        let service = RenameService::disabled();
        assert!(!service.is_enabled());
        assert_eq!(service.rename_file("doc.pdf", "说明").await, "doc");
        let album = service.rename_album("旅行 2024").await;
        assert_eq!(album, "旅行 2024");
    }
}
