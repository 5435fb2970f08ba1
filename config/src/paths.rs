use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static PROJECT_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// 运行目录即项目根; 相对路径配置都相对于它解析
pub fn project_root() -> PathBuf {
    PROJECT_ROOT
        .get_or_init(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
        .clone()
}

pub fn resolve_path(raw: &str, default: &str) -> PathBuf {
    let base = project_root();

    if raw.is_empty() {
        return base.join(default);
    }

    let path = PathBuf::from(raw);
    if path.is_absolute() {
        return path;
    }

    base.join(path)
}

pub fn ensure_parent_exists(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn ensure_dir_exists(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
