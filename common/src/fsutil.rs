/// 文件名与存储路径安全处理
///
/// 所有写入后端存储的名字都必须经过这里, AI 生成的结果也不例外。
const INVALID_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// URL 相关字符一并替换, 避免 File-Path 头和反向代理解析歧义
const URL_UNSAFE_CHARS: [char; 5] = ['#', '%', '&', '+', '='];

const MAX_FILENAME_LEN: usize = 200;
const MAX_PATH_LEN: usize = 1000;
const MAX_SEGMENT_LEN: usize = 255;

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const DANGEROUS_PATTERNS: [&str; 5] = ["../", "..\\", "//", "\\\\", "./"];

/// 清理文件名: 替换非法字符, 折叠下划线, 截断到 200 字节
pub fn sanitize_filename(name: &str) -> String {
    let mut result = name.trim().replace("..", "_");

    for ch in INVALID_CHARS.iter().chain(URL_UNSAFE_CHARS.iter()) {
        result = result.replace(*ch, "_");
    }

    while result.contains("__") {
        result = result.replace("__", "_");
    }
    // 替换产生的 "_.jpg" 这类残留折叠回 ".jpg"
    while result.contains("_.") {
        result = result.replace("_.", ".");
    }

    let result = result.trim_matches('_');
    if result.is_empty() || result == "." || result == ".." {
        return "untitled".to_string();
    }

    truncate_filename(result, MAX_FILENAME_LEN)
}

/// 字节长度截断, 尽量保留最后一个扩展名 (扩展名 < 10 字节时)
fn truncate_filename(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }

    if let Some(dot) = name.rfind('.') {
        let ext = &name[dot..];
        if dot > 0 && ext.len() < 10 && ext.len() < max_len {
            let base = truncate_at_char_boundary(&name[..dot], max_len - ext.len());
            return format!("{}{}", base, ext);
        }
    }

    truncate_at_char_boundary(name, max_len).to_string()
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// 校验文件名是否满足安全约束 (非空, 无非法字符, 首尾无下划线, 不超长)
pub fn validate_filename(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_FILENAME_LEN {
        return false;
    }
    if name == "." || name == ".." {
        return false;
    }
    if name.starts_with('_') || name.ends_with('_') {
        return false;
    }
    !name.chars().any(|c| INVALID_CHARS.contains(&c))
}

fn is_reserved_segment(segment: &str) -> bool {
    let upper = segment.to_uppercase();
    RESERVED_NAMES
        .iter()
        .any(|r| upper == *r || upper.starts_with(&format!("{}.", r)))
}

/// 校验完整存储路径
pub fn validate_storage_path(path: &str) -> Result<(), String> {
    if path.len() > MAX_PATH_LEN {
        return Err(format!("存储路径过长: {} 字节", path.len()));
    }

    for pattern in DANGEROUS_PATTERNS {
        if path.contains(pattern) {
            return Err(format!("存储路径包含危险片段: {}", pattern));
        }
    }

    for segment in path.trim_matches('/').split('/') {
        if segment.is_empty() {
            continue;
        }
        if is_reserved_segment(segment) {
            return Err(format!("存储路径包含保留名称: {}", segment));
        }
        if segment.len() > MAX_SEGMENT_LEN {
            return Err(format!("路径分段过长: {}", segment));
        }
    }

    Ok(())
}

/// 清理存储路径: 归一化分隔符, 去掉危险片段, 逐段清理后重组
pub fn sanitize_storage_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    normalized = normalized.replace("../", "");
    while normalized.contains("//") {
        normalized = normalized.replace("//", "/");
    }
    normalized = normalized.replace("./", "");

    let mut segments = Vec::new();
    for segment in normalized.trim_matches('/').split('/') {
        if segment.is_empty() {
            continue;
        }
        let mut cleaned = sanitize_filename(segment);
        if is_reserved_segment(&cleaned) {
            cleaned = format!("safe_{}", cleaned);
        }
        segments.push(cleaned);
    }

    let mut result = segments.join("/");
    if normalized.starts_with('/') {
        result.insert(0, '/');
    }
    if result.len() <= MAX_PATH_LEN {
        return result;
    }

    // 超长时在分段边界截断
    let head = truncate_at_char_boundary(&result, MAX_PATH_LEN);
    match head.rfind('/') {
        Some(idx) if idx > 0 => head[..idx].to_string(),
        _ => head.to_string(),
    }
}
