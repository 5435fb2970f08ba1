/// 单文件重命名提示词; 约束输出 ≤100 字符且不含非法字符
const FILE_RENAME_PROMPT: &str = r#"你是一个专业的文件重命名助手。请根据提供的文件信息，生成一个规范化的文件名。

重命名规则：
1. 格式：名称.作者.时间.要点（各部分如果存在才包含）
2. 分隔符使用规则：
   - 各主要部分（名称、作者、时间、要点）之间必须用英文句点(.)分隔
   - 每个部分内部的多个词用下划线(_)连接
3. 各部分说明：
   - 名称：文档/视频/图片的主要标题或主题
   - 作者：创作者、发布者或机构名称
   - 时间：相关的时间信息（日期、年份等）
   - 要点：关键信息、版本号、类型等重要标识

限制条件：
- 总长度不超过100个字符
- 避免使用特殊字符：/ \ : * ? " < > |
- 严格按照分隔符规则，不可混用
- 如果某部分信息不存在，直接省略（不要用"未知"等占位符）
- 保持简洁，优先保留最重要的信息

请仅返回重命名后的文件名（不包含文件扩展名），不要添加任何解释。

文件信息：
原文件名：{original}
消息内容：{content}"#;

/// 相册基础名提示词; 为序号后缀预留长度, 约束 ≤80 字符
const ALBUM_RENAME_PROMPT: &str = r#"你是一个专业的文件重命名助手。请为相册（媒体组）生成一个统一的基础文件名。

重命名规则：
1. 格式：名称.作者.时间.要点（各部分如果存在才包含）
2. 分隔符使用规则：
   - 各主要部分（名称、作者、时间、要点）之间必须用英文句点(.)分隔
   - 每个部分内部的多个词用下划线(_)连接
3. 这个名称将作为相册中所有文件的基础名称，后面会加上序号（如 _01, _02）

限制条件：
- 总长度不超过80个字符（为序号预留空间）
- 避免使用特殊字符：/ \ : * ? " < > |
- 严格按照分隔符规则，不可混用
- 如果某部分信息不存在，直接省略
- 重点关注相册整体的主题，而非单个文件
- 保持简洁，优先保留最重要的信息

请仅返回重命名后的基础文件名（不包含文件扩展名和序号），不要添加任何解释。

相册信息：
消息内容：{content}"#;

const MAX_CONTENT_LEN: usize = 1000;

/// 消息内容按字节截断到 1000, 避免提示词超出 token 预算
fn clip_content(content: &str) -> String {
    let content = content.trim();
    if content.len() <= MAX_CONTENT_LEN {
        return content.to_string();
    }
    let mut end = MAX_CONTENT_LEN;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &content[..end])
}

pub fn build_file_prompt(original_filename: &str, message_content: &str) -> String {
    FILE_RENAME_PROMPT
        .replace("{original}", original_filename.trim())
        .replace("{content}", &clip_content(message_content))
}

pub fn build_album_prompt(message_content: &str) -> String {
    ALBUM_RENAME_PROMPT.replace("{content}", &clip_content(message_content))
}

/// AI 结果的硬性校验: 非空, ≤100 字符, 无非法字符
pub fn ai_result_valid(name: &str) -> bool {
    if name.is_empty() || name.len() > 100 {
        return false;
    }
    !name
        .chars()
        .any(|c| matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_file_prompt_injects_fields() {
        let prompt = build_file_prompt("draft_v2.pdf", "季度报告 终稿");
        assert!(prompt.contains("原文件名：draft_v2.pdf"));
        assert!(prompt.contains("消息内容：季度报告 终稿"));
    }

    #[test]
    fn test_album_prompt_has_no_filename_field() {
        let prompt = build_album_prompt("旅行照片");
        assert!(prompt.contains("消息内容：旅行照片"));
        assert!(!prompt.contains("原文件名"));
    }

    #[test]
    fn test_clip_content_char_boundary() {
        let long = "测".repeat(600);
        let prompt = build_album_prompt(&long);
        assert!(prompt.contains("..."));
        // 截断点不会落在多字节字符中间, 能安全拼进字符串
        assert!(prompt.len() < ALBUM_RENAME_PROMPT.len() + 1100);
    }

    #[test]
    fn test_ai_result_valid() {
        assert!(ai_result_valid("报告.公司.2024.终稿"));
        assert!(!ai_result_valid(""));
        assert!(!ai_result_valid("a/b"));
        assert!(!ai_result_valid(&"x".repeat(101)));
    }
}
