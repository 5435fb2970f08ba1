use regex::Regex;
use tracing::warn;

use crate::model::TGFile;

/// 数据库中表示"为相册新建目录"的哨兵值
pub const NEW_FOR_ALBUM: &str = "NEW-FOR-ALBUM";

/// 规则输出的目录路径; 哨兵字符串只存在于数据库边界
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirPath {
    Literal(String),
    NewForAlbum,
}

impl DirPath {
    pub fn parse(raw: &str) -> Self {
        if raw == NEW_FOR_ALBUM {
            DirPath::NewForAlbum
        } else {
            DirPath::Literal(raw.to_string())
        }
    }

    pub fn is_new_for_album(&self) -> bool {
        matches!(self, DirPath::NewForAlbum)
    }

    /// 字面目录; 哨兵返回空串
    pub fn literal(&self) -> &str {
        match self {
            DirPath::Literal(s) => s,
            DirPath::NewForAlbum => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    FilenameRegex,
    MessageRegex,
    IsAlbum,
}

impl RuleKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "FILENAME-REGEX" => Some(RuleKind::FilenameRegex),
            "MESSAGE-REGEX" => Some(RuleKind::MessageRegex),
            "IS-ALBUM" => Some(RuleKind::IsAlbum),
            _ => None,
        }
    }
}

/// 预编译的用户规则
pub struct CompiledRule {
    pub kind: RuleKind,
    regex: Option<Regex>,
    pub storage_name: String,
    pub dir_path: DirPath,
}

impl CompiledRule {
    /// 编译数据库记录; 非法类型或正则跳过并告警
    pub fn compile(record: &database::Rule) -> Option<Self> {
        let kind = match RuleKind::parse(&record.rule_type) {
            Some(kind) => kind,
            None => {
                warn!("跳过未知类型的规则 #{}: {}", record.id, record.rule_type);
                return None;
            }
        };

        let regex = match kind {
            RuleKind::FilenameRegex | RuleKind::MessageRegex => match Regex::new(&record.data) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("跳过正则非法的规则 #{}: {}", record.id, e);
                    return None;
                }
            },
            RuleKind::IsAlbum => None,
        };

        Some(Self {
            kind,
            regex,
            storage_name: record.storage_name.clone(),
            dir_path: DirPath::parse(&record.dir_path),
        })
    }

    fn matches(&self, input: &RuleInput<'_>) -> bool {
        match self.kind {
            RuleKind::FilenameRegex => self
                .regex
                .as_ref()
                .map(|re| re.is_match(input.file_name))
                .unwrap_or(false),
            RuleKind::MessageRegex => self
                .regex
                .as_ref()
                .map(|re| re.is_match(input.message_text))
                .unwrap_or(false),
            RuleKind::IsAlbum => input.is_album,
        }
    }
}

pub fn compile_rules(records: &[database::Rule]) -> Vec<CompiledRule> {
    records.iter().filter_map(CompiledRule::compile).collect()
}

/// 规则匹配的输入视图
pub struct RuleInput<'a> {
    pub file_name: &'a str,
    pub message_text: &'a str,
    pub is_album: bool,
}

impl<'a> RuleInput<'a> {
    pub fn from_file(file: &'a TGFile) -> Self {
        Self {
            file_name: &file.name,
            message_text: &file.message_text,
            is_album: file.is_album(),
        }
    }
}

/// 线性扫描, 第一条命中的规则生效
pub fn apply_rules<'r>(
    rules: &'r [CompiledRule],
    input: &RuleInput<'_>,
) -> Option<&'r CompiledRule> {
    rules.iter().find(|rule| rule.matches(input))
}

/// 规则给出的存储名可用 = 非空 (可解析性由调用方向存储管理器确认)
pub fn storage_name_usable(name: &str) -> bool {
    !name.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rule_type: &str, data: &str, storage: &str, dir: &str) -> database::Rule {
        database::Rule {
            id: 1,
            user_id: 1,
            rule_type: rule_type.to_string(),
            data: data.to_string(),
            storage_name: storage.to_string(),
            dir_path: dir.to_string(),
        }
    }

    fn input<'a>(file_name: &'a str, text: &'a str, is_album: bool) -> RuleInput<'a> {
        RuleInput {
            file_name,
            message_text: text,
            is_album,
        }
    }

    #[test]
    fn test_first_match_wins() {
        // 相册中的 mp4 先命中文件名规则, 不进相册分桶
        let rules = compile_rules(&[
            record("FILENAME-REGEX", r"\.mp4$", "S1", "/video"),
            record("IS-ALBUM", "true", "S2", NEW_FOR_ALBUM),
        ]);

        let matched = apply_rules(&rules, &input("clip.mp4", "", true)).unwrap();
        assert_eq!(matched.storage_name, "S1");
        assert_eq!(matched.dir_path, DirPath::Literal("/video".to_string()));

        let matched = apply_rules(&rules, &input("pic.jpg", "", true)).unwrap();
        assert_eq!(matched.storage_name, "S2");
        assert!(matched.dir_path.is_new_for_album());
    }

    #[test]
    fn test_message_regex() {
        let rules = compile_rules(&[record("MESSAGE-REGEX", "(?i)重要|urgent", "S1", "/vip")]);
        assert!(apply_rules(&rules, &input("a.txt", "这是重要文件", false)).is_some());
        assert!(apply_rules(&rules, &input("a.txt", "URGENT delivery", false)).is_some());
        assert!(apply_rules(&rules, &input("a.txt", "普通消息", false)).is_none());
    }

    #[test]
    fn test_invalid_rules_skipped() {
        let rules = compile_rules(&[
            record("FILENAME-REGEX", "([unclosed", "S1", "/x"),
            record("UNKNOWN-KIND", "x", "S1", "/x"),
            record("IS-ALBUM", "true", "S2", "/albums"),
        ]);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].kind, RuleKind::IsAlbum);
    }

    #[test]
    fn test_dir_path_parse() {
        assert!(DirPath::parse(NEW_FOR_ALBUM).is_new_for_album());
        assert_eq!(DirPath::parse("/docs").literal(), "/docs");
        assert!(!storage_name_usable("  "));
        assert!(storage_name_usable("nas"));
    }
}
