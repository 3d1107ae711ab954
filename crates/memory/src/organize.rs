//! MEMORY.md reorganization.
//!
//! Entries (blocks separated by `---` lines) are classified by keyword into
//! a fixed section order, de-duplicated on whitespace-normalized text, and
//! written back with one `---` separator per entry so the output can be
//! organized again without merging entries.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::store::CORE_HEADER;

pub const SECTION_ORDER: [&str; 5] = [
    "User Information",
    "Preferences",
    "Project Context",
    "Important Notes",
    "Other",
];

const OTHER: &str = "Other";

const FOOTER: &str = "*This file is automatically updated by mnemo.*";

/// First matching category wins.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "User Information",
        &["user", "name", "i am", "email", "phone", "my ", "用户", "姓名", "名字", "我是", "邮箱", "电话"],
    ),
    (
        "Preferences",
        &["prefer", "like", "dislike", "habit", "want", "偏好", "喜欢", "习惯", "希望"],
    ),
    (
        "Project Context",
        &["project", "work", "code", "develop", "repo", "path", "director", "项目", "代码", "仓库"],
    ),
    (
        "Important Notes",
        &["important", "note", "remember", "must", "重要", "注意", "提醒", "记住"],
    ),
];

const PLACEHOLDERS: &[&str] = &[
    "(important facts about the user)",
    "(user preferences learned over time)",
    "(information about ongoing projects)",
    "(things to remember)",
];

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n-{3,}[ \t]*\n").expect("valid separator regex"))
}

fn timestamp_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^## \d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}$").expect("valid timestamp regex")
    })
}

/// Result of a reorganization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Organized {
    pub text: String,
    pub entries: usize,
}

/// Reorganize raw MEMORY.md text. `None` when it holds no real entries.
pub fn organize(raw: &str) -> Option<Organized> {
    let normalized_raw = raw.replace("\r\n", "\n");
    let mut by_section: Vec<Vec<String>> = vec![Vec::new(); SECTION_ORDER.len()];
    let mut seen: HashSet<String> = HashSet::new();
    let mut total = 0;

    for block in separator_re().split(&normalized_raw) {
        let block = block.trim();
        if block.is_empty() || block.starts_with('*') {
            continue;
        }
        let content = strip_template_lines(block);
        if content.chars().count() < 2 {
            continue;
        }
        let key = content.split_whitespace().collect::<Vec<_>>().join(" ");
        if !seen.insert(key) {
            continue;
        }
        let section = classify(&content);
        let idx = SECTION_ORDER
            .iter()
            .position(|s| *s == section)
            .unwrap_or(SECTION_ORDER.len() - 1);
        by_section[idx].push(normalize_entry(&content));
        total += 1;
    }

    if total == 0 {
        return None;
    }

    let mut blocks: Vec<String> = Vec::new();
    for (section, items) in SECTION_ORDER.iter().zip(by_section) {
        for (i, item) in items.into_iter().enumerate() {
            if i == 0 {
                blocks.push(format!("## {section}\n\n{item}"));
            } else {
                blocks.push(item);
            }
        }
    }
    blocks.push(FOOTER.to_string());

    Some(Organized {
        text: format!("{CORE_HEADER}\n{}\n", blocks.join("\n\n---\n\n")),
        entries: total,
    })
}

fn classify(content: &str) -> &'static str {
    let lower = content.to_lowercase();
    CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(title, _)| *title)
        .unwrap_or(OTHER)
}

/// Drop headers, section headings, timestamp headings, and placeholders.
fn strip_template_lines(block: &str) -> String {
    block
        .lines()
        .filter(|line| {
            let t = line.trim();
            let lower = t.to_lowercase();
            if timestamp_heading_re().is_match(t) || PLACEHOLDERS.contains(&lower.as_str()) {
                return false;
            }
            if lower == "# long-term memory"
                || lower.starts_with("this file stores")
                || lower.contains("automatically updated")
            {
                return false;
            }
            !t.strip_prefix("## ")
                .is_some_and(|heading| SECTION_ORDER.contains(&heading.trim()))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Trim trailing whitespace and collapse runs of blank lines.
fn normalize_entry(content: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut prev_blank = false;
    for line in content.trim().lines().map(str::trim_end) {
        let blank = line.trim().is_empty();
        if blank && prev_blank {
            continue;
        }
        prev_blank = blank;
        out.push(line);
    }
    out.join("\n").trim().to_string()
}
