//! On-disk memory files.
//!
//! ```text
//! <workspace>/memory/
//!   MEMORY.md        core facts: identity, preferences, explicit requests
//!   2026-10-16.md    dated notes: session summaries, TODOs, secondary facts
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use mn_domain::error::{Error, Result};

use crate::organize;

pub const CORE_FILE: &str = "MEMORY.md";
pub const MEMORY_DIR: &str = "memory";

pub(crate) const CORE_HEADER: &str =
    "# Long-term Memory\nThis file stores core information only (user info, preferences).\n";

fn dated_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}\.md$").expect("valid dated file regex"))
}

/// Today's date in the local timezone, `YYYY-MM-DD`.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    workspace: PathBuf,
    memory_dir: PathBuf,
}

impl MemoryStore {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            memory_dir: workspace.join(MEMORY_DIR),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn memory_dir(&self) -> &Path {
        &self.memory_dir
    }

    pub fn core_file(&self) -> PathBuf {
        self.memory_dir.join(CORE_FILE)
    }

    pub fn today_file(&self) -> PathBuf {
        self.memory_dir.join(format!("{}.md", today()))
    }

    // ── Reads ─────────────────────────────────────────────────────

    pub async fn read_long_term(&self) -> Result<String> {
        read_or_empty(&self.core_file()).await
    }

    pub async fn read_today(&self) -> Result<String> {
        read_or_empty(&self.today_file()).await
    }

    /// Long-term memory plus today's notes, formatted for a system prompt.
    /// Empty when neither exists.
    pub async fn memory_context(&self) -> Result<String> {
        let mut parts = Vec::new();
        let long_term = self.read_long_term().await?;
        if !long_term.trim().is_empty() {
            parts.push(format!("## Long-term Memory\n{long_term}"));
        }
        let today = self.read_today().await?;
        if !today.trim().is_empty() {
            parts.push(format!("## Today's Notes\n{today}"));
        }
        Ok(parts.join("\n\n"))
    }

    /// Dated note files, newest first.
    pub fn list_dated_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.memory_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| dated_file_re().is_match(n))
            })
            .collect();
        files.sort();
        files.reverse();
        Ok(files)
    }

    /// Every file the recall index covers as `(workspace-relative path, absolute path)`:
    /// MEMORY.md first, then dated notes newest first.
    pub fn indexable_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut out = Vec::new();
        let core = self.core_file();
        if core.is_file() {
            out.push((format!("{MEMORY_DIR}/{CORE_FILE}"), core));
        }
        for path in self.list_dated_files()? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            out.push((format!("{MEMORY_DIR}/{name}"), path));
        }
        Ok(out)
    }

    /// Read a memory file by workspace-relative path (`memory/MEMORY.md`,
    /// `memory/2026-02-06.md`, or bare `MEMORY.md`), optionally sliced to
    /// `lines` lines starting at 1-based `start_line`. Paths resolving
    /// outside the memory directory are refused.
    pub async fn read_file(
        &self,
        path: &str,
        start_line: Option<usize>,
        lines: Option<usize>,
    ) -> Result<String> {
        let requested = Path::new(path);
        let candidate = if requested.is_absolute() {
            requested.to_path_buf()
        } else if requested == Path::new(CORE_FILE) {
            self.core_file()
        } else {
            self.workspace.join(requested)
        };

        let resolved = match fs::canonicalize(&candidate).await {
            Ok(p) if p.is_file() => p,
            _ => return Err(Error::Memory(format!("file not found: {path}"))),
        };
        let memory_root = fs::canonicalize(&self.memory_dir)
            .await
            .map_err(|_| Error::Memory(format!("file not found: {path}")))?;
        if !resolved.starts_with(&memory_root) {
            return Err(Error::Memory(format!("path outside memory dir: {path}")));
        }

        let content = fs::read_to_string(&resolved).await?;
        Ok(slice_lines(&content, start_line, lines))
    }

    // ── Writes ────────────────────────────────────────────────────

    /// Append a core fact to MEMORY.md, creating it with a header on first use.
    pub async fn append_core(&self, content: &str) -> Result<()> {
        fs::create_dir_all(&self.memory_dir).await?;
        let path = self.core_file();
        let entry = content.trim();
        if fs::try_exists(&path).await? {
            append(&path, &format!("\n\n---\n\n{entry}")).await
        } else {
            fs::write(&path, format!("{CORE_HEADER}\n{entry}")).await?;
            Ok(())
        }
    }

    /// Append a note to today's dated file, creating it with a date heading.
    pub async fn append_daily(&self, content: &str) -> Result<()> {
        fs::create_dir_all(&self.memory_dir).await?;
        let path = self.today_file();
        if fs::try_exists(&path).await? {
            append(&path, &format!("\n{content}")).await
        } else {
            fs::write(&path, format!("# {}\n\n{content}", today())).await?;
            Ok(())
        }
    }

    /// Regroup MEMORY.md entries under fixed sections without dropping any
    /// unique content. Returns a one-line report.
    pub async fn organize_long_term(&self) -> Result<String> {
        let path = self.core_file();
        if !fs::try_exists(&path).await? {
            return Ok("MEMORY.md does not exist; nothing to organize.".into());
        }
        let raw = fs::read_to_string(&path).await?;
        match organize::organize(&raw) {
            Some(organized) => {
                fs::write(&path, &organized.text).await?;
                tracing::info!(entries = organized.entries, "MEMORY.md organized");
                Ok(format!(
                    "Organized MEMORY.md: kept {} entries, grouped by category.",
                    organized.entries
                ))
            }
            None => Ok("MEMORY.md has no entries to organize (empty or template only).".into()),
        }
    }
}

// ── Private helpers ───────────────────────────────────────────────

async fn read_or_empty(path: &Path) -> Result<String> {
    match fs::read_to_string(path).await {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::Io(e)),
    }
}

async fn append(path: &Path, text: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new().append(true).open(path).await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

fn slice_lines(content: &str, start_line: Option<usize>, lines: Option<usize>) -> String {
    let Some(start_line) = start_line else {
        return content.to_string();
    };
    let all: Vec<&str> = content.split('\n').collect();
    let start = start_line.saturating_sub(1).min(all.len());
    let end = match lines {
        Some(n) => (start + n).min(all.len()),
        None => all.len(),
    };
    all[start..end].join("\n")
}
