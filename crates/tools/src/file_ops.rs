//! Workspace file tools: `read_file`, `write_file`, `list_dir`.
//!
//! Every path is relative to the workspace root. Absolute paths, `..`
//! components, and anything that resolves (through symlinks) outside the
//! root are refused before any I/O happens.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use mn_domain::error::{Error, Result};
use mn_domain::tool::ToolDefinition;

use crate::registry::{parse_args, Tool, ToolAccess, ToolRegistry, ToolTags};

/// Register the three workspace file tools against `root`.
pub fn register_file_tools(registry: &mut ToolRegistry, root: &Path) {
    let root = root.to_path_buf();
    registry.register(
        Arc::new(ReadFile { root: root.clone() }),
        ToolTags::exposed(ToolAccess::ReadOnly),
    );
    registry.register(
        Arc::new(ListDir { root: root.clone() }),
        ToolTags::exposed(ToolAccess::ReadOnly),
    );
    registry.register(
        Arc::new(WriteFile { root }),
        ToolTags::exposed(ToolAccess::SideEffect),
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolve `requested` inside `root`, refusing anything that escapes it.
/// The target need not exist; its nearest existing ancestor is
/// canonicalized and the remaining components appended.
pub fn validate_path(root: &Path, requested: &str) -> Result<PathBuf> {
    let rel = Path::new(requested);
    if rel.is_absolute() {
        return Err(Error::Other(format!(
            "absolute paths are not allowed; use a path relative to the workspace (got '{requested}')"
        )));
    }
    if rel.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::Other("path must not contain '..' components".into()));
    }

    let root = root.canonicalize().map_err(|e| {
        Error::Other(format!("cannot resolve workspace root '{}': {e}", root.display()))
    })?;
    let candidate = root.join(rel);

    let mut existing = candidate.as_path();
    let mut missing: Vec<OsString> = Vec::new();
    while !existing.exists() {
        let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
            break;
        };
        missing.push(name.to_os_string());
        existing = parent;
    }
    let mut resolved = existing.canonicalize().map_err(|e| {
        Error::Other(format!("cannot resolve path '{}': {e}", candidate.display()))
    })?;
    resolved.extend(missing.into_iter().rev());

    if !resolved.starts_with(&root) {
        return Err(Error::Other(format!(
            "path '{requested}' resolves outside the workspace"
        )));
    }
    Ok(resolved)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// read_file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct ReadArgs {
    path: String,
    /// 0-based line offset.
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

struct ReadFile {
    root: PathBuf,
}

#[async_trait]
impl Tool for ReadFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".into(),
            description: "Read a text file in the workspace. Supports a line offset and limit."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path relative to the workspace" },
                    "offset": { "type": "integer", "description": "First line to return (0-based)" },
                    "limit": { "type": "integer", "description": "Maximum number of lines" }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: ReadArgs = parse_args("read_file", args)?;
        let path = validate_path(&self.root, &args.path)?;
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Other(format!("failed to read '{}': {e}", args.path)))?;
        if args.offset.is_none() && args.limit.is_none() {
            return Ok(content);
        }
        let offset = args.offset.unwrap_or(0);
        let limit = args.limit.unwrap_or(usize::MAX);
        Ok(content
            .lines()
            .skip(offset)
            .take(limit)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// write_file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

struct WriteFile {
    root: PathBuf,
}

#[async_trait]
impl Tool for WriteFile {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".into(),
            description: "Create or overwrite a file in the workspace.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path relative to the workspace" },
                    "content": { "type": "string", "description": "Full file content" }
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: WriteArgs = parse_args("write_file", args)?;
        let path = validate_path(&self.root, &args.path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Temp sibling, then rename into place.
        let tmp_path = path.with_file_name(format!(
            ".{}.{}.tmp",
            path.file_name().unwrap_or_default().to_string_lossy(),
            uuid::Uuid::new_v4().as_simple()
        ));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(args.content.as_bytes()).await?;
        file.sync_data().await?;
        drop(file);
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::Io(e));
        }

        Ok(format!(
            "Wrote {} bytes to {}",
            args.content.len(),
            args.path
        ))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// list_dir
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct ListArgs {
    #[serde(default = "d_dot")]
    path: String,
}

fn d_dot() -> String {
    ".".into()
}

struct ListDir {
    root: PathBuf,
}

#[async_trait]
impl Tool for ListDir {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_dir".into(),
            description: "List a workspace directory. Directories end with '/'.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Directory relative to the workspace (default '.')" }
                }
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: ListArgs = parse_args("list_dir", args)?;
        let path = validate_path(&self.root, &args.path)?;
        let mut read_dir = fs::read_dir(&path)
            .await
            .map_err(|e| Error::Other(format!("failed to read directory '{}': {e}", args.path)))?;

        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            names.push(name);
        }
        if names.is_empty() {
            return Ok(format!("{} is empty", args.path));
        }
        names.sort();
        Ok(names.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(ws: &TempDir) -> ToolRegistry {
        let mut r = ToolRegistry::new();
        register_file_tools(&mut r, ws.path());
        r
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        let ws = TempDir::new().unwrap();
        let err = validate_path(ws.path(), "../etc/passwd").unwrap_err();
        assert!(err.to_string().contains(".."));

        let abs = if cfg!(windows) { "C:\\Windows" } else { "/etc/passwd" };
        let err = validate_path(ws.path(), abs).unwrap_err();
        assert!(err.to_string().contains("absolute paths are not allowed"));
    }

    #[test]
    fn accepts_nested_paths_that_do_not_exist_yet() {
        let ws = TempDir::new().unwrap();
        let resolved = validate_path(ws.path(), "a/b/c.txt").unwrap();
        assert!(resolved.ends_with("a/b/c.txt"));
        assert!(resolved.starts_with(ws.path().canonicalize().unwrap()));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let ws = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.path().join("link")).unwrap();
        let err = validate_path(ws.path(), "link/secret.txt").unwrap_err();
        assert!(err.to_string().contains("outside the workspace"));
    }

    #[tokio::test]
    async fn write_then_read_with_window() {
        let ws = TempDir::new().unwrap();
        let r = registry(&ws);

        let out = r
            .execute(
                "write_file",
                json!({ "path": "notes/todo.txt", "content": "one\ntwo\nthree" }),
            )
            .await;
        assert_eq!(out, "Wrote 13 bytes to notes/todo.txt");

        let all = r.execute("read_file", json!({ "path": "notes/todo.txt" })).await;
        assert_eq!(all, "one\ntwo\nthree");
        let window = r
            .execute("read_file", json!({ "path": "notes/todo.txt", "offset": 1, "limit": 1 }))
            .await;
        assert_eq!(window, "two");
    }

    #[tokio::test]
    async fn list_dir_marks_directories() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir(ws.path().join("sub")).unwrap();
        std::fs::write(ws.path().join("a.md"), "x").unwrap();

        let r = registry(&ws);
        assert_eq!(r.execute("list_dir", json!({})).await, "a.md\nsub/");
        assert_eq!(
            r.execute("list_dir", json!({ "path": "sub" })).await,
            "sub is empty"
        );
    }

    #[tokio::test]
    async fn read_missing_file_is_error_text() {
        let ws = TempDir::new().unwrap();
        let out = registry(&ws)
            .execute("read_file", json!({ "path": "nope.txt" }))
            .await;
        assert!(out.starts_with("Error: failed to read 'nope.txt'"));
    }
}
