//! Memory tools: the model's interface to MEMORY.md, dated notes, and recall.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use mn_domain::error::Result;
use mn_domain::tool::ToolDefinition;
use mn_memory::{format_recall, MemoryStore, RecallIndex};

use crate::registry::{parse_args, Tool, ToolAccess, ToolRegistry, ToolTags};

pub const REMEMBER_CORE_TOOL: &str = "remember_core";
/// Legacy alias of [`REMEMBER_CORE_TOOL`].
pub const REMEMBER_TOOL: &str = "remember";
pub const DAILY_NOTE_TOOL: &str = "append_daily";
pub const ORGANIZE_TOOL: &str = "organize_memory";
pub const MEMORY_GET_TOOL: &str = "memory_get";
/// Recall is injected by the engine before the first model call, so this
/// tool is registered hidden.
pub const RECALL_TOOL: &str = "memory_search";

const PREVIEW_CHARS: usize = 100;

/// Register the full memory tool set.
pub fn register_memory_tools(
    registry: &mut ToolRegistry,
    store: MemoryStore,
    recall: Option<Arc<dyn RecallIndex>>,
) {
    let write = ToolTags::exposed(ToolAccess::MemoryWrite);
    registry.register(
        Arc::new(RememberCore {
            store: store.clone(),
            name: REMEMBER_CORE_TOOL,
        }),
        write,
    );
    registry.register(
        Arc::new(RememberCore {
            store: store.clone(),
            name: REMEMBER_TOOL,
        }),
        write,
    );
    registry.register(Arc::new(AppendDaily { store: store.clone() }), write);
    registry.register(Arc::new(OrganizeMemory { store: store.clone() }), write);
    registry.register(
        Arc::new(MemoryGet { store }),
        ToolTags::exposed(ToolAccess::ReadOnly),
    );
    if let Some(index) = recall {
        registry.register(
            Arc::new(MemorySearch { index }),
            ToolTags::engine_only(ToolAccess::ReadOnly),
        );
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let head: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

#[derive(Deserialize)]
struct ContentArgs {
    content: String,
}

// ── remember_core / remember ──────────────────────────────────────

struct RememberCore {
    store: MemoryStore,
    name: &'static str,
}

#[async_trait]
impl Tool for RememberCore {
    fn definition(&self) -> ToolDefinition {
        let description = if self.name == REMEMBER_TOOL {
            "Save important information to long-term memory (MEMORY.md). Always call this \
             when the user explicitly asks you to remember or save something."
        } else {
            "Save core information to MEMORY.md: things the user explicitly asked you to \
             remember, identity (name, email, phone), preferences, critical facts. Keep it concise."
        };
        ToolDefinition {
            name: self.name.into(),
            description: description.into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "Information to save (Markdown)" }
                },
                "required": ["content"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: ContentArgs = parse_args(self.name, args)?;
        self.store.append_core(&args.content).await?;
        Ok(format!(
            "Successfully saved to MEMORY.md (core): {}",
            preview(&args.content)
        ))
    }
}

// ── append_daily ──────────────────────────────────────────────────

struct AppendDaily {
    store: MemoryStore,
}

#[async_trait]
impl Tool for AppendDaily {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: DAILY_NOTE_TOOL.into(),
            description: "Append notes to today's memory file (memory/YYYY-MM-DD.md). Use for \
                          session summaries, discussion points, TODO items, secondary facts."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "Notes to append (Markdown)" }
                },
                "required": ["content"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: ContentArgs = parse_args(DAILY_NOTE_TOOL, args)?;
        self.store.append_daily(&args.content).await?;
        let file = self
            .store
            .today_file()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!(
            "Successfully appended to {file}: {}",
            preview(&args.content)
        ))
    }
}

// ── organize_memory ───────────────────────────────────────────────

struct OrganizeMemory {
    store: MemoryStore,
}

#[async_trait]
impl Tool for OrganizeMemory {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: ORGANIZE_TOOL.into(),
            description: "Organize MEMORY.md: group entries into sections (User Information, \
                          Preferences, Project Context, Important Notes, Other), remove \
                          duplicates, and rewrite the file. Use when asked to tidy memory."
                .into(),
            parameters: json!({ "type": "object", "properties": {}, "required": [] }),
        }
    }

    async fn execute(&self, _args: Value) -> Result<String> {
        self.store.organize_long_term().await
    }
}

// ── memory_get ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GetArgs {
    path: String,
    #[serde(default)]
    start_line: Option<usize>,
    #[serde(default)]
    lines: Option<usize>,
}

struct MemoryGet {
    store: MemoryStore,
}

#[async_trait]
impl Tool for MemoryGet {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: MEMORY_GET_TOOL.into(),
            description: "Read a memory file by workspace-relative path, e.g. memory/MEMORY.md \
                          or memory/2026-02-06.md. Use start_line and lines for a partial read."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Workspace-relative path" },
                    "start_line": { "type": "integer", "description": "Start line (1-based)" },
                    "lines": { "type": "integer", "description": "Number of lines to read" }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: GetArgs = parse_args(MEMORY_GET_TOOL, args)?;
        self.store
            .read_file(&args.path, args.start_line, args.lines)
            .await
    }
}

// ── memory_search ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "d_top_k")]
    top_k: usize,
}

fn d_top_k() -> usize {
    5
}

struct MemorySearch {
    index: Arc<dyn RecallIndex>,
}

#[async_trait]
impl Tool for MemorySearch {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: RECALL_TOOL.into(),
            description: "Semantically search memory files (MEMORY.md, memory/YYYY-MM-DD.md)."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "top_k": { "type": "integer", "description": "Max results (default 5)", "default": 5 }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: SearchArgs = parse_args(RECALL_TOOL, args)?;
        let hits = self.index.search(&args.query, args.top_k).await?;
        Ok(format_recall(&hits).unwrap_or_else(|| "No relevant memories found.".into()))
    }
}
