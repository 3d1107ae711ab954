//! Tool registry: the single dispatch point for tool calls.
//!
//! Every registration carries [`ToolTags`]. Visibility to the model and
//! membership in the memory-writing set are read from the tags, never from
//! the tool's name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use mn_domain::error::{Error, Result};
use mn_domain::tool::ToolDefinition;

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, args: Value) -> Result<String>;
}

/// What a tool may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolAccess {
    ReadOnly,
    /// Mutates on-disk memory; firing one schedules a recall reindex.
    MemoryWrite,
    SideEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolTags {
    /// Whether the tool appears in the catalog sent to the model.
    pub exposed_to_model: bool,
    pub access: ToolAccess,
}

impl ToolTags {
    pub const fn exposed(access: ToolAccess) -> Self {
        Self {
            exposed_to_model: true,
            access,
        }
    }

    pub const fn engine_only(access: ToolAccess) -> Self {
        Self {
            exposed_to_model: false,
            access,
        }
    }
}

struct Entry {
    tool: Arc<dyn Tool>,
    definition: ToolDefinition,
    tags: ToolTags,
}

/// Ordered collection of tools. Registration order is catalog order.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration under the same name replaces
    /// the earlier one in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>, tags: ToolTags) {
        let definition = tool.definition();
        let name = definition.name.clone();
        let entry = Entry {
            tool,
            definition,
            tags,
        };
        match self.by_name.get(&name) {
            Some(&idx) => self.entries[idx] = entry,
            None => {
                self.by_name.insert(name, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tags(&self, name: &str) -> Option<ToolTags> {
        self.by_name.get(name).map(|&i| self.entries[i].tags)
    }

    pub fn is_memory_write(&self, name: &str) -> bool {
        self.tags(name)
            .is_some_and(|t| t.access == ToolAccess::MemoryWrite)
    }

    /// Catalog for the main turn loop.
    pub fn model_definitions(&self) -> Vec<ToolDefinition> {
        self.definitions_where(|t| t.exposed_to_model)
    }

    /// Catalog for the pre-compaction flush: memory writers plus read tools.
    pub fn flush_definitions(&self) -> Vec<ToolDefinition> {
        self.definitions_where(|t| t.exposed_to_model && t.access != ToolAccess::SideEffect)
    }

    fn definitions_where(&self, keep: impl Fn(&ToolTags) -> bool) -> Vec<ToolDefinition> {
        self.entries
            .iter()
            .filter(|e| keep(&e.tags))
            .map(|e| e.definition.clone())
            .collect()
    }

    /// Run a tool. Never fails: unknown tools and tool errors come back as
    /// `Error: ...` text for the model to read.
    pub async fn execute(&self, name: &str, args: Value) -> String {
        let Some(&idx) = self.by_name.get(name) else {
            tracing::warn!(tool = name, "unknown tool requested");
            return format!("Error: unknown tool '{name}'");
        };
        match self.entries[idx].tool.execute(args).await {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool failed");
                format!("Error: {e}")
            }
        }
    }
}

/// Deserialize tool arguments into a request struct.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| Error::Other(format!("invalid arguments for {tool}: {e}")))
}
