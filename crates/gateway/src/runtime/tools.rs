//! Tool registry assembly and the gateway-side `message` tool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};

use mn_domain::envelope::OutboundMessage;
use mn_domain::error::{Error, Result};
use mn_domain::tool::ToolDefinition;
use mn_memory::{MemoryStore, RecallIndex};
use mn_sessions::SessionKey;
use mn_tools::registry::parse_args;
use mn_tools::{register_file_tools, register_memory_tools, Tool, ToolAccess, ToolRegistry, ToolTags};

use crate::bus::Outbox;

pub const MESSAGE_TOOL: &str = "message";

/// Destination of the turn currently running. Set at the start of every
/// turn so mid-turn sends land in the right conversation.
#[derive(Clone, Default)]
pub struct TurnTarget(Arc<RwLock<Option<SessionKey>>>);

impl TurnTarget {
    pub fn set(&self, key: SessionKey) {
        *self.0.write() = Some(key);
    }

    pub fn get(&self) -> Option<SessionKey> {
        self.0.read().clone()
    }
}

/// Every tool the engine offers: memory tools, workspace file tools, and
/// `message`.
pub fn build_registry(
    memory: &MemoryStore,
    workspace: &Path,
    recall: Option<Arc<dyn RecallIndex>>,
    outbox: Outbox,
    target: TurnTarget,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_memory_tools(&mut registry, memory.clone(), recall);
    register_file_tools(&mut registry, workspace);
    registry.register(
        Arc::new(MessageTool { outbox, target }),
        ToolTags::exposed(ToolAccess::SideEffect),
    );
    tracing::debug!(tools = registry.len(), "tool registry built");
    registry
}

#[derive(Deserialize)]
struct MessageArgs {
    content: String,
}

struct MessageTool {
    outbox: Outbox,
    target: TurnTarget,
}

#[async_trait]
impl Tool for MessageTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: MESSAGE_TOOL.into(),
            description: "Send a message to the user right away, before the final reply. \
                          Use for progress updates on long tasks."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "Message text" }
                },
                "required": ["content"]
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: MessageArgs = parse_args(MESSAGE_TOOL, args)?;
        let key = self
            .target
            .get()
            .ok_or_else(|| Error::Other("no active conversation to send to".into()))?;
        self.outbox
            .send(OutboundMessage::new(&key.channel, &key.chat_id, args.content))
            .await?;
        Ok(format!("Message sent to {key}"))
    }
}
