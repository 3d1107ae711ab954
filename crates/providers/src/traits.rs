//! Provider-neutral model exchange.
//!
//! The turn engine, the memory flush, and the compaction summarizer all talk
//! to the model through [`LlmProvider::chat`]. Nothing here knows about a
//! concrete wire format.

use mn_domain::error::Result;
use mn_domain::tool::{Message, SideChannel, ToolCall, ToolDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One model call: the full context plus the tool catalog offered for it.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Empty for tool-less calls such as summarization.
    pub tools: Vec<ToolDefinition>,
    /// `None` lets the provider fall back to its configured model.
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Output cap and sampling temperature for this call.
    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = Some(max_tokens);
        self.temperature = Some(temperature);
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// What the model said back: text, tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    /// In emission order. Empty means the text is the final answer.
    pub tool_calls: Vec<ToolCall>,
    /// Opaque provider data; must ride along with the assistant turn that
    /// carries these tool calls.
    pub side_channel: Option<SideChannel>,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// Plain-text answer with no tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// No tool calls and nothing but whitespace for text.
    pub fn is_blank(&self) -> bool {
        !self.has_tool_calls() && self.content.trim().is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A language-model backend. Failures surface as transport errors
/// (`Http`, `Timeout`, `Provider`, `Auth`).
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Stable id used in logs and timeout messages.
    fn provider_id(&self) -> &str;
}
