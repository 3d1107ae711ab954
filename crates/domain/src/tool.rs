use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic).
/// Every adapter converts provider-specific tool calls to/from this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// Provider-specific data attached to an assistant turn (reasoning traces,
/// thinking blocks). Stored and replayed verbatim; never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideChannel {
    pub provider: String,
    pub payload: serde_json::Value,
}

/// A message in the conversation (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_channel: Option<SideChannel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "image")]
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self { role, content, side_channel: None }
    }
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, MessageContent::Text(text.into()))
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(text.into()))
    }
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            Role::Tool,
            MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error: false,
            }]),
        )
    }

    /// Assistant turn that requested tools. Text (if any) comes first,
    /// followed by one `ToolUse` part per call in request order.
    pub fn assistant_tool_calls(
        text: &str,
        tool_calls: &[ToolCall],
        side_channel: Option<SideChannel>,
    ) -> Self {
        let mut parts = Vec::with_capacity(tool_calls.len() + 1);
        if !text.is_empty() {
            parts.push(ContentPart::Text { text: text.to_string() });
        }
        for tc in tool_calls {
            parts.push(ContentPart::ToolUse {
                id: tc.call_id.clone(),
                name: tc.tool_name.clone(),
                input: tc.arguments.clone(),
            });
        }
        Self {
            role: Role::Assistant,
            content: MessageContent::Parts(parts),
            side_channel,
        }
    }

    /// Tool calls carried by this message, in the order they were requested.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolUse { id, name, input } => Some(ToolCall {
                        call_id: id.clone(),
                        tool_name: name.clone(),
                        arguments: input.clone(),
                    }),
                    _ => None,
                })
                .collect(),
        }
    }

    /// The call id this message answers, for `tool` role messages.
    pub fn tool_result_id(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            }),
            MessageContent::Text(_) => None,
        }
    }
}

impl MessageContent {
    /// Extract the plain-text content (first text part, or the full text).
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ToolResult { content, .. } => Some(content.as_str()),
                _ => None,
            }),
        }
    }

    /// All text parts joined by newlines. Tool results count as text.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ToolResult { content, .. } => Some(content.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// True when the payload carries no text at all (images, bare tool calls).
    pub fn is_non_text(&self) -> bool {
        match self {
            MessageContent::Text(_) => false,
            MessageContent::Parts(parts) => !parts.iter().any(|p| {
                matches!(p, ContentPart::Text { .. } | ContentPart::ToolResult { .. })
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_tool_calls_preserves_order_and_side_channel() {
        let calls = vec![
            ToolCall {
                call_id: "a".into(),
                tool_name: "read_file".into(),
                arguments: serde_json::json!({"path": "x"}),
            },
            ToolCall {
                call_id: "b".into(),
                tool_name: "append_daily".into(),
                arguments: serde_json::json!({"content": "y"}),
            },
        ];
        let side = SideChannel {
            provider: "openai_compat".into(),
            payload: serde_json::json!({"reasoning_content": "thinking"}),
        };
        let msg = Message::assistant_tool_calls("checking", &calls, Some(side.clone()));

        assert_eq!(msg.tool_calls(), calls);
        assert_eq!(msg.content.text(), Some("checking"));
        assert_eq!(msg.side_channel, Some(side));
    }

    #[test]
    fn message_serde_round_trips_side_channel() {
        let mut msg = Message::assistant("hi");
        msg.side_channel = Some(SideChannel {
            provider: "p".into(),
            payload: serde_json::json!({"thinking_blocks": [{"t": 1}]}),
        });
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.side_channel, msg.side_channel);
    }

    #[test]
    fn plain_message_omits_side_channel_field() {
        let json = serde_json::to_value(Message::user("x")).unwrap();
        assert!(json.get("side_channel").is_none());
    }

    #[test]
    fn image_only_content_is_non_text() {
        let content = MessageContent::Parts(vec![ContentPart::Image {
            url: "data:image/png;base64,AAAA".into(),
            media_type: Some("image/png".into()),
        }]);
        assert!(content.is_non_text());
        assert!(!MessageContent::Text(String::new()).is_non_text());
    }

    #[test]
    fn tool_result_id_reads_back() {
        let msg = Message::tool_result("call_7", "ok");
        assert_eq!(msg.tool_result_id(), Some("call_7"));
        assert_eq!(msg.content.extract_all_text(), "ok");
    }
}
