//! Prompt assembly: the system prompt and the message list for one turn.

use std::path::{Path, PathBuf};

use base64::Engine as _;

use mn_domain::tool::{ContentPart, Message, MessageContent, Role};
use mn_memory::MemoryStore;
use mn_tools::memory::{DAILY_NOTE_TOOL, REMEMBER_CORE_TOOL};

pub const SUMMARY_HEADER: &str = "## Prior conversation summary";
pub const RECALL_HEADER: &str = "## Relevant memories (from semantic search)";

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

const CRON_INSTRUCTION: &str = "\n\n## Scheduled task\n\n\
    This message was triggered by a scheduled job and the task is executing now. \
    Carry it out directly instead of scheduling it again. For a plain reminder, \
    reply with the reminder text (for example \"Time's up!\").";

pub struct ContextBuilder {
    memory: MemoryStore,
    extra_prompt: Option<String>,
}

impl ContextBuilder {
    pub fn new(memory: MemoryStore, extra_prompt: Option<String>) -> Self {
        Self {
            memory,
            extra_prompt,
        }
    }

    fn identity(&self) -> String {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M (%A)");
        let workspace = self.memory.workspace().display();
        let memory_dir = self.memory.memory_dir().display();
        format!(
            "# mnemo\n\n\
             You are mnemo, a helpful assistant with durable memory.\n\n\
             ## Current time\n{now}\n\n\
             ## Workspace\n\
             Your workspace is {workspace}. File tools take paths relative to it.\n\
             - Long-term memory: {memory_dir}/MEMORY.md\n\
             - Daily notes: {memory_dir}/YYYY-MM-DD.md\n\n\
             ## Memory\n\
             Use `{REMEMBER_CORE_TOOL}` for facts the user asks you to remember, identity \
             details, and stable preferences. Use `{DAILY_NOTE_TOOL}` for session notes, \
             decisions, and TODO items. Relevant memories are searched for you and \
             included below when found; do not ask for them again."
        )
    }

    /// Identity, optional configured prompt text, and current memory
    /// contents, separated by horizontal rules.
    pub async fn system_prompt(&self) -> String {
        let mut parts = vec![self.identity()];
        if let Some(extra) = self.extra_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
            parts.push(extra.trim().to_string());
        }
        match self.memory.memory_context().await {
            Ok(ctx) if !ctx.is_empty() => parts.push(format!("# Memory\n\n{ctx}")),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "memory context unavailable"),
        }
        parts.join(SECTION_SEPARATOR)
    }

    /// Full message list for a model call: system prompt (with summary and
    /// recall blocks), bounded history, then the new user content.
    pub async fn build_messages(
        &self,
        history: &[Message],
        content: &str,
        media: &[PathBuf],
        summary: Option<&str>,
        recall: Option<&str>,
        cron: bool,
    ) -> Vec<Message> {
        let mut system = self.system_prompt().await;
        if let Some(summary) = summary.filter(|s| !s.trim().is_empty()) {
            system.push_str(&format!("\n\n{SUMMARY_HEADER}\n\n{summary}"));
        }
        if let Some(recall) = recall.filter(|s| !s.trim().is_empty()) {
            system.push_str(&format!("\n\n{RECALL_HEADER}\n\n{recall}"));
        }
        if cron {
            system.push_str(CRON_INSTRUCTION);
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(history.iter().cloned());
        messages.push(Message::new(
            Role::User,
            user_content(content, media).await,
        ));
        messages
    }
}

/// Text plus inlined images. Images come first; non-image attachments and
/// unreadable files are skipped.
pub async fn user_content(content: &str, media: &[PathBuf]) -> MessageContent {
    let mut parts = Vec::new();
    for path in media {
        if let Some(part) = image_part(path).await {
            parts.push(part);
        }
    }
    if parts.is_empty() {
        return MessageContent::Text(content.to_string());
    }
    parts.push(ContentPart::Text {
        text: content.to_string(),
    });
    MessageContent::Parts(parts)
}

async fn image_part(path: &Path) -> Option<ContentPart> {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_().as_str() != "image" {
        return None;
    }
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable attachment");
            return None;
        }
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    let media_type = mime.essence_str().to_string();
    Some(ContentPart::Image {
        url: format!("data:{media_type};base64,{encoded}"),
        media_type: Some(media_type),
    })
}
