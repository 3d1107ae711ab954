//! Core runtime: the turn engine that ties sessions, compaction, recall,
//! prompt building, model calls, and tool dispatch into one serial loop.
//!
//! Entry point: [`AgentRuntime::process`] takes one inbound message and
//! returns the reply for it.

pub mod compact;
pub mod flush;
pub mod recall;
pub mod tools;
mod turn;

use std::sync::Arc;
use std::time::Duration;

use mn_domain::config::Config;
use mn_domain::envelope::OutboundMessage;
use mn_domain::error::{Error, Result};
use mn_memory::{MemoryStore, RecallIndex};
use mn_providers::{ChatRequest, ChatResponse, LlmProvider};
use mn_sessions::SessionStore;
use mn_tools::ToolRegistry;

use crate::bus::Outbox;
use crate::context::ContextBuilder;

pub use compact::CompactionScheduler;
pub use flush::MemoryFlushRunner;
pub use recall::RecallService;
pub use tools::TurnTarget;
pub use turn::{BACKGROUND_DONE_REPLY, CONTINUE_PROMPT, EMPTY_REPLY_NOTICE, NO_CONTENT_REPLY};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Provider handle with the optional per-call deadline applied.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    timeout: Option<Duration>,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Option<Duration>) -> Self {
        Self { provider, timeout }
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        match self.timeout {
            None => self.provider.chat(req).await,
            Some(limit) => tokio::time::timeout(limit, self.provider.chat(req))
                .await
                .map_err(|_| {
                    Error::Timeout(format!(
                        "{} did not answer within {}s",
                        self.provider.provider_id(),
                        limit.as_secs()
                    ))
                })?,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AgentRuntime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AgentRuntime {
    config: Arc<Config>,
    model: ModelClient,
    sessions: Arc<dyn SessionStore>,
    tools: Arc<ToolRegistry>,
    memory: MemoryStore,
    context: ContextBuilder,
    recall: RecallService,
    compaction: CompactionScheduler,
    outbox: Outbox,
    target: TurnTarget,
}

impl AgentRuntime {
    pub fn new(
        config: Arc<Config>,
        provider: Arc<dyn LlmProvider>,
        sessions: Arc<dyn SessionStore>,
        memory: MemoryStore,
        recall_index: Option<Arc<dyn RecallIndex>>,
        outbox: Outbox,
    ) -> Self {
        let model = ModelClient::new(
            provider,
            config.agent.model_timeout_secs.map(Duration::from_secs),
        );
        let target = TurnTarget::default();
        let tools = Arc::new(tools::build_registry(
            &memory,
            memory.workspace(),
            recall_index.clone(),
            outbox.clone(),
            target.clone(),
        ));
        let recall = RecallService::new(recall_index);
        let flush = MemoryFlushRunner::new(
            &config,
            model.clone(),
            tools.clone(),
            memory.clone(),
            sessions.clone(),
            recall.clone(),
        );
        let compaction = CompactionScheduler::new(&config, model.clone(), sessions.clone(), flush);
        let context = ContextBuilder::new(memory.clone(), config.agent.system_prompt.clone());

        Self {
            config,
            model,
            sessions,
            tools,
            memory,
            context,
            recall,
            compaction,
            outbox,
            target,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn default_channel(&self) -> &str {
        &self.config.agent.default_channel
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn recall(&self) -> &RecallService {
        &self.recall
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn compaction(&self) -> &CompactionScheduler {
        &self.compaction
    }

    /// Publish a message to the user outside the final reply.
    async fn notify(&self, msg: OutboundMessage) {
        if let Err(e) = self.outbox.send(msg).await {
            tracing::debug!(error = %e, "notice not delivered");
        }
    }
}
