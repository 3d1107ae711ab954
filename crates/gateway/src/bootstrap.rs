//! Runtime construction shared by `serve`, `run`, `chat`, and the `memory`
//! subcommands.

use std::sync::Arc;

use anyhow::Context;

use mn_domain::config::{Config, ConfigSeverity};
use mn_memory::{EmbeddingService, LocalRecallIndex, MemoryStore, RecallIndex};
use mn_providers::{LlmProvider, OpenAiCompatProvider};
use mn_sessions::{FileSessionStore, SessionStore};

use crate::bus::Outbox;
use crate::runtime::AgentRuntime;

/// Validate config, initialize every collaborator, and return a wired
/// [`AgentRuntime`].
pub fn build_runtime(config: Arc<Config>, outbox: Outbox) -> anyhow::Result<AgentRuntime> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }

    // ── Memory ───────────────────────────────────────────────────────
    let memory = open_memory(&config)?;
    let recall = build_recall_index(&config, &memory);
    tracing::info!(
        workspace = %config.memory.workspace.display(),
        recall = recall.is_some(),
        "memory ready"
    );

    // ── Sessions ─────────────────────────────────────────────────────
    let sessions: Arc<dyn SessionStore> = Arc::new(
        FileSessionStore::new(&config.sessions.state_path)
            .context("opening session store")?,
    );

    // ── LLM provider ─────────────────────────────────────────────────
    let provider: Arc<dyn LlmProvider> = Arc::new(
        OpenAiCompatProvider::from_config(&config.llm, &config.agent.model)
            .context("initializing LLM provider")?,
    );
    tracing::info!(
        provider = %config.llm.provider_id,
        base_url = %config.llm.base_url,
        model = %config.agent.model,
        "LLM provider ready"
    );

    Ok(AgentRuntime::new(
        config, provider, sessions, memory, recall, outbox,
    ))
}

/// Memory store over the configured workspace, creating the directory.
pub fn open_memory(config: &Config) -> anyhow::Result<MemoryStore> {
    std::fs::create_dir_all(&config.memory.workspace).with_context(|| {
        format!(
            "creating workspace {}",
            config.memory.workspace.display()
        )
    })?;
    Ok(MemoryStore::new(&config.memory.workspace))
}

/// The local recall index, or `None` when search is disabled.
pub fn build_recall_index(config: &Config, memory: &MemoryStore) -> Option<Arc<dyn RecallIndex>> {
    if !config.memory.search_enabled {
        return None;
    }
    let embeddings = EmbeddingService::shared(config.memory.embedding_dimensions);
    Some(Arc::new(LocalRecallIndex::new(
        memory.clone(),
        &config.memory.index_path,
        embeddings,
    )))
}
