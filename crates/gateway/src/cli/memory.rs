//! `mnemo memory …` — inspect and maintain memory without running a turn.

use mn_domain::config::Config;
use mn_memory::{format_recall, RecallIndex};

use crate::bootstrap;

pub async fn search(config: &Config, query: &str, top_k: usize) -> anyhow::Result<()> {
    let index = require_index(config)?;
    let hits = index.search(query, top_k).await?;
    match format_recall(&hits) {
        Some(block) => println!("{block}"),
        None => println!("No relevant memories found."),
    }
    Ok(())
}

pub async fn reindex(config: &Config) -> anyhow::Result<()> {
    let index = require_index(config)?;
    let chunks = index.reindex().await?;
    println!("Indexed {chunks} chunk(s) into {}", config.memory.index_path.display());
    Ok(())
}

pub async fn organize(config: &Config) -> anyhow::Result<()> {
    let memory = bootstrap::open_memory(config)?;
    let summary = memory.organize_long_term().await?;
    println!("{summary}");
    if let Some(index) = bootstrap::build_recall_index(config, &memory) {
        index.reindex().await?;
    }
    Ok(())
}

fn require_index(config: &Config) -> anyhow::Result<std::sync::Arc<dyn RecallIndex>> {
    let memory = bootstrap::open_memory(config)?;
    bootstrap::build_recall_index(config, &memory)
        .ok_or_else(|| anyhow::anyhow!("memory search is disabled (memory.search_enabled = false)"))
}
