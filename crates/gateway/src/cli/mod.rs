pub mod chat;
pub mod config;
pub mod memory;
pub mod run;

use clap::{Parser, Subcommand};

/// mnemo — a conversational agent with durable memory.
#[derive(Debug, Parser)]
#[command(name = "mnemo", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the agent loop over stdin/stdout (default when no subcommand is given).
    Serve,
    /// Send a single message to the agent and print the reply.
    Run {
        /// The message to send.
        message: String,
        /// Session key as `channel:chat_id`.
        #[arg(long, default_value = "cli:direct")]
        session: String,
    },
    /// Interactive chat session.
    Chat {
        /// Session key as `channel:chat_id`.
        #[arg(long, default_value = "cli:chat")]
        session: String,
    },
    /// Memory utilities.
    #[command(subcommand)]
    Memory(MemoryCommand),
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum MemoryCommand {
    /// Semantic search over MEMORY.md and the dated notes.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Rebuild the recall index from the memory files.
    Reindex,
    /// Group, de-duplicate, and rewrite MEMORY.md.
    Organize,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `MNEMO_CONFIG` (or
/// `config.toml` by default). A missing file yields the defaults.
/// Returns the parsed config and the path that was used.
pub fn load_config() -> anyhow::Result<(mn_domain::config::Config, String)> {
    let config_path =
        std::env::var("MNEMO_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        mn_domain::config::Config::default()
    };

    Ok((config, config_path))
}
