mod agent;
mod compaction;
mod llm;
mod memory;
mod observability;
mod sessions;

pub use agent::*;
pub use compaction::*;
pub use llm::*;
pub use memory::*;
pub use observability::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: &str, message: &str| {
            errors.push(ConfigError {
                severity,
                field: field.into(),
                message: message.into(),
            });
        };

        if self.agent.max_tool_iterations == 0 {
            push(
                ConfigSeverity::Error,
                "agent.max_tool_iterations",
                "must be greater than 0",
            );
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            push(
                ConfigSeverity::Error,
                "agent.temperature",
                "must be between 0.0 and 2.0",
            );
        }
        if self.agent.default_channel.is_empty() {
            push(
                ConfigSeverity::Error,
                "agent.default_channel",
                "must not be empty",
            );
        }
        if self.agent.model_timeout_secs == Some(0) {
            push(
                ConfigSeverity::Error,
                "agent.model_timeout_secs",
                "must be greater than 0 when set",
            );
        }

        if self.compaction.enabled {
            if self.compaction.keep_recent >= self.compaction.threshold_messages {
                push(
                    ConfigSeverity::Error,
                    "compaction.keep_recent",
                    "must be smaller than compaction.threshold_messages",
                );
            }
            if self.compaction.keep_recent == 0 {
                push(
                    ConfigSeverity::Warning,
                    "compaction.keep_recent",
                    "0 discards every message on compaction",
                );
            }
            if self.compaction.memory_flush && self.compaction.flush_max_iterations == 0 {
                push(
                    ConfigSeverity::Error,
                    "compaction.flush_max_iterations",
                    "must be greater than 0 when memory_flush is enabled",
                );
            }
        }

        if self.agent.max_history_messages > self.compaction.threshold_messages
            && self.compaction.enabled
        {
            push(
                ConfigSeverity::Warning,
                "agent.max_history_messages",
                "larger than compaction.threshold_messages; history is compacted before it fills",
            );
        }

        if self.memory.embedding_dimensions == 0 {
            push(
                ConfigSeverity::Error,
                "memory.embedding_dimensions",
                "must be greater than 0",
            );
        }

        if self.llm.base_url.is_empty() {
            push(ConfigSeverity::Error, "llm.base_url", "must not be empty");
        }

        errors
    }
}
