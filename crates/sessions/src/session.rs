use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mn_domain::tool::Message;

/// Gate ensuring the pre-compaction memory flush runs at most once per
/// compaction cycle. Every completed compaction opens a new cycle in the
/// `Pending` state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushState {
    #[default]
    Pending,
    Done,
}

/// Durable conversational state for one session key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Rolling summary of everything compacted away so far.
    #[serde(default)]
    pub compaction_summary: Option<String>,
    #[serde(default)]
    pub compaction_count: u64,
    #[serde(default)]
    pub flush_state: FlushState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            compaction_summary: None,
            compaction_count: 0,
            flush_state: FlushState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// The most recent `max` messages, oldest first.
    pub fn history(&self, max: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(max);
        &self.messages[start..]
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// True when no flush has run yet for the current compaction cycle.
    pub fn needs_flush(&self) -> bool {
        self.flush_state == FlushState::Pending
    }

    pub fn mark_flushed(&mut self) {
        self.flush_state = FlushState::Done;
        self.touch();
    }

    /// Close the current compaction cycle: keep only `recent`, replace the
    /// summary when a new one was produced, and reopen the flush gate.
    pub fn record_compaction(&mut self, recent: Vec<Message>, summary: Option<String>) {
        self.messages = recent;
        if let Some(summary) = summary {
            self.compaction_summary = Some(summary);
        }
        self.compaction_count += 1;
        self.flush_state = FlushState::Pending;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(n: usize) -> Session {
        let mut s = Session::new("cli:test");
        for i in 0..n {
            s.push(Message::user(format!("m{i}")));
        }
        s
    }

    #[test]
    fn history_returns_tail() {
        let s = session_with(5);
        let tail: Vec<_> = s.history(2).iter().map(|m| m.content.text().unwrap_or("")).collect();
        assert_eq!(tail, vec!["m3", "m4"]);
        assert_eq!(s.history(50).len(), 5);
    }

    #[test]
    fn compaction_reopens_flush_gate() {
        let mut s = session_with(3);
        s.mark_flushed();
        assert!(!s.needs_flush());

        s.record_compaction(vec![Message::user("m2")], Some("summary".into()));
        assert_eq!(s.compaction_count, 1);
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.compaction_summary.as_deref(), Some("summary"));
        assert!(s.needs_flush());
    }

    #[test]
    fn compaction_without_summary_keeps_previous() {
        let mut s = session_with(3);
        s.compaction_summary = Some("old".into());
        s.record_compaction(Vec::new(), None);
        assert_eq!(s.compaction_summary.as_deref(), Some("old"));
        assert_eq!(s.compaction_count, 1);
    }

    #[test]
    fn legacy_file_without_flush_state_defaults_to_pending() {
        let json = r#"{
            "key": "cli:1",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        let s: Session = serde_json::from_str(json).unwrap();
        assert!(s.messages.is_empty());
        assert!(s.needs_flush());
    }
}
