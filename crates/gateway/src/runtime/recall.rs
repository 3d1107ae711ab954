//! Recall and reindex glue around the optional [`RecallIndex`].
//!
//! Both directions are best-effort: a failed search means "no recall" and a
//! failed reindex is logged. Reindexing runs as a detached task so the turn
//! that wrote memory never waits for it.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use mn_memory::{format_recall, RecallIndex};

#[derive(Clone, Default)]
pub struct RecallService {
    index: Option<Arc<dyn RecallIndex>>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RecallService {
    pub fn new(index: Option<Arc<dyn RecallIndex>>) -> Self {
        Self {
            index,
            pending: Arc::default(),
        }
    }

    pub fn index(&self) -> Option<&Arc<dyn RecallIndex>> {
        self.index.as_ref()
    }

    /// Formatted recall block for `query`, or `None` when recall is
    /// disabled, the query is blank, nothing matched, or the search failed.
    pub async fn recall(&self, query: &str, k: usize) -> Option<String> {
        let index = self.index.as_ref()?;
        if query.trim().is_empty() || k == 0 {
            return None;
        }
        match index.search(query, k).await {
            Ok(hits) => format_recall(&hits),
            Err(e) => {
                tracing::warn!(error = %e, "recall search failed; continuing without recall");
                None
            }
        }
    }

    /// Rebuild the index in the background.
    pub fn trigger_reindex(&self, reason: &'static str) {
        let Some(index) = self.index.clone() else {
            return;
        };
        let handle = tokio::spawn(async move {
            match index.reindex().await {
                Ok(chunks) => tracing::debug!(reason, chunks, "reindex finished"),
                Err(e) => tracing::warn!(reason, error = %e, "reindex failed"),
            }
        });
        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every reindex started so far.
    pub async fn drain(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "reindex task panicked");
            }
        }
    }
}
