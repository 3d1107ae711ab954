//! Semantic recall over memory files.
//!
//! [`LocalRecallIndex`] chunks MEMORY.md and the dated notes, embeds every
//! chunk, and keeps the resulting snapshot both in memory and as a JSON file
//! under the configured index directory. Searches and rebuilds run on the
//! blocking pool. The index is eventually consistent: a search issued while a
//! rebuild is in flight answers from the previous snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use mn_domain::error::{Error, Result};
use mn_domain::trace::TraceEvent;

use crate::chunk::chunk_text;
use crate::embedding::{cosine_similarity, EmbeddingService};
use crate::store::MemoryStore;

/// Upper bound on hits returned by one search.
pub const MAX_TOP_K: usize = 20;

const SNIPPET_CHARS: usize = 700;
const INDEX_FILE: &str = "index.json";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One ranked snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallHit {
    pub content: String,
    /// Workspace-relative path, e.g. `memory/2026-10-16.md`.
    pub source_path: String,
    /// 1-based first line of the snippet in its source file.
    pub line: usize,
    /// Similarity in `[0, 1]`, rounded to 3 decimals.
    pub score: f32,
}

#[async_trait]
pub trait RecallIndex: Send + Sync {
    /// Top `k` snippets for `query`, best first. An empty query yields no hits.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RecallHit>>;

    /// Rebuild from the memory files. Returns the number of chunks indexed.
    async fn reindex(&self) -> Result<usize>;
}

/// Render hits as a recall block; `None` when there are none.
pub fn format_recall(hits: &[RecallHit]) -> Option<String> {
    if hits.is_empty() {
        return None;
    }
    let blocks: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, h)| {
            format!(
                "[{}] {} (line {}, score {}):\n{}",
                i + 1,
                h.source_path,
                h.line,
                h.score,
                h.content
            )
        })
        .collect();
    Some(blocks.join("\n\n"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Local implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedChunk {
    source_path: String,
    line: usize,
    text: String,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexSnapshot {
    model_id: String,
    dimensions: usize,
    built_at: DateTime<Utc>,
    chunks: Vec<IndexedChunk>,
}

pub struct LocalRecallIndex {
    store: MemoryStore,
    index_file: PathBuf,
    embeddings: Arc<EmbeddingService>,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    /// Serializes rebuilds; searches never take it.
    reindex_lock: tokio::sync::Mutex<()>,
}

impl LocalRecallIndex {
    pub fn new(store: MemoryStore, index_dir: &Path, embeddings: Arc<EmbeddingService>) -> Self {
        Self {
            store,
            index_file: index_dir.join(INDEX_FILE),
            embeddings,
            snapshot: RwLock::new(None),
            reindex_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    /// Number of chunks in the loaded snapshot (0 when nothing is loaded).
    pub fn chunk_count(&self) -> usize {
        self.snapshot
            .read()
            .as_ref()
            .map(|s| s.chunks.len())
            .unwrap_or(0)
    }

    /// Current snapshot, loading from disk or building on first use.
    async fn ensure_snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        // Fast path: already loaded.
        if let Some(snap) = self.snapshot.read().clone() {
            return Ok(snap);
        }

        // Slow path: try the persisted file, rebuild when absent or stale.
        let path = self.index_file.clone();
        let embeddings = self.embeddings.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            load_snapshot(&path, &embeddings.model_id(), embeddings.dimensions())
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?;

        if let Some(snap) = loaded {
            let snap = Arc::new(snap);
            *self.snapshot.write() = Some(snap.clone());
            return Ok(snap);
        }

        self.reindex().await?;
        self.snapshot
            .read()
            .clone()
            .ok_or_else(|| Error::Memory("recall index unavailable after rebuild".into()))
    }
}

#[async_trait]
impl RecallIndex for LocalRecallIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RecallHit>> {
        let query = query.trim();
        let k = k.min(MAX_TOP_K);
        if query.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let snapshot = self.ensure_snapshot().await?;
        let embeddings = self.embeddings.clone();
        let q = query.to_string();
        let hits = tokio::task::spawn_blocking(move || rank(&snapshot, &embeddings.embed(&q), k))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?;

        TraceEvent::RecallPerformed {
            query_chars: query.chars().count(),
            hits: hits.len(),
        }
        .emit();
        Ok(hits)
    }

    async fn reindex(&self) -> Result<usize> {
        let _guard = self.reindex_lock.lock().await;
        let started = Instant::now();

        let store = self.store.clone();
        let embeddings = self.embeddings.clone();
        let path = self.index_file.clone();
        let snapshot = tokio::task::spawn_blocking(move || -> Result<IndexSnapshot> {
            let snap = build_snapshot(&store, &embeddings)?;
            write_snapshot(&path, &snap)?;
            Ok(snap)
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        let chunks = snapshot.chunks.len();
        *self.snapshot.write() = Some(Arc::new(snapshot));

        TraceEvent::ReindexCompleted {
            chunks,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
        Ok(chunks)
    }
}

// ── Private helpers ───────────────────────────────────────────────

fn build_snapshot(store: &MemoryStore, embeddings: &EmbeddingService) -> Result<IndexSnapshot> {
    let mut chunks = Vec::new();
    for (rel, abs) in store.indexable_files()? {
        let content = match std::fs::read_to_string(&abs) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %abs.display(), error = %e, "skipping unreadable memory file");
                continue;
            }
        };
        for chunk in chunk_text(&content) {
            chunks.push(IndexedChunk {
                source_path: rel.clone(),
                line: chunk.start_line,
                vector: embeddings.embed(&chunk.text),
                text: chunk.text,
            });
        }
    }
    Ok(IndexSnapshot {
        model_id: embeddings.model_id(),
        dimensions: embeddings.dimensions(),
        built_at: Utc::now(),
        chunks,
    })
}

fn load_snapshot(path: &Path, model_id: &str, dimensions: usize) -> Option<IndexSnapshot> {
    let raw = std::fs::read(path).ok()?;
    match serde_json::from_slice::<IndexSnapshot>(&raw) {
        Ok(snap) if snap.model_id == model_id && snap.dimensions == dimensions => Some(snap),
        Ok(snap) => {
            tracing::info!(
                found = %snap.model_id,
                expected = model_id,
                "recall index built with a different embedder, rebuilding"
            );
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt recall index, rebuilding");
            None
        }
    }
}

fn write_snapshot(path: &Path, snap: &IndexSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec(snap)?;
    let tmp_path = path.with_file_name(format!(
        ".{INDEX_FILE}.{}.tmp",
        uuid::Uuid::new_v4().as_simple()
    ));
    std::fs::write(&tmp_path, bytes)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }
    Ok(())
}

fn rank(snapshot: &IndexSnapshot, query_vec: &[f32], k: usize) -> Vec<RecallHit> {
    let mut scored: Vec<(f32, &IndexedChunk)> = snapshot
        .chunks
        .iter()
        .map(|c| (cosine_similarity(query_vec, &c.vector), c))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .take(k)
        .map(|(sim, c)| RecallHit {
            content: truncate_snippet(&c.text),
            source_path: c.source_path.clone(),
            line: c.line,
            score: round3(similarity_score(sim)),
        })
        .collect()
}

/// Cosine distance `d = 1 - sim` mapped to `1 - d/2`, i.e. `[0, 1]`.
fn similarity_score(sim: f32) -> f32 {
    1.0 - (1.0 - sim) / 2.0
}

fn round3(x: f32) -> f32 {
    (x * 1000.0).round() / 1000.0
}

fn truncate_snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(SNIPPET_CHARS).collect();
    format!("{cut}...")
}
