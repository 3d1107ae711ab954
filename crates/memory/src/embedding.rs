//! Text embeddings for the recall index.
//!
//! The embedder sits behind [`Embedder`] so a model-backed implementation can
//! replace the built-in [`HashingEmbedder`]. [`EmbeddingService::shared`]
//! hands out one process-wide service per dimension count; the embedder
//! itself is constructed on first use.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Stable identifier stored alongside persisted vectors; a mismatch on
    /// load forces a rebuild.
    fn model_id(&self) -> String;

    fn embed(&self, text: &str) -> Vec<f32>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Feature-hashing embedder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deterministic bag-of-words embedder. Lowercased alphanumeric words and
/// CJK character bigrams are hashed into signed buckets, then L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_id(&self) -> String {
        format!("hashing-v1-{}", self.dims)
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dims;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        normalize(&mut v);
        v
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF | 0xF900..=0xFAFF)
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut cjk_run: Vec<char> = Vec::new();

    let flush_cjk = |run: &mut Vec<char>, tokens: &mut Vec<String>| {
        match run.len() {
            0 => {}
            1 => tokens.push(run[0].to_string()),
            _ => tokens.extend(run.windows(2).map(|w| w.iter().collect::<String>())),
        }
        run.clear();
    };

    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            cjk_run.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut tokens);
            word.extend(c.to_lowercase());
        } else {
            flush_cjk(&mut cjk_run, &mut tokens);
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
        }
    }
    flush_cjk(&mut cjk_run, &mut tokens);
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        tracing::warn!(
            len_a = a.len(),
            len_b = b.len(),
            "cosine_similarity: mismatched vector lengths, returning 0.0"
        );
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lazily constructed embedder shared across index instances.
pub struct EmbeddingService {
    dims: usize,
    embedder: OnceLock<Arc<dyn Embedder>>,
}

impl EmbeddingService {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            embedder: OnceLock::new(),
        }
    }

    /// Service backed by a caller-supplied embedder.
    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        let cell = OnceLock::new();
        let dims = embedder.dimensions();
        let _ = cell.set(embedder);
        Self { dims, embedder: cell }
    }

    /// Process-wide service for `dims`. Repeated calls return the same instance.
    pub fn shared(dims: usize) -> Arc<EmbeddingService> {
        static SERVICES: OnceLock<Mutex<HashMap<usize, Arc<EmbeddingService>>>> = OnceLock::new();
        let services = SERVICES.get_or_init(|| Mutex::new(HashMap::new()));
        services
            .lock()
            .entry(dims)
            .or_insert_with(|| Arc::new(EmbeddingService::new(dims)))
            .clone()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        self.embedder.get_or_init(|| {
            tracing::info!(dimensions = self.dims, "initializing embedder");
            Arc::new(HashingEmbedder::new(self.dims))
        })
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        self.embedder().embed(text)
    }

    pub fn model_id(&self) -> String {
        self.embedder().model_id()
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }
}
