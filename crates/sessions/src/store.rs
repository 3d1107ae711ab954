//! Durable session store.
//!
//! [`FileSessionStore`] keeps one JSON document per session under the
//! configured state directory, fronted by a bounded write-through cache.
//! When the cache is full the least recently updated session is dropped
//! from memory; its file is untouched and it reloads on next use. Writes go
//! to a temp sibling and are renamed into place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use mn_domain::error::{Error, Result};
use mn_domain::trace::TraceEvent;

use crate::session::Session;

/// Sessions kept in memory before the least recently updated is evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable key → [`Session`] mapping.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session for `key`, creating an empty one on first reference.
    async fn get_or_create(&self, key: &str) -> Result<Session>;

    /// Persist the full session state.
    async fn save(&self, session: &Session) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File-backed implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FileSessionStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Session>>,
    capacity: usize,
}

impl FileSessionStore {
    /// Open (and create if needed) the session directory.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::Io)?;
        tracing::info!(path = %dir.display(), "session store opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            cache: RwLock::new(HashMap::new()),
            capacity: DEFAULT_CACHE_CAPACITY,
        })
    }

    /// Override the cache bound (minimum 1).
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// On-disk location for a session key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name_for(key))
    }

    /// Number of sessions currently held in the cache.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    fn remember(&self, session: &Session) {
        let mut cache = self.cache.write();
        cache.insert(session.key.clone(), session.clone());
        while cache.len() > self.capacity {
            let oldest = cache
                .iter()
                .filter(|(k, _)| **k != session.key)
                .min_by_key(|(_, s)| s.updated_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    cache.remove(&k);
                    tracing::debug!(session_key = %k, "session evicted from cache");
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get_or_create(&self, key: &str) -> Result<Session> {
        // Fast path: cached.
        let cached = self.cache.read().get(key).cloned();
        if let Some(session) = cached {
            TraceEvent::SessionResolved {
                session_key: key.to_owned(),
                is_new: false,
            }
            .emit();
            return Ok(session);
        }

        // Slow path: load from disk on a blocking thread.
        let path = self.path_for(key);
        let loaded = tokio::task::spawn_blocking(move || read_session_file(&path))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        let (session, is_new) = match loaded {
            Some(session) if session.key == key => (session, false),
            Some(other) => {
                tracing::warn!(
                    session_key = key,
                    found_key = %other.key,
                    "session file key mismatch, starting fresh"
                );
                (Session::new(key), true)
            }
            None => (Session::new(key), true),
        };

        self.remember(&session);

        TraceEvent::SessionResolved {
            session_key: key.to_owned(),
            is_new,
        }
        .emit();

        Ok(session)
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| Error::Session(format!("serializing {}: {e}", session.key)))?;
        let path = self.path_for(&session.key);

        // Write to disk first; only update the cache if I/O succeeds.
        tokio::task::spawn_blocking(move || write_atomic(&path, json.as_bytes()))
            .await
            .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        self.remember(session);
        Ok(())
    }
}

// ── Private helpers ───────────────────────────────────────────────

/// Filesystem-safe name: sanitized key plus a short digest so distinct keys
/// that sanitize identically never collide.
fn file_name_for(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(64)
        .collect();
    let digest = Sha256::digest(key.as_bytes());
    format!("{safe}.{}.json", &hex::encode(digest)[..12])
}

/// Returns `Ok(None)` when the file is missing or unreadable as a session.
fn read_session_file(path: &Path) -> Result<Option<Session>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };
    match serde_json::from_str(&raw) {
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "corrupt session file, starting fresh"
            );
            Ok(None)
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        uuid::Uuid::new_v4().as_simple()
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, bytes).map_err(Error::Io)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }
    Ok(())
}
