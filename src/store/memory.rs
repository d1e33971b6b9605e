//! In-process store with realtime fan-out.
//!
//! Each scope is a `tokio::sync::watch` channel holding the current
//! [`Snapshot`]. Writes modify the snapshot in place and every subscriber sees
//! the new full state. Intermediate states may be skipped by slow subscribers,
//! which is fine for full-replace consumers.
//!
//! In persistent mode each write is also saved to `<dir>/<scope>.json`, and a
//! scope is loaded from disk the first time it is touched.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use super::snapshot_file::{load_snapshot, save_snapshot, scope_path};
use super::{CacheStore, SnapshotStream};
use crate::types::{Category, ProductEntry, ScopeId, Snapshot};
use crate::{AisleError, Result};

/// In-memory [`CacheStore`], optionally backed by JSON files.
///
/// Shared by every [`CategoryCache`](crate::CategoryCache) in the process
/// that should see the same data, typically through an `Arc`.
#[derive(Default)]
pub struct MemoryStore {
    scopes: Mutex<HashMap<ScopeId, watch::Sender<Snapshot>>>,
    persist_dir: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty, non-persistent store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that persists every scope under `dir`.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            scopes: Mutex::new(HashMap::new()),
            persist_dir: Some(dir.into()),
        }
    }

    /// Current snapshot of a scope (empty if the scope was never written).
    pub fn snapshot(&self, scope: &ScopeId) -> Result<Snapshot> {
        self.with_scope(scope, |tx| Ok(tx.borrow().clone()))
    }

    /// Run `f` against the channel of `scope`, creating (or loading) it first.
    fn with_scope<T>(
        &self,
        scope: &ScopeId,
        f: impl FnOnce(&watch::Sender<Snapshot>) -> Result<T>,
    ) -> Result<T> {
        let mut scopes = self
            .scopes
            .lock()
            .map_err(|_| AisleError::Store("memory store lock poisoned".to_string()))?;
        let tx = scopes.entry(scope.clone()).or_insert_with(|| {
            let initial = self
                .persist_dir
                .as_ref()
                .and_then(|dir| load_snapshot(&scope_path(dir, scope)))
                .unwrap_or_default();
            watch::Sender::new(initial)
        });
        f(tx)
    }

    fn persist(&self, scope: &ScopeId, snapshot: &Snapshot) -> Result<()> {
        if let Some(dir) = &self.persist_dir {
            save_snapshot(&scope_path(dir, scope), snapshot)?;
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, scope: &ScopeId, entry: &ProductEntry) -> Result<u64> {
        self.with_scope(scope, |tx| {
            tx.send_modify(|snap| {
                match snap.entries.iter_mut().find(|e| e.key == entry.key) {
                    Some(existing) => {
                        existing.display_name = entry.display_name.clone();
                        existing.category = entry.category;
                    }
                    None => snap.entries.push(entry.clone()),
                }
                snap.revision += 1;
            });
            let snap = tx.borrow().clone();
            debug!(%scope, key = %entry.key, revision = snap.revision, "upserted entry");
            self.persist(scope, &snap)?;
            Ok(snap.revision)
        })
    }

    async fn update_category(&self, scope: &ScopeId, id: &str, category: Category) -> Result<u64> {
        self.with_scope(scope, |tx| {
            let mut found = false;
            tx.send_if_modified(|snap| {
                match snap.entries.iter_mut().find(|e| e.id() == id) {
                    Some(existing) => {
                        existing.category = category;
                        snap.revision += 1;
                        found = true;
                        true
                    }
                    None => false,
                }
            });
            if !found {
                return Err(AisleError::EntryNotFound(id.to_string()));
            }
            let snap = tx.borrow().clone();
            debug!(%scope, id, %category, revision = snap.revision, "updated category");
            self.persist(scope, &snap)?;
            Ok(snap.revision)
        })
    }

    async fn subscribe(&self, scope: &ScopeId) -> Result<SnapshotStream> {
        let rx = self.with_scope(scope, |tx| Ok(tx.subscribe()))?;
        debug!(%scope, entries = rx.borrow().entries.len(), "subscribed to scope");
        Ok(Box::pin(WatchStream::new(rx)))
    }
}
