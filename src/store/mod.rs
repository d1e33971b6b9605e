//! Shared-store boundary.
//!
//! A [`CacheStore`] holds one namespace of [`ProductEntry`] values per scope
//! and pushes the full content of a scope to subscribers after every change.
//! Transport (REST, realtime socket, vendor SDK) is up to the implementation.
//!
//! # Revisions
//!
//! Every write bumps a per-scope revision and returns it. Snapshots carry the
//! revision they reflect, which lets the cache tell a stale snapshot from one
//! that already contains its own write.

pub mod memory;
pub mod snapshot_file;

pub use memory::MemoryStore;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::Result;
use crate::types::{Category, ProductEntry, ScopeId, Snapshot};

/// Stream of full-scope snapshots. The first item is the current state.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Snapshot> + Send>>;

/// Remote, multi-writer store of cache entries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store name for logging/debugging.
    fn name(&self) -> &str;

    /// Insert or overwrite the entry with `entry.key`.
    ///
    /// Overwriting keeps the original `added_at`. Returns the revision the
    /// write was applied at.
    async fn upsert(&self, scope: &ScopeId, entry: &ProductEntry) -> Result<u64>;

    /// Change the category of an existing entry.
    ///
    /// Returns `EntryNotFound` if `id` is unknown in the scope.
    async fn update_category(&self, scope: &ScopeId, id: &str, category: Category) -> Result<u64>;

    /// Subscribe to full snapshots of a scope. Dropping the stream
    /// unsubscribes.
    async fn subscribe(&self, scope: &ScopeId) -> Result<SnapshotStream>;
}
