//! Local index and its reconciliation with remote snapshots.
//!
//! [`ProductIndex`] is the ordered, key-unique set of entries the cache
//! answers from. [`ScopeState`] wraps it with the attached scope and the
//! optimistic writes that have not yet shown up in a remote snapshot.
//!
//! # Pending writes
//!
//! Every local write gets a sequence number and a pending record. When the
//! store acknowledges it at revision `r`, the record is kept until a snapshot
//! with revision `>= r` arrives; until then each snapshot is applied with the
//! pending entries laid back on top, so a stale snapshot cannot undo a choice
//! the user just made. A failed write drops its record and the next snapshot
//! restores the remote value.

use std::collections::HashMap;

use tracing::debug;

use crate::normalize::{is_similar, normalize};
use crate::telemetry;
use crate::types::{Category, ProductEntry, ScopeId, Snapshot};

/// Minimum normalized input length for suggestions.
pub const MIN_SUGGEST_CHARS: usize = 2;

/// How a lookup found its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Fuzzy,
}

/// Key-unique entries in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ProductIndex {
    entries: Vec<ProductEntry>,
    positions: HashMap<String, usize>,
}

impl ProductIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from snapshot entries. A repeated key keeps the first position
    /// and the last value.
    pub fn from_entries(entries: impl IntoIterator<Item = ProductEntry>) -> Self {
        let mut index = Self::new();
        for entry in entries {
            index.replace(entry);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ProductEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&ProductEntry> {
        self.positions.get(key).map(|&i| &self.entries[i])
    }

    /// Exact key match first, then the first entry in insertion order whose
    /// key contains `key` or is contained in it.
    pub fn find_similar(&self, key: &str) -> Option<(&ProductEntry, MatchKind)> {
        if key.is_empty() {
            return None;
        }
        if let Some(entry) = self.get(key) {
            return Some((entry, MatchKind::Exact));
        }
        self.entries
            .iter()
            .find(|e| is_similar(&e.key, key))
            .map(|e| (e, MatchKind::Fuzzy))
    }

    /// Insert or overwrite by key. Overwriting keeps position and `added_at`.
    /// Returns the stored entry.
    pub fn upsert(&mut self, entry: ProductEntry) -> &ProductEntry {
        match self.positions.get(&entry.key).copied() {
            Some(i) => {
                let existing = &mut self.entries[i];
                existing.display_name = entry.display_name;
                existing.category = entry.category;
                &self.entries[i]
            }
            None => self.push(entry),
        }
    }

    /// Insert or replace wholesale, keeping position for a known key.
    fn replace(&mut self, entry: ProductEntry) {
        match self.positions.get(&entry.key).copied() {
            Some(i) => self.entries[i] = entry,
            None => {
                self.push(entry);
            }
        }
    }

    fn push(&mut self, entry: ProductEntry) -> &ProductEntry {
        let i = self.entries.len();
        self.positions.insert(entry.key.clone(), i);
        self.entries.push(entry);
        &self.entries[i]
    }

    /// Change the category of the entry with `id`. Returns the updated entry.
    pub fn set_category(&mut self, id: &str, category: Category) -> Option<&ProductEntry> {
        let i = *self.positions.get(id)?;
        self.entries[i].category = category;
        Some(&self.entries[i])
    }

    /// Display names containing `partial`, shortest first.
    ///
    /// Empty when the normalized input is shorter than
    /// [`MIN_SUGGEST_CHARS`]. Ties keep insertion order; duplicates are
    /// dropped.
    pub fn suggest(&self, partial: &str, limit: usize) -> Vec<String> {
        let needle = normalize(partial);
        if needle.chars().count() < MIN_SUGGEST_CHARS || limit == 0 {
            return Vec::new();
        }

        let mut matches: Vec<&str> = Vec::new();
        for entry in &self.entries {
            let name = entry.display_name.as_str();
            if normalize(name).contains(&needle) && !matches.contains(&name) {
                matches.push(name);
            }
        }
        // stable sort keeps insertion order among equal lengths
        matches.sort_by_key(|name| name.chars().count());
        matches
            .into_iter()
            .take(limit)
            .map(str::to_string)
            .collect()
    }
}

/// Result of offering a snapshot to the scope state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Applied,
    /// Older than what was already applied; ignored.
    Outdated,
    /// The listener belongs to a scope that is no longer attached.
    Detached,
}

#[derive(Debug)]
struct PendingWrite {
    seq: u64,
    entry: ProductEntry,
    /// Revision the store acknowledged the write at.
    applied_at: Option<u64>,
}

/// Attached scope, local index and outstanding optimistic writes.
#[derive(Debug, Default)]
pub struct ScopeState {
    scope: Option<ScopeId>,
    generation: u64,
    index: ProductIndex,
    pending: HashMap<String, PendingWrite>,
    /// Entries of the last applied snapshot.
    remote: Vec<ProductEntry>,
    last_revision: u64,
    next_seq: u64,
}

impl ScopeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> Option<&ScopeId> {
        self.scope.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> &ProductIndex {
        &self.index
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Switch to `scope` with an empty index. Returns the new generation.
    pub fn begin(&mut self, scope: ScopeId) -> u64 {
        self.reset();
        self.scope = Some(scope);
        self.generation
    }

    /// Leave the current scope and drop everything learned in it.
    pub fn detach(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.scope = None;
        self.index = ProductIndex::new();
        self.pending.clear();
        self.remote.clear();
        self.last_revision = 0;
    }

    /// Replace the index with `snapshot`, keeping unconfirmed local writes.
    pub fn apply_snapshot(&mut self, generation: u64, snapshot: Snapshot) -> SnapshotOutcome {
        if generation != self.generation {
            return SnapshotOutcome::Detached;
        }
        if snapshot.revision < self.last_revision {
            return SnapshotOutcome::Outdated;
        }

        let revision = snapshot.revision;
        self.last_revision = revision;
        self.remote = snapshot.entries;
        self.pending
            .retain(|_, p| !p.applied_at.is_some_and(|applied| revision >= applied));
        self.rebuild();

        metrics::counter!(telemetry::SNAPSHOTS_APPLIED_TOTAL).increment(1);
        debug!(
            revision,
            entries = self.index.len(),
            pending = self.pending.len(),
            "applied remote snapshot"
        );
        SnapshotOutcome::Applied
    }

    /// Last snapshot with the pending writes laid over it.
    fn rebuild(&mut self) {
        self.index = ProductIndex::from_entries(self.remote.iter().cloned());
        for pending in self.pending.values() {
            self.index.upsert(pending.entry.clone());
        }
    }

    /// Optimistically upsert `entry`. Returns the write's sequence number
    /// when a scope is attached (and the write will go remote).
    pub fn record_upsert(&mut self, entry: ProductEntry) -> Option<u64> {
        let stored = self.index.upsert(entry).clone();
        self.track(stored)
    }

    /// Optimistically recategorize a known entry.
    pub fn record_category(&mut self, id: &str, category: Category) -> Option<u64> {
        let stored = self.index.set_category(id, category)?.clone();
        self.track(stored)
    }

    fn track(&mut self, entry: ProductEntry) -> Option<u64> {
        self.scope.as_ref()?;
        self.next_seq += 1;
        let seq = self.next_seq;
        self.pending.insert(
            entry.key.clone(),
            PendingWrite {
                seq,
                entry,
                applied_at: None,
            },
        );
        Some(seq)
    }

    /// The store accepted write `seq` at `revision`.
    ///
    /// If a snapshot at or past `revision` was already applied, it holds the
    /// authoritative value for `key`, so the local overlay is dropped.
    pub fn ack(&mut self, key: &str, seq: u64, revision: u64) {
        if !self.pending.get(key).is_some_and(|p| p.seq == seq) {
            return;
        }
        if self.last_revision >= revision {
            self.pending.remove(key);
            self.rebuild();
        } else if let Some(pending) = self.pending.get_mut(key) {
            pending.applied_at = Some(revision);
        }
    }

    /// The store rejected write `seq`; let the next snapshot decide.
    pub fn fail(&mut self, key: &str, seq: u64) {
        if self.pending.get(key).is_some_and(|p| p.seq == seq) {
            self.pending.remove(key);
        }
    }
}
