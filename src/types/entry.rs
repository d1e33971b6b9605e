//! Cache entries, scopes and snapshots.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::Category;
use crate::normalize::normalize;

/// One remembered item name and the category last assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEntry {
    /// Normalized name, unique within a scope. Also the remote entry id.
    pub key: String,
    /// Name as the user typed it (trimmed, casing preserved).
    pub display_name: String,
    pub category: Category,
    /// Milliseconds since the Unix epoch when the entry was written.
    pub added_at: u64,
}

impl ProductEntry {
    /// Build an entry for `name`, deriving its key and stamping the current time.
    pub fn new(name: &str, category: Category) -> Self {
        Self {
            key: normalize(name),
            display_name: name.trim().to_string(),
            category,
            added_at: now_millis(),
        }
    }

    /// Identifier used by the store for `update_category`.
    pub fn id(&self) -> &str {
        &self.key
    }
}

/// Namespace of one cache: the id of the shopping list it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ScopeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Full content of a scope as published by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Store revision this snapshot reflects. Increases with every write.
    pub revision: u64,
    /// Entries in insertion order.
    pub entries: Vec<ProductEntry>,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
