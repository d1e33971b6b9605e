//! On-disk scope snapshots.
//!
//! Used by [`MemoryStore`](super::MemoryStore) in persistent mode so cache
//! contents survive between runs. One JSON file per scope.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{ProductEntry, ScopeId, Snapshot};
use crate::{AisleError, Result};

/// Maximum supported file format version.
const MAX_SUPPORTED_VERSION: u32 = 1;

/// Versioned on-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// Format version (currently 1).
    pub version: u32,
    pub revision: u64,
    pub entries: Vec<ProductEntry>,
}

/// Accept both the versioned format and a bare array of entries.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Versioned(SnapshotFile),
    Bare(Vec<ProductEntry>),
}

/// Parse a snapshot file body.
///
/// Returns an error if the version is unsupported.
fn parse_payload(json: &str) -> Result<Snapshot> {
    let payload: RawPayload = serde_json::from_str(json).map_err(|e| {
        AisleError::Store(format!("failed to parse snapshot JSON: {e}"))
    })?;
    match payload {
        RawPayload::Versioned(file) => {
            if file.version > MAX_SUPPORTED_VERSION {
                return Err(AisleError::Store(format!(
                    "unsupported snapshot version {} (max supported: {MAX_SUPPORTED_VERSION})",
                    file.version
                )));
            }
            Ok(Snapshot {
                revision: file.revision,
                entries: file.entries,
            })
        }
        RawPayload::Bare(entries) => Ok(Snapshot {
            revision: 0,
            entries,
        }),
    }
}

/// File holding the snapshot of `scope` inside `dir`.
///
/// Bytes outside `[A-Za-z0-9_-]` are written as `%XX`, so distinct scope ids
/// always get distinct file names. The fixed prefix keeps the empty id a
/// regular file.
pub fn scope_path(dir: &Path, scope: &ScopeId) -> PathBuf {
    let mut file = String::from("scope-");
    for byte in scope.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            file.push(char::from(byte));
        } else {
            file.push_str(&format!("%{byte:02X}"));
        }
    }
    file.push_str(".json");
    dir.join(file)
}

/// Load a snapshot from disk.
///
/// Returns `None` on missing or corrupt file (logs a warning on corrupt).
pub fn load_snapshot(path: &Path) -> Option<Snapshot> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read snapshot file");
            return None;
        }
    };
    match parse_payload(&content) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt snapshot file");
            None
        }
    }
}

/// Save a snapshot to disk (atomic write via tmp + rename).
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AisleError::Store(format!(
                "failed to create snapshot dir {}: {e}",
                parent.display()
            ))
        })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let file = SnapshotFile {
        version: 1,
        revision: snapshot.revision,
        entries: snapshot.entries.clone(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(&tmp_path, &json).map_err(|e| {
        AisleError::Store(format!(
            "failed to write snapshot file {}: {e}",
            tmp_path.display()
        ))
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        AisleError::Store(format!(
            "failed to rename snapshot file {} → {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            revision: 4,
            entries: vec![
                ProductEntry::new("Milk", Category::Dairy),
                ProductEntry::new("Bread", Category::Bakery),
            ],
        }
    }

    #[test]
    fn save_and_load_keeps_revision_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.json");

        save_snapshot(&path, &sample_snapshot()).unwrap();
        let loaded = load_snapshot(&path).unwrap();

        assert_eq!(loaded.revision, 4);
        assert_eq!(loaded.entries[0].key, "milk");
        assert_eq!(loaded.entries[1].key, "bread");
    }

    #[test]
    fn bare_array_loads_at_revision_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.json");
        let json = serde_json::to_string(&sample_snapshot().entries).unwrap();
        std::fs::write(&path, json).unwrap();

        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded.revision, 0);
        assert_eq!(loaded.entries.len(), 2);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let err = parse_payload(r#"{"version": 9, "revision": 0, "entries": []}"#).unwrap_err();
        assert!(err.to_string().contains("unsupported snapshot version"));
    }

    #[test]
    fn missing_and_corrupt_files_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_snapshot(&dir.path().join("missing.json")).is_none());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{{ nope").unwrap();
        assert!(load_snapshot(&corrupt).is_none());
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("list.json");
        save_snapshot(&path, &Snapshot::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn scope_path_escapes_ids() {
        let path = scope_path(Path::new("/data"), &ScopeId::from("lists/abc 1"));
        assert_eq!(path, PathBuf::from("/data/scope-lists%2Fabc%201.json"));
    }

    #[test]
    fn scope_path_is_distinct_per_id() {
        let dir = Path::new("/data");
        let ids = ["a/b", "a b", "a_b", "a%2Fb", "", "..", "חלב"];
        let paths: std::collections::HashSet<PathBuf> = ids
            .iter()
            .map(|id| scope_path(dir, &ScopeId::from(*id)))
            .collect();
        assert_eq!(paths.len(), ids.len());
        assert_eq!(
            scope_path(dir, &ScopeId::from("")),
            PathBuf::from("/data/scope-.json")
        );
    }
}
