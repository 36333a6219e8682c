// 🗄️ List Store - durable ordered collection of entries
//
// Whole-list semantics: every save replaces the backing resource. There is no partial
// update. Concurrent writers are detected with a content version (SHA-256 over the
// persisted lines) and a compare-and-swap write, see `ListStore::save_if_current`.

pub mod file;
pub mod memory;
pub mod sheet;
pub mod sqlite;
pub mod table;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{self, EncodeError};
use crate::entry::{Entry, Owner};

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use sheet::SheetBackend;
pub use sqlite::SqliteBackend;
pub use table::TableBackend;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing resource could not be read (recovered by `load` as an empty list)
    #[error("{backend} could not be read: {reason}")]
    Unavailable { backend: String, reason: String },

    /// The backing resource refused the write; nothing was committed
    #[error("{backend} rejected the write: {reason}")]
    WriteRejected { backend: String, reason: String },

    /// The persisted list changed since it was loaded
    #[error("the list was changed elsewhere since it was loaded")]
    Conflict,

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Errors of the pure list helpers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListError {
    #[error("item name must not be empty")]
    EmptyName,

    #[error("no item at position {index} (the list has {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

// ============================================================================
// VERSION
// ============================================================================

/// Content version of the persisted list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListVersion(String);

impl ListVersion {
    /// Hash the raw persisted lines, in order
    pub fn of_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut hasher = Sha256::new();
        for line in lines {
            hasher.update(line.as_ref().as_bytes());
            hasher.update(b"\n");
        }
        ListVersion(format!("{:x}", hasher.finalize()))
    }

    /// Version of a list that could not be read; never matches a real version
    pub fn unknown() -> Self {
        ListVersion(String::new())
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ListVersion {
    fn from(value: String) -> Self {
        ListVersion(value)
    }
}

impl fmt::Display for ListVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// BACKEND
// ============================================================================

/// A persistence collaborator holding the encoded list, one string per entry
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable name used in logs and error messages
    fn describe(&self) -> String;

    /// Read every persisted line. `None` when the resource does not exist.
    async fn read(&self) -> Result<Option<Vec<String>>, StoreError>;

    /// Replace the whole resource with `lines`
    async fn write(&self, lines: &[String]) -> Result<(), StoreError>;

    /// Replace the resource only if it still hashes to `expected`
    async fn write_if(&self, expected: &ListVersion, lines: &[String]) -> Result<(), StoreError> {
        let current = self
            .read()
            .await
            .map_err(|e| StoreError::WriteRejected {
                backend: self.describe(),
                reason: format!("current contents could not be verified: {}", e),
            })?
            .unwrap_or_default();

        if &ListVersion::of_lines(&current) != expected {
            return Err(StoreError::Conflict);
        }

        self.write(lines).await
    }
}

// ============================================================================
// LIST STORE
// ============================================================================

/// Entries as loaded, with the version they were loaded at
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub entries: Vec<Entry>,
    pub version: ListVersion,
    /// The read failed and `entries` is an empty stand-in
    pub degraded: bool,
}

#[derive(Clone)]
pub struct ListStore {
    backend: Arc<dyn Backend>,
}

impl ListStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        ListStore { backend }
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Load all entries. Never fails: a missing or unreadable resource is an empty list.
    pub async fn load(&self) -> Vec<Entry> {
        self.snapshot().await.entries
    }

    /// Load all entries together with their version
    pub async fn snapshot(&self) -> Snapshot {
        match self.backend.read().await {
            Ok(Some(lines)) => {
                let entries = codec::decode_all(&lines);
                debug!(
                    backend = %self.backend.describe(),
                    lines = lines.len(),
                    entries = entries.len(),
                    "Loaded shopping list"
                );
                Snapshot {
                    entries,
                    version: ListVersion::of_lines(&lines),
                    degraded: false,
                }
            }
            Ok(None) => {
                debug!(backend = %self.backend.describe(), "Backing resource missing, starting empty");
                Snapshot {
                    entries: Vec::new(),
                    version: ListVersion::of_lines::<String>(&[]),
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "Shopping list unavailable, showing an empty list");
                Snapshot {
                    entries: Vec::new(),
                    version: ListVersion::unknown(),
                    degraded: true,
                }
            }
        }
    }

    /// Replace the persisted list with `entries`
    pub async fn save(&self, entries: &[Entry]) -> Result<ListVersion, StoreError> {
        let lines = codec::encode_all(entries)?;
        self.backend.write(&lines).await?;

        info!(backend = %self.backend.describe(), entries = lines.len(), "Saved shopping list");
        Ok(ListVersion::of_lines(&lines))
    }

    /// Replace the persisted list only if nobody changed it since `expected` was read
    pub async fn save_if_current(
        &self,
        expected: &ListVersion,
        entries: &[Entry],
    ) -> Result<ListVersion, StoreError> {
        let lines = codec::encode_all(entries)?;

        if expected.is_unknown() {
            return Err(StoreError::WriteRejected {
                backend: self.backend.describe(),
                reason: "the list could not be read, reload it before changing it".to_string(),
            });
        }
        self.backend.write_if(expected, &lines).await?;

        info!(backend = %self.backend.describe(), entries = lines.len(), "Saved shopping list");
        Ok(ListVersion::of_lines(&lines))
    }
}

// ============================================================================
// PURE LIST HELPERS
// ============================================================================

/// A new list with one more entry at the end
pub fn append(entries: &[Entry], owner: Owner, name: &str) -> Result<Vec<Entry>, ListError> {
    let entry = Entry::new(owner, name)?;
    let mut next = entries.to_vec();
    next.push(entry);
    Ok(next)
}

/// A new list without the entry at `index`
pub fn remove_at(entries: &[Entry], index: usize) -> Result<Vec<Entry>, ListError> {
    if index >= entries.len() {
        return Err(ListError::IndexOutOfRange {
            index,
            len: entries.len(),
        });
    }

    let mut next = entries.to_vec();
    next.remove(index);
    Ok(next)
}

/// The empty list
pub fn clear() -> Vec<Entry> {
    Vec::new()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn member(label: &str) -> Owner {
        Owner::Member(label.to_string())
    }

    fn memory_store() -> (Arc<MemoryBackend>, ListStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = ListStore::new(backend.clone());
        (backend, store)
    }

    #[test]
    fn test_append_does_not_touch_input() {
        let entries = append(&[], member("아빠"), "우유").unwrap();
        let next = append(&entries, member("엄마"), "우유").unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(next.len(), 2);
        // Duplicates are kept
        assert_eq!(next[0].name, next[1].name);
    }

    #[test]
    fn test_append_rejects_blank_name() {
        assert_eq!(append(&[], Owner::Default, "  "), Err(ListError::EmptyName));
    }

    #[test]
    fn test_remove_at() {
        let entries = append(&[], member("아빠"), "우유").unwrap();
        let entries = append(&entries, Owner::Default, "사과").unwrap();

        let next = remove_at(&entries, 0).unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].name, "사과");
    }

    #[test]
    fn test_remove_at_out_of_range() {
        let entries = append(&[], member("아빠"), "우유").unwrap();
        assert_eq!(
            remove_at(&entries, 1),
            Err(ListError::IndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn test_version_depends_on_order() {
        let a = ListVersion::of_lines(&["우유", "사과"]);
        let b = ListVersion::of_lines(&["사과", "우유"]);
        assert_ne!(a, b);
        assert_eq!(a, ListVersion::of_lines(&["우유".to_string(), "사과".to_string()]));
    }

    #[tokio::test]
    async fn test_load_missing_resource_is_empty() {
        let (_, store) = memory_store();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_drops_blank_lines() {
        let backend = Arc::new(MemoryBackend::with_lines(vec![
            "아빠:우유".to_string(),
            "   ".to_string(),
            "사과".to_string(),
        ]));
        let store = ListStore::new(backend);

        let entries = store.load().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], Entry::new(Owner::Default, "사과").unwrap());
    }

    #[tokio::test]
    async fn test_load_read_failure_is_empty_and_degraded() {
        let (backend, store) = memory_store();
        backend.set_fail_reads(true);

        let snapshot = store.snapshot().await;
        assert!(snapshot.entries.is_empty());
        assert!(snapshot.degraded);
        assert!(snapshot.version.is_unknown());
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let (_, store) = memory_store();
        let entries = append(&[], member("큰아들"), "우유").unwrap();
        let entries = append(&entries, Owner::Default, "쌀: 10kg").unwrap();
        let entries = append(&entries, member("엄마"), "우유").unwrap();

        store.save(&entries).await.unwrap();
        assert_eq!(store.load().await, entries);
    }

    #[tokio::test]
    async fn test_save_is_full_replace() {
        let (backend, store) = memory_store();
        let entries = append(&[], member("아빠"), "우유").unwrap();
        store.save(&entries).await.unwrap();
        store.save(&clear()).await.unwrap();

        assert_eq!(backend.lines(), Some(Vec::<String>::new()));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_with_newline_writes_nothing() {
        let (backend, store) = memory_store();
        let bad = vec![Entry {
            owner: Owner::Default,
            name: "우유\n사과".to_string(),
        }];

        assert!(matches!(store.save(&bad).await, Err(StoreError::Encode(_))));
        assert_eq!(backend.lines(), None);
    }

    #[tokio::test]
    async fn test_save_rejected() {
        let (backend, store) = memory_store();
        backend.set_reject_writes(true);

        let entries = append(&[], member("아빠"), "우유").unwrap();
        let result = store.save(&entries).await;
        assert!(matches!(result, Err(StoreError::WriteRejected { .. })));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_if_current_detects_concurrent_write() {
        let (_, store) = memory_store();
        let loaded = store.snapshot().await;

        // Another writer saves first
        let other = append(&[], member("엄마"), "두부").unwrap();
        store.save(&other).await.unwrap();

        let mine = append(&loaded.entries, member("아빠"), "우유").unwrap();
        let result = store.save_if_current(&loaded.version, &mine).await;
        assert!(matches!(result, Err(StoreError::Conflict)));
        assert_eq!(store.load().await, other);
    }

    #[tokio::test]
    async fn test_save_if_current_returns_new_version() {
        let (_, store) = memory_store();
        let loaded = store.snapshot().await;

        let next = append(&loaded.entries, member("아빠"), "우유").unwrap();
        let version = store.save_if_current(&loaded.version, &next).await.unwrap();

        assert_eq!(store.snapshot().await.version, version);
    }

    #[tokio::test]
    async fn test_degraded_snapshot_cannot_overwrite() {
        let (backend, store) = memory_store();
        store.save(&append(&[], member("아빠"), "우유").unwrap()).await.unwrap();

        backend.set_fail_reads(true);
        let snapshot = store.snapshot().await;
        backend.set_fail_reads(false);

        let result = store.save_if_current(&snapshot.version, &clear()).await;
        match result {
            Err(StoreError::WriteRejected { reason, .. }) => {
                assert!(reason.contains("could not be read"));
            }
            other => panic!("expected WriteRejected, got {:?}", other),
        }
        assert_eq!(store.load().await.len(), 1);
    }
}
