//! Collaborator interfaces.
//!
//! The core never touches a filesystem or a terminal directly. Storage goes
//! through [`RecordStore`], interactive review through [`ChangePresenter`].
//! [`MemoryStore`] is an in-process store for tests and dry runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::defaults::NOTE_EXTENSION;
use crate::error::{Error, Result};
use crate::frontmatter::split_document;
use crate::models::{ChangeSet, MasterRecord, Selection};

// =============================================================================
// RECORD STORE
// =============================================================================

/// Text storage addressed by `/`-separated locators such as `NEW/Foo.md`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether a record exists at `locator`.
    async fn exists(&self, locator: &str) -> Result<bool>;

    /// Read the full text at `locator`. Missing records are `Error::NotFound`.
    async fn read(&self, locator: &str) -> Result<String>;

    /// Write (create or overwrite) the full text at `locator`.
    async fn write(&self, locator: &str, text: &str) -> Result<()>;

    /// Every record locator in the store, sorted.
    async fn list(&self) -> Result<Vec<String>>;

    /// Move a record. Fails with `Error::AlreadyExists` when `to` is taken.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Find the note whose `post_id` equals `post_id` (trimmed).
    ///
    /// Unreadable or unparsable notes are skipped.
    async fn find_by_external_id(&self, post_id: &str) -> Result<Option<String>> {
        let wanted = post_id.trim();
        if wanted.is_empty() {
            return Ok(None);
        }
        for locator in self.list().await? {
            if let Some(record) = read_record(self, &locator).await {
                if record.post_id == wanted {
                    return Ok(Some(locator));
                }
            }
        }
        Ok(None)
    }
}

/// Read and normalize one stored note, `None` when it cannot be used.
///
/// Failures are logged at WARN and skipped; scans over a vault must not stop
/// on one broken note.
pub async fn read_record<S>(store: &S, locator: &str) -> Option<MasterRecord>
where
    S: RecordStore + ?Sized,
{
    if !locator.to_lowercase().ends_with(NOTE_EXTENSION) {
        return None;
    }
    let text = match store.read(locator).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(locator, error = %e, "Skipping unreadable record");
            return None;
        }
    };
    match split_document(&text).record() {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(locator, error = %e, "Skipping record with malformed frontmatter");
            None
        }
    }
}

// =============================================================================
// CHANGE PRESENTER
// =============================================================================

/// Lets a person review a change set.
#[async_trait]
pub trait ChangePresenter: Send + Sync {
    /// Return the accepted selection, or `None` when the review is cancelled.
    async fn present(&self, change_set: &ChangeSet) -> Option<Selection>;
}

/// Presenter that accepts the default selection unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptDefaults;

#[async_trait]
impl ChangePresenter for AcceptDefaults {
    async fn present(&self, change_set: &ChangeSet) -> Option<Selection> {
        Some(Selection::defaults(change_set))
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// [`RecordStore`] backed by a sorted map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-filled with `(locator, text)` pairs.
    pub fn with_records<I, K, V>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Snapshot of every stored record.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn exists(&self, locator: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(locator))
    }

    async fn read(&self, locator: &str) -> Result<String> {
        self.records
            .read()
            .await
            .get(locator)
            .cloned()
            .ok_or_else(|| Error::NotFound(locator.to_string()))
    }

    async fn write(&self, locator: &str, text: &str) -> Result<()> {
        self.records
            .write()
            .await
            .insert(locator.to_string(), text.to_string());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(to) {
            return Err(Error::AlreadyExists(to.to_string()));
        }
        let text = records
            .remove(from)
            .ok_or_else(|| Error::NotFound(from.to_string()))?;
        records.insert(to.to_string(), text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_crud() {
        let store = MemoryStore::new();
        assert!(!store.exists("a.md").await.unwrap());
        store.write("a.md", "hello").await.unwrap();
        assert!(store.exists("a.md").await.unwrap());
        assert_eq!(store.read("a.md").await.unwrap(), "hello");
        assert!(matches!(
            store.read("b.md").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_memory_store_rename() {
        let store = MemoryStore::with_records([("a.md", "A"), ("b.md", "B")]);
        assert!(matches!(
            store.rename("a.md", "b.md").await.unwrap_err(),
            Error::AlreadyExists(_)
        ));
        store.rename("a.md", "c.md").await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["b.md", "c.md"]);
    }

    #[tokio::test]
    async fn test_find_by_external_id_skips_broken_notes() {
        let store = MemoryStore::with_records([
            ("a.md", "---\npost_id: [unclosed\n---\n"),
            ("b.txt", "---\npost_id: 42\n---\n"),
            ("c.md", "no frontmatter"),
            ("d.md", "---\npost_id: 42\n---\nbody"),
        ]);
        assert_eq!(
            store.find_by_external_id(" 42 ").await.unwrap().as_deref(),
            Some("d.md")
        );
        assert_eq!(store.find_by_external_id("7").await.unwrap(), None);
        assert_eq!(store.find_by_external_id("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_accept_defaults_presenter() {
        let cs = ChangeSet::default();
        let selection = AcceptDefaults.present(&cs).await.unwrap();
        assert!(selection.is_empty());
    }
}
