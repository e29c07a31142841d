//! JSON file content store.
//!
//! Wraps an [`InMemoryContentStore`] and persists its saved state to a
//! single JSON document. The document is loaded on open and rewritten
//! atomically (temp file plus rename) on every [`ContentStore::flush`].

use super::memory::{InMemoryContentStore, StoreSnapshot};
use super::traits::ContentStore;
use crate::models::{EntityId, FieldConfig, FieldValue};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Content store persisted to a JSON file.
#[derive(Debug)]
pub struct JsonFileContentStore {
    path: PathBuf,
    inner: InMemoryContentStore,
}

impl JsonFileContentStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| Error::OperationFailed {
                operation: "read_store_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;
            let snapshot: StoreSnapshot =
                serde_json::from_str(&raw).map_err(|e| Error::OperationFailed {
                    operation: "parse_store_file".to_string(),
                    cause: format!("{}: {e}", path.display()),
                })?;
            InMemoryContentStore::from_snapshot(snapshot)
        } else {
            InMemoryContentStore::new()
        };
        tracing::debug!(path = %path.display(), entities = inner.entity_count(), "Opened store");
        Ok(Self { path, inner })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory view of the store.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryContentStore {
        &self.inner
    }

    /// Defines a field of a kind.
    pub fn define_field(&self, kind: &str, config: FieldConfig) {
        self.inner.define_field(kind, config);
    }
}

impl ContentStore for JsonFileContentStore {
    fn find_one(&self, selector: &str) -> Result<Option<EntityId>> {
        self.inner.find_one(selector)
    }

    fn find_many(&self, selector: &str) -> Result<Vec<EntityId>> {
        self.inner.find_many(selector)
    }

    fn create_entity(&self, parent: EntityId, kind: &str) -> Result<EntityId> {
        self.inner.create_entity(parent, kind)
    }

    fn get_field(&self, entity: EntityId, name: &str) -> Result<Option<FieldValue>> {
        self.inner.get_field(entity, name)
    }

    fn set_field(&self, entity: EntityId, name: &str, value: FieldValue) -> Result<()> {
        self.inner.set_field(entity, name, value)
    }

    fn save(&self, entity: EntityId) -> Result<()> {
        self.inner.save(entity)
    }

    fn delete(&self, entity: EntityId, recursive: bool) -> Result<()> {
        self.inner.delete(entity, recursive)
    }

    fn field_config(&self, kind: &str, name: &str) -> Result<Option<FieldConfig>> {
        self.inner.field_config(kind, name)
    }

    fn flush(&self) -> Result<()> {
        let snapshot = self.inner.snapshot()?;
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| Error::OperationFailed {
            operation: "serialize_store".to_string(),
            cause: e.to_string(),
        })?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| Error::OperationFailed {
                operation: "create_store_dir".to_string(),
                cause: e.to_string(),
            })?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| Error::OperationFailed {
            operation: "write_store_file".to_string(),
            cause: e.to_string(),
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::OperationFailed {
            operation: "rename_store_file".to_string(),
            cause: e.to_string(),
        })?;
        metrics::counter!("dataset_store_flushes_total").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flush_and_reopen() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileContentStore::open(&path).expect("open");
        let id = store
            .inner()
            .insert_entity(store.inner().root(), "basic-page", &[("title", "Alice")])
            .expect("insert");
        store.flush().expect("flush");

        let reopened = JsonFileContentStore::open(&path).expect("reopen");
        assert_eq!(reopened.find_one("title=Alice").expect("find"), Some(id));
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn test_unflushed_changes_are_lost() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("store.json");

        let store = JsonFileContentStore::open(&path).expect("open");
        store
            .inner()
            .insert_entity(store.inner().root(), "basic-page", &[("title", "Bob")])
            .expect("insert");
        drop(store);

        let reopened = JsonFileContentStore::open(&path).expect("reopen");
        assert_eq!(reopened.count("title=Bob").expect("count"), 0);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").expect("write");
        assert!(JsonFileContentStore::open(&path).is_err());
    }
}
