use crate::errors::{Error, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[cfg(feature = "file")]
pub mod file;

/// Byte-level key/value persistence with namespace isolation.
///
/// Implementations are externally synchronized: each single-key operation is
/// atomic on the backend side, but no atomicity is guaranteed across the
/// delete-then-save replace sequence issued by the cached property layer.
pub trait StorageAdapter: Send + Sync {
    /// Load the bytes stored under `key`, failing with
    /// [`Error::ItemNotFound`] when absent.
    fn load(&self, key: &str) -> Result<Vec<u8>>;

    /// Enumerate every `(key, bytes)` pair in the adapter's namespace.
    fn load_all(&self) -> Result<Vec<(String, Vec<u8>)>>;

    /// Persist bytes under `key`, replacing any existing value.
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove the entry under `key`, failing with [`Error::ItemNotFound`]
    /// when absent.
    fn delete(&self, key: &str) -> Result<()>;

    /// Remove every entry in the adapter's namespace.
    fn delete_all(&self) -> Result<()>;
}

impl<T> StorageAdapter for Box<T>
where
    T: StorageAdapter + ?Sized,
{
    fn load(&self, key: &str) -> Result<Vec<u8>> {
        (**self).load(key)
    }

    fn load_all(&self) -> Result<Vec<(String, Vec<u8>)>> {
        (**self).load_all()
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).save(key, bytes)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn delete_all(&self) -> Result<()> {
        (**self).delete_all()
    }
}

impl<T> StorageAdapter for Arc<T>
where
    T: StorageAdapter + ?Sized,
{
    fn load(&self, key: &str) -> Result<Vec<u8>> {
        (**self).load(key)
    }

    fn load_all(&self) -> Result<Vec<(String, Vec<u8>)>> {
        (**self).load_all()
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).save(key, bytes)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn delete_all(&self) -> Result<()> {
        (**self).delete_all()
    }
}

/// In-memory adapter suitable for embedded usage and tests.
///
/// Clones share state; [`MemoryAdapter::with_namespace`] returns a view over
/// the same store scoped to a key prefix.
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    state: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    namespace: Option<String>,
}

impl MemoryAdapter {
    /// Construct a new empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope this adapter (sharing the underlying store) to a namespace.
    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        Self {
            state: self.state,
            namespace: Some(namespace.into()),
        }
    }

    fn full_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}/{key}"),
            None => key.to_string(),
        }
    }

    fn strip(&self, full: &str) -> Option<String> {
        match &self.namespace {
            Some(namespace) => full
                .strip_prefix(namespace.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .map(|rest| rest.to_string()),
            None => Some(full.to_string()),
        }
    }
}

impl StorageAdapter for MemoryAdapter {
    fn load(&self, key: &str) -> Result<Vec<u8>> {
        let guard = self.state.lock().unwrap();
        guard
            .get(&self.full_key(key))
            .cloned()
            .ok_or_else(|| Error::ItemNotFound {
                entity: key.to_string(),
            })
    }

    fn load_all(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let guard = self.state.lock().unwrap();
        Ok(guard
            .iter()
            .filter_map(|(full, bytes)| self.strip(full).map(|key| (key, bytes.clone())))
            .collect())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        guard.insert(self.full_key(key), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        guard
            .remove(&self.full_key(key))
            .map(|_| ())
            .ok_or_else(|| Error::ItemNotFound {
                entity: key.to_string(),
            })
    }

    fn delete_all(&self) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        match &self.namespace {
            Some(namespace) => {
                let prefix = format!("{namespace}/");
                guard.retain(|key, _| !key.starts_with(&prefix));
            }
            None => guard.clear(),
        }
        Ok(())
    }
}
