use crate::backend::{StorageBackend, StoredBlob};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process backend for tests and single-node deployments. Contents are
/// lost on shutdown.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<HashMap<String, StoredBlob>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn put(&self, key: &str, bytes: Vec<u8>, expected: Option<u64>) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let version = match (state.get(key), expected) {
            (Some(existing), Some(version)) if existing.version == version => version + 1,
            (Some(_), Some(_)) => return Err(Error::conflict(key)),
            (Some(_), None) => return Err(Error::already_exists(key)),
            (None, None) => 1,
            (None, Some(_)) => return Err(Error::not_found(key)),
        };
        state.insert(key.to_string(), StoredBlob { version, bytes });
        Ok(version)
    }

    fn get(&self, key: &str) -> Result<Option<StoredBlob>> {
        Ok(self.state.lock().unwrap().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().remove(key).is_some())
    }

    fn scan(&self, predicate: &dyn Fn(&str, &[u8]) -> bool) -> Result<Vec<(String, StoredBlob)>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .iter()
            .filter(|(key, blob)| predicate(key, &blob.bytes))
            .map(|(key, blob)| (key.clone(), blob.clone()))
            .collect())
    }
}
