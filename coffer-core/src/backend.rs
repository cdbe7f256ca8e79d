use crate::error::Result;
use serde::{Deserialize, Serialize};

pub mod file;
pub mod memory;

/// A stored ciphertext blob together with its storage version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredBlob {
    pub version: u64,
    pub bytes: Vec<u8>,
}

/// Blob storage implemented by the concrete backends.
///
/// Backends know nothing about secret structure or encryption; they see
/// opaque bytes keyed by name. Versions start at 1 and increase by one on
/// every successful overwrite of a key.
pub trait StorageBackend: Send + Sync {
    /// Store `bytes` under `key`.
    ///
    /// With `expected = None` this is a strict insert: it fails with
    /// `AlreadyExists` when the key is present. With `expected = Some(v)`
    /// it replaces the blob only while the stored version is still `v`,
    /// failing with `Conflict` on a version mismatch and `NotFound` when
    /// the key has disappeared. Returns the new version.
    fn put(&self, key: &str, bytes: Vec<u8>, expected: Option<u64>) -> Result<u64>;

    /// Fetch the blob stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> Result<Option<StoredBlob>>;

    /// Remove `key`. Returns whether a blob was actually removed;
    /// deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Enumerate every blob matching `predicate`.
    fn scan(&self, predicate: &dyn Fn(&str, &[u8]) -> bool) -> Result<Vec<(String, StoredBlob)>>;
}

impl<T> StorageBackend for Box<T>
where
    T: StorageBackend + ?Sized,
{
    fn put(&self, key: &str, bytes: Vec<u8>, expected: Option<u64>) -> Result<u64> {
        (**self).put(key, bytes, expected)
    }

    fn get(&self, key: &str) -> Result<Option<StoredBlob>> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key)
    }

    fn scan(&self, predicate: &dyn Fn(&str, &[u8]) -> bool) -> Result<Vec<(String, StoredBlob)>> {
        (**self).scan(predicate)
    }
}

impl<T> StorageBackend for std::sync::Arc<T>
where
    T: StorageBackend + ?Sized,
{
    fn put(&self, key: &str, bytes: Vec<u8>, expected: Option<u64>) -> Result<u64> {
        (**self).put(key, bytes, expected)
    }

    fn get(&self, key: &str) -> Result<Option<StoredBlob>> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key)
    }

    fn scan(&self, predicate: &dyn Fn(&str, &[u8]) -> bool) -> Result<Vec<(String, StoredBlob)>> {
        (**self).scan(predicate)
    }
}
