use crate::backend::{StorageBackend, StoredBlob};
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Filesystem-backed storage, one JSON file per key.
///
/// Keys are base64url-encoded into file names, so any valid key maps to
/// exactly one file and nothing escapes the root directory. Writers and
/// deleters serialize on a process-wide guard; readers rely on writes
/// landing via atomic rename.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    guard: Mutex<()>,
}

impl FileBackend {
    /// Construct a backend rooted at `root`. The directory is created on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileBackend {
            root: root.into(),
            guard: Mutex::new(()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", URL_SAFE_NO_PAD.encode(key)))
    }

    fn read_blob(&self, path: &Path) -> Result<Option<StoredBlob>> {
        match fs::read(path) {
            Ok(bytes) => {
                let blob = serde_json::from_slice(&bytes).map_err(Error::storage)?;
                Ok(Some(blob))
            }
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Ok(None)
                } else {
                    Err(Error::storage(err))
                }
            }
        }
    }

    fn write_blob(&self, path: &Path, blob: &StoredBlob) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::storage)?;
        }
        let data = serde_json::to_vec(blob).map_err(Error::storage)?;
        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(Error::storage)?;
        file.write_all(&data)
            .and_then(|_| file.sync_all())
            .map_err(Error::storage)?;
        fs::rename(&tmp, path).map_err(Error::storage)
    }
}

impl StorageBackend for FileBackend {
    fn put(&self, key: &str, bytes: Vec<u8>, expected: Option<u64>) -> Result<u64> {
        let _guard = self.guard.lock().unwrap();
        let path = self.path_for(key);
        let current = self.read_blob(&path)?;
        let version = match (current, expected) {
            (Some(existing), Some(version)) if existing.version == version => version + 1,
            (Some(_), Some(_)) => return Err(Error::conflict(key)),
            (Some(_), None) => return Err(Error::already_exists(key)),
            (None, None) => 1,
            (None, Some(_)) => return Err(Error::not_found(key)),
        };
        self.write_blob(&path, &StoredBlob { version, bytes })?;
        Ok(version)
    }

    fn get(&self, key: &str) -> Result<Option<StoredBlob>> {
        self.read_blob(&self.path_for(key))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.guard.lock().unwrap();
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Ok(false)
                } else {
                    Err(Error::storage(err))
                }
            }
        }
    }

    fn scan(&self, predicate: &dyn Fn(&str, &[u8]) -> bool) -> Result<Vec<(String, StoredBlob)>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    return Ok(Vec::new());
                }
                return Err(Error::storage(err));
            }
        };

        let mut hits = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Error::storage)?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            // Files whose stem is not a base64url key were not written by
            // this backend; leave them alone.
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let Ok(decoded) = URL_SAFE_NO_PAD.decode(stem) else {
                continue;
            };
            let Ok(key) = String::from_utf8(decoded) else {
                continue;
            };
            let Some(blob) = self.read_blob(&path)? else {
                continue;
            };
            if predicate(&key, &blob.bytes) {
                hits.push((key, blob));
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn blobs_survive_reopening_the_backend() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.put("project/db", b"sealed".to_vec(), None).unwrap();
        backend.put("project/db", b"sealed v2".to_vec(), Some(1)).unwrap();

        let reopened = FileBackend::new(dir.path());
        let blob = reopened.get("project/db").unwrap().unwrap();
        assert_eq!(blob.version, 2);
        assert_eq!(blob.bytes, b"sealed v2");
    }

    #[test]
    fn missing_key_is_none() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        assert!(backend.get("nope").unwrap().is_none());
    }

    #[test]
    fn versioned_put_checks_the_stored_version() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.put("k", b"v1".to_vec(), None).unwrap();
        assert!(matches!(
            backend.put("k", b"again".to_vec(), None),
            Err(Error::AlreadyExists { .. })
        ));
        backend.put("k", b"v2".to_vec(), Some(1)).unwrap();
        assert!(matches!(
            backend.put("k", b"v3".to_vec(), Some(1)),
            Err(Error::Conflict { .. })
        ));
    }

    #[test]
    fn distinct_keys_never_collide_on_disk() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.put("a/b", b"slash".to_vec(), None).unwrap();
        backend.put("a_b", b"underscore".to_vec(), None).unwrap();

        assert_eq!(backend.get("a/b").unwrap().unwrap().bytes, b"slash");
        assert_eq!(backend.get("a_b").unwrap().unwrap().bytes, b"underscore");
        assert!(backend.delete("a/b").unwrap());
        assert_eq!(backend.get("a_b").unwrap().unwrap().bytes, b"underscore");
    }

    #[test]
    fn delete_reports_whether_anything_was_removed() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.put("k", b"v".to_vec(), None).unwrap();
        assert!(backend.delete("k").unwrap());
        assert!(!backend.delete("k").unwrap());
    }

    #[test]
    fn scan_recovers_keys_and_skips_foreign_files() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        backend.put("alpha", b"hit".to_vec(), None).unwrap();
        backend.put("beta/nested", b"hit".to_vec(), None).unwrap();
        backend.put("gamma", b"miss".to_vec(), None).unwrap();
        fs::write(dir.path().join("notes.txt"), b"not ours").unwrap();
        fs::write(dir.path().join("!!stray!!.json"), b"not ours").unwrap();

        let mut hits = backend.scan(&|_, bytes| bytes == b"hit").unwrap();
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        let keys: Vec<_> = hits.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["alpha", "beta/nested"]);
    }
}
