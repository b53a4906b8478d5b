//! Raw partitioned key-value backends.
//!
//! Store directory layout for [`FileBackend`]:
//! ```text
//! store.meta.json              - store schema version
//! partitions/
//!   <partition>/<hex key>.rec  - one record per key, replaced atomically
//! ```

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Current on-disk layout version.
const STORE_SCHEMA_VERSION: u32 = 1;
const RECORD_EXTENSION: &str = "rec";

/// Byte-level access to named partitions. Callers serialize access; backends
/// need not be internally synchronized.
pub trait Backend: Send {
    fn get(&self, partition: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&mut self, partition: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Returns whether the key existed.
    fn remove(&mut self, partition: &str, key: &str) -> Result<bool, StoreError>;

    /// All keys of a partition, sorted. A partition that was never written is empty.
    fn keys(&self, partition: &str) -> Result<Vec<String>, StoreError>;
}

/// Volatile backend for tests and throwaway worlds.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    partitions: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, partition: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .partitions
            .get(partition)
            .and_then(|p| p.get(key))
            .cloned())
    }

    fn put(&mut self, partition: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.partitions
            .entry(partition.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, partition: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .partitions
            .get_mut(partition)
            .is_some_and(|p| p.remove(key).is_some()))
    }

    fn keys(&self, partition: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .partitions
            .get(partition)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default())
    }
}

/// Metadata stored in store.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub store_schema_version: u32,
}

/// Directory-backed backend: one file per record.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Open or create a store directory. Fails closed on a schema mismatch.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(root.join("partitions"))?;

        let meta_path = root.join("store.meta.json");
        if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(fs::File::open(&meta_path)?)?;
            if meta.store_schema_version != STORE_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.store_schema_version,
                    expected_version: STORE_SCHEMA_VERSION,
                });
            }
        } else {
            let meta = StoreMeta {
                store_schema_version: STORE_SCHEMA_VERSION,
            };
            let text = serde_json::to_string_pretty(&meta)?;
            write_bytes_atomic(&meta_path, text.as_bytes())?;
        }

        tracing::debug!(root = %root.display(), "opened file store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &str) -> PathBuf {
        self.root.join("partitions").join(partition)
    }

    fn record_path(&self, partition: &str, key: &str) -> PathBuf {
        self.partition_dir(partition)
            .join(format!("{}.{RECORD_EXTENSION}", hex::encode(key)))
    }
}

impl Backend for FileBackend {
    fn get(&self, partition: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.record_path(partition, key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&mut self, partition: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        write_bytes_atomic(&self.record_path(partition, key), value)?;
        Ok(())
    }

    fn remove(&mut self, partition: &str, key: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.record_path(partition, key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn keys(&self, partition: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.partition_dir(partition);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match hex::decode(stem).ok().and_then(|b| String::from_utf8(b).ok()) {
                Some(key) => keys.push(key),
                None => tracing::warn!(path = %path.display(), "skipping unreadable record name"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Write via a sibling temp file and rename.
fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}
