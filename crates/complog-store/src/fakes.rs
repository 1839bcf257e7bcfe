//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryBlobStore`, which satisfies both `BlobSink` and
//! `BlobSource` without touching disk.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct MemoryInner {
    order: Vec<String>,
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryInner {
    fn insert(&mut self, name: String, data: &[u8]) {
        self.order.push(name.clone());
        self.entries.insert(name, data.to_vec());
    }
}

/// In-memory content store backed by a `HashMap<entry name, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries whose name starts with `prefix`.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.order.iter().filter(|n| n.starts_with(prefix)).count()
    }
}

impl BlobSink for MemoryBlobStore {
    fn put_content(&mut self, data: &[u8]) -> StorageResult<Stored<ContentDigest>> {
        let digest = ContentDigest::from_bytes(data);
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        let name = digest.entry_name();
        let deduplicated = inner.entries.contains_key(&name);
        if !deduplicated {
            inner.insert(name, data);
        }
        Ok(Stored {
            key: digest,
            deduplicated,
        })
    }

    fn put_assembly(&mut self, id: ModuleId, data: &[u8]) -> StorageResult<Stored<ModuleId>> {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        let name = id.entry_name();
        let deduplicated = inner.entries.contains_key(&name);
        if !deduplicated {
            inner.insert(name, data);
        }
        Ok(Stored {
            key: id,
            deduplicated,
        })
    }

    fn put_entry(&mut self, name: &str, data: &[u8]) -> StorageResult<()> {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        if inner.entries.contains_key(name) {
            return Err(StorageError::DuplicateEntry {
                name: name.to_string(),
            });
        }
        inner.insert(name.to_string(), data);
        Ok(())
    }
}

impl BlobSource for MemoryBlobStore {
    fn read_entry(&self, name: &str) -> StorageResult<Vec<u8>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: name.to_string(),
            })
    }

    fn contains_entry(&self, name: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.contains_key(name)
    }

    fn entry_names(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.order.clone()
    }
}
