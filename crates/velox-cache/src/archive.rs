use std::collections::HashMap;
use std::sync::RwLock;

use crate::{CacheError, Result};

/// Downloaded server archives, keyed by server reference.
///
/// The first write for a key wins. Readers always get their own copy of the
/// bytes, so callers can consume them without holding the lock.
#[derive(Debug, Default)]
pub struct ArchiveCache {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl ArchiveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        blobs.get(key).cloned()
    }

    /// Store `blob` under `key` unless the key is already present.
    ///
    /// Returns `true` when this call stored the blob.
    pub fn set(&self, key: &str, blob: &[u8]) -> Result<bool> {
        if blob.is_empty() {
            return Err(CacheError::EmptyBlob {
                key: key.to_string(),
            });
        }

        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        if blobs.contains_key(key) {
            tracing::debug!(key = %key, "archive already cached, keeping first copy");
            return Ok(false);
        }
        blobs.insert(key.to_string(), blob.to_vec());
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
