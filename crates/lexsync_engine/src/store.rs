//! Local persistence seams.
//!
//! The engine never touches disk directly. The embedding application
//! provides the document store (one JSON document per owner) and the blob
//! cache (attachment payloads by storage path); in-memory implementations
//! back the tests.

use crate::error::EngineResult;
use lexsync_model::OfficeDocument;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// The local document store, one hierarchical document per owner.
///
/// `put` is the engine's single local mutation per sync run and must be
/// atomic: readers see either the previous document or the new one, never
/// a partial write.
pub trait LocalStore: Send + Sync {
    /// Reads the owner's document, if one exists.
    fn get(&self, owner: Uuid) -> EngineResult<Option<OfficeDocument>>;

    /// Atomically replaces the owner's document.
    fn put(&self, owner: Uuid, document: &OfficeDocument) -> EngineResult<()>;
}

/// The local attachment cache, keyed by storage path.
pub trait LocalBlobs: Send + Sync {
    /// Reads a cached blob.
    fn read(&self, path: &str) -> EngineResult<Vec<u8>>;

    /// Writes a blob to the cache.
    fn write(&self, path: &str, bytes: &[u8]) -> EngineResult<()>;

    /// Removes a blob from the cache.
    fn remove(&self, path: &str) -> EngineResult<()>;
}

/// In-memory [`LocalStore`].
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Uuid, OfficeDocument>>,
    puts: RwLock<u64>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding a document for the owner.
    pub fn with_document(owner: Uuid, document: OfficeDocument) -> Self {
        let store = Self::new();
        store.documents.write().insert(owner, document);
        store
    }

    /// Number of `put` calls observed.
    pub fn put_count(&self) -> u64 {
        *self.puts.read()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, owner: Uuid) -> EngineResult<Option<OfficeDocument>> {
        Ok(self.documents.read().get(&owner).cloned())
    }

    fn put(&self, owner: Uuid, document: &OfficeDocument) -> EngineResult<()> {
        self.documents.write().insert(owner, document.clone());
        *self.puts.write() += 1;
        Ok(())
    }
}

/// In-memory [`LocalBlobs`].
#[derive(Default)]
pub struct MemoryBlobs {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobs {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a blob.
    pub fn seed(&self, path: &str, bytes: Vec<u8>) {
        self.blobs.write().insert(path.to_string(), bytes);
    }

    /// True when the cache holds a blob at the path.
    pub fn contains(&self, path: &str) -> bool {
        self.blobs.read().contains_key(path)
    }
}

impl LocalBlobs for MemoryBlobs {
    fn read(&self, path: &str) -> EngineResult<Vec<u8>> {
        self.blobs
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| crate::EngineError::store(format!("no local blob at {path}")))
    }

    fn write(&self, path: &str, bytes: &[u8]) -> EngineResult<()> {
        self.blobs.write().insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, path: &str) -> EngineResult<()> {
        self.blobs.write().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_round_trip() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        assert!(store.get(owner).unwrap().is_none());

        store.put(owner, &OfficeDocument::default()).unwrap();
        assert!(store.get(owner).unwrap().is_some());
        assert_eq!(store.put_count(), 1);
    }

    #[test]
    fn blobs_round_trip() {
        let blobs = MemoryBlobs::new();
        blobs.write("a/b.pdf", b"bytes").unwrap();
        assert_eq!(blobs.read("a/b.pdf").unwrap(), b"bytes");

        blobs.remove("a/b.pdf").unwrap();
        assert!(blobs.read("a/b.pdf").is_err());
    }
}
