//! Object storage boundary.
//!
//! Charts, OCR results, encounter files, archives and reports all live in a
//! key/value object store addressed by `/`-separated keys. The pipeline only
//! talks to the [`ObjectStore`] trait; `FsObjectStore` backs the CLI and
//! `MemoryObjectStore` backs tests.

pub mod object_store;

pub use object_store::{FsObjectStore, MemoryObjectStore};

use thiserror::Error;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_CSV: &str = "text/csv";
pub const CONTENT_TYPE_PDF: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Object store lock poisoned")]
    LockPoisoned,
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

/// Minimal object storage contract (list/get/put/copy/delete).
pub trait ObjectStore: Send + Sync {
    /// All keys starting with `prefix`, sorted ascending. Recursive, like a
    /// flat bucket listing.
    fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), StorageError>;

    fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError>;

    fn delete(&self, key: &str) -> Result<(), StorageError>;

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Copy then delete.
    fn rename(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        self.copy(src, dst)?;
        self.delete(src)
    }
}

/// Last path segment of a key.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// File name without its final extension (`charts/a.b.pdf` → `a.b`).
pub fn file_stem(key: &str) -> &str {
    let name = file_name(key);
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_takes_last_segment() {
        assert_eq!(file_name("a/b/c.json"), "c.json");
        assert_eq!(file_name("c.json"), "c.json");
    }

    #[test]
    fn file_stem_drops_extension_only() {
        assert_eq!(file_stem("charts/visit.2026.pdf"), "visit.2026");
        assert_eq!(file_stem("charts/noext"), "noext");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }
}
