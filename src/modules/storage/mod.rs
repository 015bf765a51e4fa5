//! Key-value storage for persisted reset records.
//!
//! Records are opaque byte blobs addressed by string keys. Implementations
//! must make `delete` report whether the calling invocation was the one that
//! removed the key, since redemption uses it as an exclusive claim.

pub mod directory;
pub mod memory;

use std::io;
use thiserror::Error;

pub use directory::DirectoryStorage;
pub use memory::MemoryStorage;

/// Errors raised by a record storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage medium holding one entry per outstanding reset request
pub trait RecordStorage: Send + Sync {
    /// List every key starting with `prefix`
    fn enumerate(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Read the bytes stored under `key`, or `None` if there is no such entry
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Create or overwrite the entry under `key`
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Create the entry under `key` only if it does not exist yet.
    /// Returns `false`, leaving the existing entry untouched, when it does.
    fn write_if_absent(&self, key: &str, bytes: &[u8]) -> Result<bool, StorageError>;

    /// Remove `key`. Returns `false` when the entry was already gone.
    fn delete(&self, key: &str) -> Result<bool, StorageError>;
}

impl<T: RecordStorage + ?Sized> RecordStorage for std::sync::Arc<T> {
    fn enumerate(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        (**self).enumerate(prefix)
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).write(key, bytes)
    }

    fn write_if_absent(&self, key: &str, bytes: &[u8]) -> Result<bool, StorageError> {
        (**self).write_if_absent(key, bytes)
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        (**self).delete(key)
    }
}
