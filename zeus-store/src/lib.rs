//! # Zeus Sandboxed Entity Store
//!
//! File-backed storage for Zeus project entities. Every path is relative to
//! a base directory fixed at construction; the sandbox refuses anything that
//! would resolve outside it. Writes are atomic (temp file + rename), YAML is
//! the on-disk format, and a companion `<path>.lock` file provides advisory
//! cross-process locking.
//!
//! ## Architecture
//!
//! ```text
//! Caller (repository / engines' data loaders)
//!     ↓ (relative paths + CancelToken)
//! Store trait  ──  FileStore (disk)  /  MemoryStore (tests)
//!     ↓
//! Sandbox (path validation)
//! ```
//!
//! All operations take a [`CancelToken`] and return [`StoreError::Cancelled`]
//! without side effects when the token has already fired.

pub mod cancel;
pub mod lock;
pub mod memory;
pub mod sandbox;
pub mod store;

pub use cancel::CancelToken;
pub use lock::{FileLock, StoreLock};
pub use memory::{MemoryLock, MemoryStore};
pub use sandbox::Sandbox;
pub use store::{read_yaml, write_yaml, FileStore, LockProvider, Store};

use thiserror::Error;

/// Store-layer errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Cancellation token fired before or during the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Path escapes the sandbox base directory
    #[error("path escapes store sandbox: {0}")]
    PathTraversal(String),

    /// Bounded lock wait elapsed
    #[error("lock timeout on {path} after {waited_ms}ms")]
    LockTimeout { path: String, waited_ms: u64 },

    /// YAML decode failed
    #[error("YAML parse error in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML encode failed
    #[error("YAML serialize error for {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        let err = StoreError::PathTraversal("../escape.txt".to_string());
        assert_eq!(err.to_string(), "path escapes store sandbox: ../escape.txt");

        let err = StoreError::LockTimeout {
            path: "objectives/obj-001.yaml".to_string(),
            waited_ms: 250,
        };
        assert!(err.to_string().contains("250ms"));
    }
}
