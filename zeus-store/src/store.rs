//! Store trait and the disk-backed implementation
//!
//! [`Store`] is the byte-level contract shared by [`FileStore`] and the
//! in-memory test double. YAML encode/decode sits on top as the free
//! [`read_yaml`] / [`write_yaml`] helpers so both implementations stay
//! object-safe.
//!
//! Writes are atomic: content lands in a temp file in the target directory
//! and is renamed into place, so readers never observe a torn file.

use crate::cancel::CancelToken;
use crate::sandbox::Sandbox;
use crate::{Result, StoreError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Byte-level storage contract
///
/// All paths are relative to the implementation's base. Every operation
/// checks the cancellation token before touching state and returns
/// [`StoreError::Cancelled`] with no side effects once it has fired.
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether `path` exists (file or directory)
    async fn exists(&self, cancel: &CancelToken, path: &str) -> Result<bool>;

    /// Read the full contents of a file
    async fn read_bytes(&self, cancel: &CancelToken, path: &str) -> Result<Vec<u8>>;

    /// Write a file atomically, creating parent directories as needed
    async fn write_file(&self, cancel: &CancelToken, path: &str, bytes: &[u8]) -> Result<()>;

    /// Remove a file
    async fn delete(&self, cancel: &CancelToken, path: &str) -> Result<()>;

    /// Copy `src` to `dst` inside the sandbox
    async fn copy(&self, cancel: &CancelToken, src: &str, dst: &str) -> Result<()>;

    /// Create a directory (and parents)
    async fn ensure_dir(&self, cancel: &CancelToken, path: &str) -> Result<()>;

    /// Expand a glob pattern; results are base-relative and sorted
    async fn glob(&self, cancel: &CancelToken, pattern: &str) -> Result<Vec<String>>;

    /// List the file names directly under `path` (no recursion), sorted
    async fn list_dir(&self, cancel: &CancelToken, path: &str) -> Result<Vec<String>>;
}

/// Source of advisory locks for store paths
///
/// Mutating entity flows lock the target path, re-read, write, release.
/// The disk store hands out [`crate::FileLock`]s over `<path>.lock`
/// companion files; the in-memory store hands out process-local locks with
/// the same semantics.
pub trait LockProvider {
    /// Concrete lock type for this store
    type Lock: crate::lock::StoreLock;

    /// Build the lock guarding `path`
    fn lock_for(&self, path: &str) -> Result<Self::Lock>;
}

/// Decode a YAML file into `T`
pub async fn read_yaml<T, S>(store: &S, cancel: &CancelToken, path: &str) -> Result<T>
where
    T: DeserializeOwned,
    S: Store + ?Sized,
{
    let bytes = store.read_bytes(cancel, path).await?;
    serde_yaml::from_slice(&bytes).map_err(|source| StoreError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Encode `value` as YAML and write it atomically
pub async fn write_yaml<T, S>(store: &S, cancel: &CancelToken, path: &str, value: &T) -> Result<()>
where
    T: Serialize + Sync,
    S: Store + ?Sized,
{
    let text = serde_yaml::to_string(value).map_err(|source| StoreError::Serialize {
        path: path.to_string(),
        source,
    })?;
    store.write_file(cancel, path, text.as_bytes()).await
}

/// Disk-backed store rooted at a sandboxed base directory
#[derive(Debug, Clone)]
pub struct FileStore {
    sandbox: Sandbox,
}

impl FileStore {
    /// Open a store rooted at `base`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self> {
        Ok(Self {
            sandbox: Sandbox::new(base)?,
        })
    }

    /// The path sandbox this store validates against
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    fn guard(cancel: &CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    /// Create `dir` and parents with mode 0755 on Unix
    fn make_dirs(dir: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = std::fs::DirBuilder::new();
            builder.recursive(true).mode(0o755);
            builder.create(dir)?;
        }
        #[cfg(not(unix))]
        {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Write bytes to a temp file in the target directory, then rename into
    /// place. Rename within one directory is atomic on POSIX, so readers see
    /// either the old file or the new one, never a partial write.
    fn atomic_write(target: &Path, bytes: &[u8]) -> Result<()> {
        let parent = target
            .parent()
            .ok_or_else(|| StoreError::PathTraversal(target.display().to_string()))?;
        Self::make_dirs(parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o644);
            temp.as_file().set_permissions(perms)?;
        }

        temp.persist(target).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl LockProvider for FileStore {
    type Lock = crate::FileLock;

    fn lock_for(&self, path: &str) -> Result<Self::Lock> {
        crate::FileLock::new(&self.sandbox, path)
    }
}

#[async_trait]
impl Store for FileStore {
    async fn exists(&self, cancel: &CancelToken, path: &str) -> Result<bool> {
        Self::guard(cancel)?;
        let resolved = self.sandbox.resolve(path)?;
        Ok(tokio::fs::try_exists(&resolved).await.unwrap_or(false))
    }

    async fn read_bytes(&self, cancel: &CancelToken, path: &str) -> Result<Vec<u8>> {
        Self::guard(cancel)?;
        let resolved = self.sandbox.resolve(path)?;
        Ok(tokio::fs::read(&resolved).await?)
    }

    async fn write_file(&self, cancel: &CancelToken, path: &str, bytes: &[u8]) -> Result<()> {
        Self::guard(cancel)?;
        let resolved = self.sandbox.resolve(path)?;
        debug!(path, size = bytes.len(), "writing file");
        Self::atomic_write(&resolved, bytes)
    }

    async fn delete(&self, cancel: &CancelToken, path: &str) -> Result<()> {
        Self::guard(cancel)?;
        let resolved = self.sandbox.resolve(path)?;
        debug!(path, "deleting file");
        Ok(tokio::fs::remove_file(&resolved).await?)
    }

    async fn copy(&self, cancel: &CancelToken, src: &str, dst: &str) -> Result<()> {
        Self::guard(cancel)?;
        let from = self.sandbox.resolve(src)?;
        let to = self.sandbox.resolve(dst)?;
        if let Some(parent) = to.parent() {
            Self::make_dirs(parent)?;
        }
        tokio::fs::copy(&from, &to).await?;
        Ok(())
    }

    async fn ensure_dir(&self, cancel: &CancelToken, path: &str) -> Result<()> {
        Self::guard(cancel)?;
        let resolved = self.sandbox.resolve(path)?;
        Self::make_dirs(&resolved)
    }

    async fn glob(&self, cancel: &CancelToken, pattern: &str) -> Result<Vec<String>> {
        Self::guard(cancel)?;
        // Validate the pattern like any other path; wildcards are ordinary
        // segments as far as the sandbox is concerned.
        let resolved = self.sandbox.resolve(pattern)?;
        let absolute = resolved.to_string_lossy().to_string();

        let entries = glob::glob(&absolute).map_err(|e| {
            warn!(pattern, error = %e, "invalid glob pattern");
            StoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let mut matches = Vec::new();
        for entry in entries {
            Self::guard(cancel)?;
            match entry {
                Ok(path) => {
                    if let Some(relative) = self.sandbox.relativize(&path) {
                        matches.push(relative);
                    }
                }
                Err(e) => return Err(StoreError::Io(e.into_error())),
            }
        }
        matches.sort();
        Ok(matches)
    }

    async fn list_dir(&self, cancel: &CancelToken, path: &str) -> Result<Vec<String>> {
        Self::guard(cancel)?;
        let resolved = self.sandbox.resolve(path)?;

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&resolved).await?;
        while let Some(entry) = entries.next_entry().await? {
            Self::guard(cancel)?;
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
