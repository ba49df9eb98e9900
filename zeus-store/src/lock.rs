//! Advisory file locking
//!
//! Each store path has a companion `<path>.lock` file. Acquisition takes an
//! OS-level exclusive lock on that file (fs2), backed by an in-process
//! registry so two handles inside one process also exclude each other.
//! Unlock releases the OS lock and best-effort removes the companion file.

use crate::cancel::CancelToken;
use crate::sandbox::Sandbox;
use crate::{Result, StoreError};
use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Exclusive advisory lock over one store path
///
/// Implemented by [`FileLock`] for the disk store and by the in-memory
/// store's lock for tests. Waiting acquisitions poll cooperatively and
/// honor the cancellation token.
#[async_trait]
pub trait StoreLock: Send + Sync {
    /// Take the lock, waiting as long as it takes (or until cancellation)
    async fn lock(&self, cancel: &CancelToken) -> Result<()>;

    /// Take the lock, waiting at most `timeout`; elapsing yields
    /// [`StoreError::LockTimeout`]
    async fn lock_with_timeout(&self, cancel: &CancelToken, timeout: Duration) -> Result<()>;

    /// Attempt to take the lock without waiting
    fn try_lock(&self) -> Result<bool>;

    /// Release the lock; a no-op when not held
    fn unlock(&self) -> Result<()>;
}

/// Lock paths currently held anywhere in this process
fn held_registry() -> &'static Mutex<HashSet<PathBuf>> {
    static HELD: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    HELD.get_or_init(|| Mutex::new(HashSet::new()))
}

/// How often a blocked acquirer re-attempts the lock
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive advisory lock for one store path
///
/// The lock is *advisory*: it only excludes other `FileLock` users (and any
/// other process honoring `flock` on the companion file). Dropping a locked
/// `FileLock` releases it.
#[derive(Debug)]
pub struct FileLock {
    /// Base-relative path being protected (for error messages)
    path: String,
    /// Absolute companion `<path>.lock` location
    lock_path: PathBuf,
    /// Held OS lock handle, if any
    handle: Mutex<Option<std::fs::File>>,
}

impl FileLock {
    /// Build the lock guarding `path` inside `sandbox`.
    ///
    /// Validates the companion path through the sandbox, so a traversal in
    /// `path` is refused here as well.
    pub fn new(sandbox: &Sandbox, path: &str) -> Result<Self> {
        let companion = format!("{}.lock", path);
        let lock_path = sandbox.resolve(&companion)?;
        Ok(Self {
            path: path.to_string(),
            lock_path,
            handle: Mutex::new(None),
        })
    }

    /// Whether this handle currently holds the lock
    pub fn is_held(&self) -> bool {
        self.handle.lock().is_some()
    }
}

#[async_trait]
impl StoreLock for FileLock {
    /// Returns `Ok(true)` when acquired, `Ok(false)` when another holder has
    /// it (in this process or another one).
    fn try_lock(&self) -> Result<bool> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            // Re-entrant attempt from the same FileLock.
            return Ok(false);
        }

        {
            let mut held = held_registry().lock();
            if held.contains(&self.lock_path) {
                return Ok(false);
            }

            if let Some(parent) = self.lock_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&self.lock_path)?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    held.insert(self.lock_path.clone());
                    *handle = Some(file);
                }
                Err(_) => return Ok(false),
            }
        }

        debug!(path = %self.path, "lock acquired");
        Ok(true)
    }

    async fn lock(&self, cancel: &CancelToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            if self.try_lock()? {
                return Ok(());
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    async fn lock_with_timeout(&self, cancel: &CancelToken, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            if self.try_lock()? {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(StoreError::LockTimeout {
                    path: self.path.clone(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    /// Releases the OS lock and best-effort removes the companion file.
    fn unlock(&self) -> Result<()> {
        let mut handle = self.handle.lock();
        if let Some(file) = handle.take() {
            let _ = fs2::FileExt::unlock(&file);
            held_registry().lock().remove(&self.lock_path);
            let _ = std::fs::remove_file(&self.lock_path);
            debug!(path = %self.path, "lock released");
        }
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = StoreLock::unlock(self);
    }
}
