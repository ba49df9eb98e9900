//! In-memory store for tests
//!
//! Keyed by normalized relative path. Supports per-path error injection and
//! a simple `*` glob, which is all the engine fixtures need. The same path
//! contract as the disk store applies: absolute paths and escaping `..`
//! segments are refused.

use crate::cancel::CancelToken;
use crate::{Result, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Component, Path};

use crate::lock::StoreLock;
use crate::store::{LockProvider, Store};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-memory [`Store`] implementation
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<BTreeSet<String>>,
    injected: Mutex<HashMap<String, String>>,
    locked: Arc<Mutex<BTreeSet<String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without going through the async API
    pub fn put(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        if let Ok(normalized) = normalize(path) {
            self.files.lock().insert(normalized, bytes.into());
        }
    }

    /// Make every subsequent operation on `path` fail with an I/O error
    /// carrying `message`
    pub fn inject_error(&self, path: &str, message: &str) {
        if let Ok(normalized) = normalize(path) {
            self.injected.lock().insert(normalized, message.to_string());
        }
    }

    /// Clear a previously injected error
    pub fn clear_error(&self, path: &str) {
        if let Ok(normalized) = normalize(path) {
            self.injected.lock().remove(&normalized);
        }
    }

    /// Number of stored files
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    /// Whether no files are stored
    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }

    fn check(&self, cancel: &CancelToken, path: &str) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let normalized = normalize(path)?;
        if let Some(message) = self.injected.lock().get(&normalized) {
            return Err(StoreError::Io(std::io::Error::other(message.clone())));
        }
        Ok(normalized)
    }
}

/// Lexically validate and normalize a relative path
fn normalize(path: &str) -> Result<String> {
    if path.is_empty() {
        return Ok(String::new());
    }
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return Err(StoreError::PathTraversal(path.to_string()));
    }

    let mut parts: Vec<String> = Vec::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(StoreError::PathTraversal(path.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StoreError::PathTraversal(path.to_string()));
            }
        }
    }
    Ok(parts.join("/"))
}

/// Process-local lock with the same contract as the disk store's
/// [`crate::FileLock`]
#[derive(Debug)]
pub struct MemoryLock {
    path: String,
    held_by_me: Mutex<bool>,
    locked: Arc<Mutex<BTreeSet<String>>>,
}

const RETRY_INTERVAL: Duration = Duration::from_millis(5);

#[async_trait]
impl StoreLock for MemoryLock {
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

    fn try_lock(&self) -> Result<bool> {
        let mut mine = self.held_by_me.lock();
        if *mine {
            return Ok(false);
        }
        let mut locked = self.locked.lock();
        if locked.contains(&self.path) {
            return Ok(false);
        }
        locked.insert(self.path.clone());
        *mine = true;
        Ok(true)
    }

    fn unlock(&self) -> Result<()> {
        let mut mine = self.held_by_me.lock();
        if *mine {
            self.locked.lock().remove(&self.path);
            *mine = false;
        }
        Ok(())
    }
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        let _ = StoreLock::unlock(self);
    }
}

impl LockProvider for MemoryStore {
    type Lock = MemoryLock;

    fn lock_for(&self, path: &str) -> Result<Self::Lock> {
        Ok(MemoryLock {
            path: normalize(path)?,
            held_by_me: Mutex::new(false),
            locked: Arc::clone(&self.locked),
        })
    }
}

/// Greedy `*` wildcard match over the whole relative path
fn wildcard_match(pattern: &str, path: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == path;
    }

    let mut remainder = path;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match remainder.strip_prefix(segment) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            return remainder.ends_with(segment);
        } else {
            match remainder.find(segment) {
                Some(at) => remainder = &remainder[at + segment.len()..],
                None => return false,
            }
        }
    }

    // Pattern ended with '*': anything left matches.
    segments.last().map(|s| s.is_empty()).unwrap_or(false) || remainder.is_empty()
}

#[async_trait]
impl Store for MemoryStore {
    async fn exists(&self, cancel: &CancelToken, path: &str) -> Result<bool> {
        let normalized = self.check(cancel, path)?;
        if self.files.lock().contains_key(&normalized) {
            return Ok(true);
        }
        if self.dirs.lock().contains(&normalized) {
            return Ok(true);
        }
        let prefix = format!("{}/", normalized);
        Ok(self.files.lock().keys().any(|k| k.starts_with(&prefix)))
    }

    async fn read_bytes(&self, cancel: &CancelToken, path: &str) -> Result<Vec<u8>> {
        let normalized = self.check(cancel, path)?;
        self.files.lock().get(&normalized).cloned().ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                normalized,
            ))
        })
    }

    async fn write_file(&self, cancel: &CancelToken, path: &str, bytes: &[u8]) -> Result<()> {
        let normalized = self.check(cancel, path)?;
        self.files.lock().insert(normalized, bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, cancel: &CancelToken, path: &str) -> Result<()> {
        let normalized = self.check(cancel, path)?;
        self.files.lock().remove(&normalized).ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                normalized,
            ))
        })?;
        Ok(())
    }

    async fn copy(&self, cancel: &CancelToken, src: &str, dst: &str) -> Result<()> {
        let bytes = self.read_bytes(cancel, src).await?;
        self.write_file(cancel, dst, &bytes).await
    }

    async fn ensure_dir(&self, cancel: &CancelToken, path: &str) -> Result<()> {
        let normalized = self.check(cancel, path)?;
        self.dirs.lock().insert(normalized);
        Ok(())
    }

    async fn glob(&self, cancel: &CancelToken, pattern: &str) -> Result<Vec<String>> {
        let normalized = self.check(cancel, pattern)?;
        let files = self.files.lock();
        let mut matches: Vec<String> = files
            .keys()
            .filter(|path| wildcard_match(&normalized, path))
            .cloned()
            .collect();
        matches.sort();
        Ok(matches)
    }

    async fn list_dir(&self, cancel: &CancelToken, path: &str) -> Result<Vec<String>> {
        let normalized = self.check(cancel, path)?;
        let prefix = if normalized.is_empty() {
            String::new()
        } else {
            format!("{}/", normalized)
        };

        let files = self.files.lock();
        let mut names: Vec<String> = files
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(&prefix)?;
                // Direct children only.
                if rest.is_empty() || rest.contains('/') {
                    None
                } else {
                    Some(rest.to_string())
                }
            })
            .collect();
        names.sort();
        Ok(names)
    }
}
