//! Path sandbox
//!
//! Every store path is relative to a base directory that is canonicalized
//! (symlinks evaluated) once, at construction. [`Sandbox::resolve`] is the
//! single gate every operation passes through: absolute paths, `..` escapes
//! and symlink targets outside the base are all refused with
//! [`StoreError::PathTraversal`].

use crate::{Result, StoreError};
use std::path::{Component, Path, PathBuf};

/// Canonical base directory plus the validation gate
#[derive(Debug, Clone)]
pub struct Sandbox {
    base: PathBuf,
}

impl Sandbox {
    /// Create a sandbox rooted at `base`, creating the directory if needed.
    ///
    /// The base is resolved to an absolute canonical path so later prefix
    /// checks compare against the real location, not a symlink alias.
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref();
        std::fs::create_dir_all(base)?;
        let base = base.canonicalize()?;
        Ok(Self { base })
    }

    /// The canonical base directory
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Validate a relative path and resolve it inside the base.
    ///
    /// The empty string resolves to the base itself. Returns
    /// [`StoreError::PathTraversal`] for absolute paths, for `..` segments
    /// that pop above the base, and for existing paths whose canonical form
    /// leaves the base prefix (symlink escape).
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        if relative.is_empty() {
            return Ok(self.base.clone());
        }

        let candidate = Path::new(relative);
        if candidate.is_absolute() {
            return Err(StoreError::PathTraversal(relative.to_string()));
        }

        let mut normalized = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    // Popping past the first segment would land above the base.
                    if !normalized.pop() {
                        return Err(StoreError::PathTraversal(relative.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::PathTraversal(relative.to_string()));
                }
            }
        }

        let resolved = self.base.join(&normalized);

        // starts_with compares whole components, so `/base` can never be
        // satisfied by `/basesuffix`.
        if !resolved.starts_with(&self.base) {
            return Err(StoreError::PathTraversal(relative.to_string()));
        }

        // A symlink inside the base may still point outside it; re-check the
        // canonical form of whatever part of the path already exists.
        if resolved.exists() {
            let canonical = resolved.canonicalize()?;
            if canonical != self.base && !canonical.starts_with(&self.base) {
                return Err(StoreError::PathTraversal(relative.to_string()));
            }
        }

        Ok(resolved)
    }

    /// Express an absolute path under the base as a relative store path.
    pub fn relativize(&self, absolute: &Path) -> Option<String> {
        absolute
            .strip_prefix(&self.base)
            .ok()
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        (dir, sandbox)
    }

    #[test]
    fn empty_path_is_the_base() {
        let (_dir, sandbox) = sandbox();
        assert_eq!(sandbox.resolve("").unwrap(), sandbox.base());
    }

    #[test]
    fn plain_relative_paths_resolve_under_base() {
        let (_dir, sandbox) = sandbox();
        let resolved = sandbox.resolve("objectives/obj-001.yaml").unwrap();
        assert!(resolved.starts_with(sandbox.base()));
        assert!(resolved.ends_with("objectives/obj-001.yaml"));
    }

    #[test]
    fn absolute_paths_are_refused() {
        let (_dir, sandbox) = sandbox();
        assert!(matches!(
            sandbox.resolve("/etc/passwd"),
            Err(StoreError::PathTraversal(_))
        ));
    }

    #[test]
    fn parent_escapes_are_refused() {
        let (_dir, sandbox) = sandbox();
        assert!(matches!(
            sandbox.resolve("../escape.txt"),
            Err(StoreError::PathTraversal(_))
        ));
        assert!(matches!(
            sandbox.resolve("a/../../escape.txt"),
            Err(StoreError::PathTraversal(_))
        ));
    }

    #[test]
    fn interior_parent_segments_are_allowed() {
        let (_dir, sandbox) = sandbox();
        let resolved = sandbox.resolve("a/b/../c.yaml").unwrap();
        assert!(resolved.ends_with("a/c.yaml"));
    }

    #[test]
    fn relativize_round_trips() {
        let (_dir, sandbox) = sandbox();
        let resolved = sandbox.resolve("state/current.yaml").unwrap();
        assert_eq!(
            sandbox.relativize(&resolved).unwrap(),
            "state/current.yaml"
        );
    }
}
