//! Sandbox safety properties exercised against the real disk store

use proptest::prelude::*;
use zeus_store::{CancelToken, FileStore, Sandbox, Store, StoreError};

#[tokio::test]
async fn write_outside_base_is_refused_and_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();
    let cancel = CancelToken::new();

    let err = store
        .write_file(&cancel, "../escape.txt", b"payload")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PathTraversal(_)));

    let escaped = dir.path().parent().unwrap().join("escape.txt");
    assert!(!escaped.exists());
}

#[tokio::test]
async fn deep_relative_escapes_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();
    let cancel = CancelToken::new();

    for path in ["../../x.yaml", "a/../../x.yaml", "a/b/../../../x.yaml"] {
        let err = store.write_file(&cancel, path, b"x").await.unwrap_err();
        assert!(matches!(err, StoreError::PathTraversal(_)), "path: {path}");
    }
}

proptest! {
    /// Every accepted relative path resolves strictly under the base.
    #[test]
    fn accepted_paths_stay_under_base(segments in proptest::collection::vec("[a-z0-9_-]{1,8}", 1..5)) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        let relative = segments.join("/");

        if let Ok(resolved) = sandbox.resolve(&relative) {
            prop_assert!(resolved.starts_with(sandbox.base()));
            prop_assert_ne!(resolved, sandbox.base().to_path_buf());
        }
    }

    /// Paths that pop above the base are always refused, regardless of how
    /// the `..` segments are interleaved.
    #[test]
    fn escaping_paths_are_always_refused(depth in 1usize..4, tail in "[a-z]{1,8}") {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        let relative = format!("{}{}", "../".repeat(depth), tail);

        prop_assert!(matches!(
            sandbox.resolve(&relative),
            Err(StoreError::PathTraversal(_))
        ));
    }
}
