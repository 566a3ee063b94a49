//! Directory sync engine scenarios
//!
//! Covers incremental detection, orphan gating, the empty-source wipe and
//! failure reporting.

use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use vaultsync_core::domain::object_key;
use vaultsync_sync::{DirectorySyncEngine, SyncError, SyncOptions, UploadReason};

use crate::common::{self, MemoryStore, StoreOp};

fn engine(store: &std::sync::Arc<MemoryStore>) -> DirectorySyncEngine {
    DirectorySyncEngine::new(store.clone())
}

// ============================================================================
// Incremental sync
// ============================================================================

#[tokio::test]
async fn test_incremental_scenario_uploads_only_new_files() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    let engine = engine(&store);
    let cancel = CancellationToken::new();

    let first = engine
        .sync(tree.path(), "", SyncOptions::incremental(false), &cancel)
        .await
        .unwrap();
    assert_eq!(first.uploaded, vec!["subdir/test3.txt", "test1.txt", "test2.txt"]);

    store.clear_ops();
    let second = engine
        .sync(tree.path(), "", SyncOptions::incremental(false), &cancel)
        .await
        .unwrap();
    assert!(second.uploaded.is_empty());
    assert_eq!(second.skipped.len(), 3);
    assert!(store.puts().is_empty());

    common::write_file(tree.path(), "incremental.txt", "new");
    store.clear_ops();
    let third = engine
        .sync(tree.path(), "", SyncOptions::incremental(false), &cancel)
        .await
        .unwrap();
    assert_eq!(third.uploaded, vec!["incremental.txt"]);
    assert_eq!(store.puts(), vec!["incremental.txt"]);
}

#[tokio::test]
async fn test_keys_use_prefix_and_forward_slashes() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();

    engine(&store)
        .sync(tree.path(), "backups/home", SyncOptions::full(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        store.keys(),
        vec![
            object_key("backups/home", "subdir/test3.txt"),
            object_key("backups/home", "test1.txt"),
            object_key("backups/home", "test2.txt"),
        ]
    );
    assert_eq!(store.content("backups/home/subdir/test3.txt").unwrap(), "three");
}

#[tokio::test]
async fn test_plan_is_empty_on_idempotent_rerun() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    let engine = engine(&store);
    let cancel = CancellationToken::new();

    engine
        .sync(tree.path(), "p", SyncOptions::incremental(true), &cancel)
        .await
        .unwrap();
    let plan = engine
        .plan(tree.path(), "p", SyncOptions::incremental(true), &cancel)
        .await
        .unwrap();

    assert!(plan.is_noop());
    assert_eq!(plan.to_skip.len(), 3);
}

#[tokio::test]
async fn test_full_mode_reuploads_without_listing() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    let engine = engine(&store);
    let cancel = CancellationToken::new();

    engine
        .sync(tree.path(), "", SyncOptions::full(), &cancel)
        .await
        .unwrap();
    store.clear_ops();
    let report = engine
        .sync(tree.path(), "", SyncOptions::full(), &cancel)
        .await
        .unwrap();

    assert_eq!(report.uploaded.len(), 3);
    assert!(store
        .ops()
        .iter()
        .all(|op| matches!(op, StoreOp::Put(_))));
}

// ============================================================================
// Modified file detection
// ============================================================================

#[tokio::test]
async fn test_modified_file_detection_by_timestamp() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    let engine = engine(&store);
    let cancel = CancellationToken::new();

    engine
        .sync(tree.path(), "", SyncOptions::incremental(false), &cancel)
        .await
        .unwrap();

    let mtime1 = common::local_mtime(tree.path(), "test1.txt");
    let mtime2 = common::local_mtime(tree.path(), "test2.txt");
    // Remote older than local: re-upload.
    store.set_last_modified("test1.txt", mtime1 - chrono::Duration::seconds(60));
    // Remote exactly as old as local: skip.
    store.set_last_modified("test2.txt", mtime2);
    // Remote newer than local: skip.
    store.set_last_modified("subdir/test3.txt", Utc::now() + chrono::Duration::hours(1));

    let plan = engine
        .plan(tree.path(), "", SyncOptions::incremental(false), &cancel)
        .await
        .unwrap();

    assert_eq!(plan.upload_keys(), vec!["test1.txt"]);
    assert_eq!(plan.to_upload[0].reason, UploadReason::Modified);
    assert_eq!(plan.to_skip, vec!["subdir/test3.txt", "test2.txt"]);
}

#[tokio::test]
async fn test_touched_local_file_is_reuploaded() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    let engine = engine(&store);
    let cancel = CancellationToken::new();

    engine
        .sync(tree.path(), "", SyncOptions::incremental(false), &cancel)
        .await
        .unwrap();

    let future = SystemTime::now() + Duration::from_secs(3600);
    std::fs::File::options()
        .write(true)
        .open(tree.path().join("test2.txt"))
        .unwrap()
        .set_modified(future)
        .unwrap();

    store.clear_ops();
    let report = engine
        .sync(tree.path(), "", SyncOptions::incremental(false), &cancel)
        .await
        .unwrap();
    assert_eq!(report.uploaded, vec!["test2.txt"]);
}

#[tokio::test]
async fn test_only_matched_keys_are_headed() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    store.insert("test1.txt", b"old", Utc::now());

    engine(&store)
        .sync(tree.path(), "", SyncOptions::incremental(false), &CancellationToken::new())
        .await
        .unwrap();

    let heads: Vec<_> = store
        .ops()
        .into_iter()
        .filter(|op| matches!(op, StoreOp::Head(_)))
        .collect();
    assert_eq!(heads, vec![StoreOp::Head("test1.txt".to_string())]);
}

// ============================================================================
// Orphan deletion gating
// ============================================================================

async fn run_with_orphan(sync: bool, delete_orphans: bool) -> (Vec<String>, Vec<String>) {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    store.insert("files/gone.txt", b"stale", Utc::now());
    store.insert("files2/sibling.txt", b"other prefix", Utc::now());

    engine(&store)
        .sync(
            tree.path(),
            "files",
            SyncOptions {
                sync,
                delete_orphans,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    (store.deletes(), store.keys())
}

#[tokio::test]
async fn test_orphans_deleted_only_with_sync_and_delete() {
    let (deleted, keys) = run_with_orphan(true, true).await;
    assert_eq!(deleted, vec!["files/gone.txt"]);
    assert!(!keys.contains(&"files/gone.txt".to_string()));
    assert!(keys.contains(&"files2/sibling.txt".to_string()));

    for (sync, delete) in [(true, false), (false, true), (false, false)] {
        let (deleted, keys) = run_with_orphan(sync, delete).await;
        assert!(deleted.is_empty(), "sync={sync} delete={delete}");
        assert!(keys.contains(&"files/gone.txt".to_string()));
    }
}

#[tokio::test]
async fn test_orphans_kept_are_reported() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    store.insert("gone.txt", b"stale", Utc::now());

    let report = engine(&store)
        .sync(tree.path(), "", SyncOptions::incremental(false), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.orphans_kept, 1);
    assert!(report.deleted.is_empty());
}

#[tokio::test]
async fn test_deletions_happen_after_all_uploads() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    store.insert("a-orphan.txt", b"x", Utc::now());
    store.insert("z-orphan.txt", b"x", Utc::now());

    engine(&store)
        .sync(tree.path(), "", SyncOptions::incremental(true), &CancellationToken::new())
        .await
        .unwrap();

    let ops = store.ops();
    let last_put = ops.iter().rposition(|op| matches!(op, StoreOp::Put(_))).unwrap();
    let first_delete = ops.iter().position(|op| matches!(op, StoreOp::Delete(_))).unwrap();
    assert!(last_put < first_delete);
    assert!(matches!(ops[0], StoreOp::List(_)));
}

#[tokio::test]
async fn test_empty_source_with_delete_wipes_prefix() {
    let store = MemoryStore::new();
    let empty = tempfile::tempdir().unwrap();
    store.insert("backups/a.txt", b"a", Utc::now());
    store.insert("backups/nested/b.txt", b"b", Utc::now());
    store.insert("unrelated/c.txt", b"c", Utc::now());

    let report = engine(&store)
        .sync(empty.path(), "backups", SyncOptions::incremental(true), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.uploaded.is_empty());
    assert_eq!(report.deleted, vec!["backups/a.txt", "backups/nested/b.txt"]);
    assert_eq!(store.keys(), vec!["unrelated/c.txt"]);
}

#[tokio::test]
async fn test_listing_uses_trailing_slash_prefix() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();

    engine(&store)
        .sync(tree.path(), "backups", SyncOptions::incremental(false), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(store.ops()[0], StoreOp::List("backups/".to_string()));
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_missing_source_is_not_found_with_path() {
    let store = MemoryStore::new();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    let err = engine(&store)
        .sync(&missing, "", SyncOptions::incremental(true), &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        SyncError::SourceNotFound(path) => assert_eq!(path, &missing),
        other => panic!("expected SourceNotFound, got {other:?}"),
    }
    assert!(err.to_string().contains(&missing.display().to_string()));
    assert!(store.ops().is_empty());
}

#[tokio::test]
async fn test_put_failure_aborts_with_context() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    store.fail("put", "test1.txt");

    let err = engine(&store)
        .sync(tree.path(), "", SyncOptions::full(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SyncError::Transport { operation, key, .. } => {
            assert_eq!(operation, "put");
            assert_eq!(key, "test1.txt");
        }
        other => panic!("expected Transport, got {other:?}"),
    }
    // Uploads before the failure stay committed; nothing after it runs.
    assert_eq!(store.keys(), vec!["subdir/test3.txt"]);
}

#[tokio::test]
async fn test_list_failure_aborts_before_any_upload() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    store.fail("list", "");

    let err = engine(&store)
        .sync(tree.path(), "", SyncOptions::incremental(true), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Transport { operation: "list", .. }));
    assert!(store.puts().is_empty());
}

#[tokio::test]
async fn test_head_failure_aborts() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    store.insert("test2.txt", b"x", Utc::now());
    store.fail("head", "test2.txt");

    let err = engine(&store)
        .sync(tree.path(), "", SyncOptions::incremental(true), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Transport { operation: "head", .. }));
    assert!(store.puts().is_empty());
}

#[tokio::test]
async fn test_cancelled_run_reports_cancellation() {
    let store = MemoryStore::new();
    let tree = common::sample_tree();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine(&store)
        .sync(tree.path(), "", SyncOptions::full(), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(store.puts().is_empty());
}
