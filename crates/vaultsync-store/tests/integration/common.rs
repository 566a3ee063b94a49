//! Shared helpers for store integration tests

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use vaultsync_core::config::StoreConfig;
use vaultsync_core::ports::{IObjectStore, IObjectStoreFactory};
use vaultsync_store::StoreFactory;

/// Store config rooted at a temporary directory.
pub fn local_config(root: &Path, bucket: &str) -> StoreConfig {
    StoreConfig {
        region: "local".into(),
        bucket: bucket.into(),
        endpoint: format!("file://{}", root.display()),
        ..Default::default()
    }
}

/// Opens a local store in a fresh temporary directory.
pub fn local_store(bucket: &str) -> (TempDir, Arc<dyn IObjectStore>) {
    let root = tempfile::tempdir().unwrap();
    let store = StoreFactory::new()
        .open(&local_config(root.path(), bucket))
        .unwrap();
    (root, store)
}

pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Pushes a file's modification time an hour into the future.
pub fn touch_future(root: &Path, relative: &str) {
    let file = fs::File::options()
        .write(true)
        .open(root.join(relative))
        .unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(3600))
        .unwrap();
}

/// `test1.txt`, `test2.txt` and `subdir/test3.txt`.
pub fn sample_tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "test1.txt", "one");
    write_file(dir.path(), "test2.txt", "two");
    write_file(dir.path(), "subdir/test3.txt", "three");
    dir
}

pub async fn sorted_keys(store: &Arc<dyn IObjectStore>, prefix: &str) -> Vec<String> {
    let mut keys = store.list(prefix).await.unwrap();
    keys.sort();
    keys
}
