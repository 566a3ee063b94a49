//! Shared test doubles
//!
//! [`MemoryStore`] is an [`IObjectStore`] backed by a map. It records every
//! operation and can be told to fail a specific call.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use vaultsync_core::config::{DatabaseConfig, StoreConfig};
use vaultsync_core::ports::{
    IDumpProducer, IObjectStore, IObjectStoreFactory, ObjectMetadata, ObjectNotFound,
};

/// One recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Put(String),
    Get(String),
    List(String),
    Head(String),
    Delete(String),
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    ops: Mutex<Vec<StoreOp>>,
    failure: Mutex<Option<(&'static str, String)>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seeds an object without recording an operation.
    pub fn insert(&self, key: &str, data: &[u8], last_modified: DateTime<Utc>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: Bytes::copy_from_slice(data),
                last_modified,
            },
        );
    }

    pub fn set_last_modified(&self, key: &str, last_modified: DateTime<Utc>) {
        let mut objects = self.objects.lock().unwrap();
        objects.get_mut(key).expect("object exists").last_modified = last_modified;
    }

    pub fn content(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).map(|o| o.data.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Keys written by `put`, sorted.
    pub fn puts(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Put(key) => Some(key),
                _ => None,
            })
            .collect();
        keys.sort();
        keys
    }

    /// Keys removed by `delete`, sorted.
    pub fn deletes(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Delete(key) => Some(key),
                _ => None,
            })
            .collect();
        keys.sort();
        keys
    }

    /// Makes the next `operation` call on `key` fail.
    pub fn fail(&self, operation: &'static str, key: &str) {
        *self.failure.lock().unwrap() = Some((operation, key.to_string()));
    }

    fn record(&self, op: StoreOp) -> anyhow::Result<()> {
        let (name, key) = match &op {
            StoreOp::Put(k) => ("put", k),
            StoreOp::Get(k) => ("get", k),
            StoreOp::List(k) => ("list", k),
            StoreOp::Head(k) => ("head", k),
            StoreOp::Delete(k) => ("delete", k),
        };
        let injected = {
            let mut failure = self.failure.lock().unwrap();
            let hit = matches!(
                failure.as_ref(),
                Some((op_name, op_key)) if *op_name == name && op_key == key
            );
            if hit {
                failure.take()
            } else {
                None
            }
        };
        self.ops.lock().unwrap().push(op.clone());
        match injected {
            Some(_) => Err(anyhow!("injected {name} failure")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: Bytes) -> anyhow::Result<()> {
        self.record(StoreOp::Put(key.to_string()))?;
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Bytes> {
        self.record(StoreOp::Get(key.to_string()))?;
        self.content(key)
            .ok_or_else(|| ObjectNotFound::new(key).into())
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.record(StoreOp::List(prefix.to_string()))?;
        Ok(self
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    async fn head(&self, key: &str) -> anyhow::Result<ObjectMetadata> {
        self.record(StoreOp::Head(key.to_string()))?;
        let objects = self.objects.lock().unwrap();
        let object = objects.get(key).ok_or_else(|| ObjectNotFound::new(key))?;
        Ok(ObjectMetadata {
            key: key.to_string(),
            last_modified: object.last_modified,
            size: object.data.len() as u64,
        })
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.record(StoreOp::Delete(key.to_string()))?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Hands out the same [`MemoryStore`] for every config and remembers which
/// configs were opened.
pub struct MemoryStoreFactory {
    pub store: Arc<MemoryStore>,
    pub opened: Mutex<Vec<StoreConfig>>,
}

impl MemoryStoreFactory {
    pub fn new(store: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(&self) -> Vec<StoreConfig> {
        self.opened.lock().unwrap().clone()
    }
}

impl IObjectStoreFactory for MemoryStoreFactory {
    fn open(&self, config: &StoreConfig) -> anyhow::Result<Arc<dyn IObjectStore>> {
        if config.bucket.is_empty() {
            return Err(anyhow!("bucket is required"));
        }
        self.opened.lock().unwrap().push(config.clone());
        Ok(self.store.clone())
    }
}

/// Dump producer returning a canned dump, or failing.
pub struct FakeDumper {
    pub result: Result<&'static [u8], &'static str>,
    pub seen: Mutex<Vec<DatabaseConfig>>,
}

impl FakeDumper {
    pub fn ok(data: &'static [u8]) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(data),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl IDumpProducer for FakeDumper {
    async fn produce(&self, database: &DatabaseConfig) -> anyhow::Result<Bytes> {
        self.seen.lock().unwrap().push(database.clone());
        match self.result {
            Ok(data) => Ok(Bytes::from_static(data)),
            Err(message) => Err(anyhow!(message)),
        }
    }
}

/// Writes `contents` at `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Local modification time of `root/relative`.
pub fn local_mtime(root: &Path, relative: &str) -> DateTime<Utc> {
    std::fs::metadata(root.join(relative))
        .unwrap()
        .modified()
        .unwrap()
        .into()
}

/// Creates the three-file tree used by most scenarios.
pub fn sample_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "test1.txt", "one");
    write_file(dir.path(), "test2.txt", "two");
    write_file(dir.path(), "subdir/test3.txt", "three");
    dir
}
