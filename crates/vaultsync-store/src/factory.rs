//! StoreFactory - opens an adapter for a resolved store configuration
//!
//! The backend is chosen by [`StoreConfig::backend`]:
//! - `S3` builds an [`AmazonS3Builder`] client for the bucket and region,
//!   pointed at the custom endpoint when one is set
//! - `Local` roots a [`LocalFileSystem`] at the endpoint path, with the
//!   bucket as a subdirectory
//! - `Memory` returns one shared [`InMemory`] store per bucket, so separate
//!   `open` calls within a process see the same objects

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tracing::{debug, info};

use vaultsync_core::config::{StoreBackend, StoreConfig};
use vaultsync_core::ports::{IObjectStore, IObjectStoreFactory};

use crate::{ObjectStoreAdapter, StoreError};

/// Builds [`ObjectStoreAdapter`]s from [`StoreConfig`]s
#[derive(Debug, Default)]
pub struct StoreFactory {
    memory: Mutex<HashMap<String, Arc<InMemory>>>,
}

impl StoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn s3(storage: &StoreConfig, endpoint: Option<&str>) -> AmazonS3Builder {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&storage.bucket)
            .with_region(&storage.region);

        if let Some(endpoint) = endpoint {
            builder = builder.with_endpoint(endpoint);
            if endpoint.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
        }
        if !storage.access_key_id.is_empty() {
            builder = builder.with_access_key_id(&storage.access_key_id);
        }
        if !storage.secret_access_key.is_empty() {
            builder = builder.with_secret_access_key(&storage.secret_access_key);
        }
        builder
    }

    fn local(root: &Path, bucket: &str) -> Result<LocalFileSystem, StoreError> {
        let dir = if bucket.is_empty() {
            root.to_path_buf()
        } else {
            root.join(bucket)
        };
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::LocalRoot {
            path: dir.clone(),
            source,
        })?;
        LocalFileSystem::new_with_prefix(&dir).map_err(|source| StoreError::Build {
            backend: "local",
            source,
        })
    }

    fn memory(&self, bucket: &str) -> Arc<InMemory> {
        let mut stores = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            stores
                .entry(bucket.to_string())
                .or_insert_with(|| Arc::new(InMemory::new())),
        )
    }

    /// Opens a store, returning the concrete error type
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend cannot be configured
    pub fn open_adapter(&self, storage: &StoreConfig) -> Result<ObjectStoreAdapter, StoreError> {
        let backend = storage.backend();
        let inner: Arc<dyn ObjectStore> = match &backend {
            StoreBackend::S3 { endpoint } => {
                let store = Self::s3(storage, endpoint.as_deref())
                    .build()
                    .map_err(|source| StoreError::Build {
                        backend: "s3",
                        source,
                    })?;
                Arc::new(store)
            }
            StoreBackend::Local(root) => Arc::new(Self::local(root, &storage.bucket)?),
            StoreBackend::Memory => self.memory(&storage.bucket),
        };

        debug!(bucket = %storage.bucket, backend = ?backend, "Opened object store");
        Ok(ObjectStoreAdapter::from_arc(inner))
    }
}

impl IObjectStoreFactory for StoreFactory {
    fn open(&self, storage: &StoreConfig) -> anyhow::Result<Arc<dyn IObjectStore>> {
        let adapter = self.open_adapter(storage)?;
        info!(bucket = %storage.bucket, region = %storage.region, "Store client ready");
        Ok(Arc::new(adapter))
    }
}
