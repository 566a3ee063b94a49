//! Object store port (driven/secondary port)
//!
//! The store is treated as an abstract key-value blob store. Transport,
//! authentication and retries are the adapter's business.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific.
//!   The one error callers need to recognise is a missing key, reported as
//!   [`ObjectNotFound`] and detected with [`is_not_found`].
//! - `list` returns every key under the prefix. Adapters must aggregate all
//!   pages before returning.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StoreConfig;

/// Metadata returned by [`IObjectStore::head`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Key of the object
    pub key: String,
    /// When the stored object was last written
    pub last_modified: DateTime<Utc>,
    /// Size in bytes
    pub size: u64,
}

/// Error returned by adapters when a key does not exist.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Object not found: {key}")]
pub struct ObjectNotFound {
    pub key: String,
}

impl ObjectNotFound {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Returns true if `err` (or anything in its chain) is an [`ObjectNotFound`].
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<ObjectNotFound>())
}

/// Port trait for object storage operations
///
/// Keys are `/`-separated strings without a leading slash.
#[async_trait]
pub trait IObjectStore: Send + Sync {
    /// Stores `data` under `key`, replacing any existing object
    ///
    /// # Arguments
    /// * `key` - Object key
    /// * `data` - Full object contents
    async fn put(&self, key: &str, data: Bytes) -> anyhow::Result<()>;

    /// Reads the full contents of `key`
    ///
    /// # Errors
    /// Fails with [`ObjectNotFound`] when the key does not exist
    async fn get(&self, key: &str) -> anyhow::Result<Bytes>;

    /// Lists every key under `prefix`
    ///
    /// An empty prefix lists the whole store.
    ///
    /// # Returns
    /// All matching keys, aggregated across pages, in no particular order
    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>>;

    /// Fetches metadata for `key`
    ///
    /// # Errors
    /// Fails with [`ObjectNotFound`] when the key does not exist
    async fn head(&self, key: &str) -> anyhow::Result<ObjectMetadata>;

    /// Deletes `key`
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Opens object store clients for resolved store configurations
///
/// Each schedule may resolve to different credentials or a different bucket,
/// so clients are built per run rather than shared.
pub trait IObjectStoreFactory: Send + Sync {
    /// Builds a client for `config`
    ///
    /// # Errors
    /// Fails when `config` lacks a field the backend needs
    fn open(&self, config: &StoreConfig) -> anyhow::Result<Arc<dyn IObjectStore>>;
}
