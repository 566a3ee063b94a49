//! ObjectStoreAdapter - IObjectStore implementation over `object_store`
//!
//! ## Design Notes
//!
//! - Keys are converted with `Path::from`, which splits on `/` and drops
//!   empty segments, so `"backups/"` and `"backups"` address the same prefix.
//!   It also percent-encodes characters such as `#` or `%` inside a segment;
//!   keys coming back from `list` and `head` are decoded again, so a listed
//!   key always equals the key it was written with.
//! - Prefix listing matches whole path segments: listing `backups/` never
//!   returns `backups2/...`.
//! - `list` drains the backend's paginated stream before returning.
//! - A missing key is reported as [`ObjectNotFound`]; every other backend
//!   error is passed through unchanged.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use percent_encoding::percent_decode_str;
use tracing::debug;

use vaultsync_core::ports::{IObjectStore, ObjectMetadata, ObjectNotFound};

/// Port adapter wrapping any [`ObjectStore`] backend
#[derive(Debug, Clone)]
pub struct ObjectStoreAdapter {
    inner: Arc<dyn ObjectStore>,
}

impl ObjectStoreAdapter {
    /// Wraps a concrete backend
    pub fn new(store: impl ObjectStore) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an already shared backend
    pub fn from_arc(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// The underlying backend
    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }
}

fn list_path(prefix: &str) -> Option<Path> {
    let path = Path::from(prefix);
    if path.as_ref().is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Key for a backend location, undoing the segment encoding of `Path::from`.
fn to_key(location: &Path) -> String {
    location
        .parts()
        .map(|part| percent_decode_str(part.as_ref()).decode_utf8_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Maps a backend error, turning a missing key into [`ObjectNotFound`].
fn map_err(key: &str, err: object_store::Error) -> anyhow::Error {
    match err {
        object_store::Error::NotFound { .. } => ObjectNotFound::new(key).into(),
        other => other.into(),
    }
}

#[async_trait]
impl IObjectStore for ObjectStoreAdapter {
    #[tracing::instrument(skip(self, data), fields(size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.inner
            .put(&Path::from(key), PutPayload::from(data))
            .await
            .map_err(|e| map_err(key, e))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        let result = self
            .inner
            .get(&Path::from(key))
            .await
            .map_err(|e| map_err(key, e))?;
        result.bytes().await.map_err(|e| map_err(key, e))
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = list_path(prefix);
        let keys: Vec<String> = self
            .inner
            .list(path.as_ref())
            .map_ok(|meta| to_key(&meta.location))
            .try_collect()
            .await?;

        debug!(count = keys.len(), "Listed objects");
        Ok(keys)
    }

    #[tracing::instrument(skip(self))]
    async fn head(&self, key: &str) -> Result<ObjectMetadata> {
        let meta = self
            .inner
            .head(&Path::from(key))
            .await
            .map_err(|e| map_err(key, e))?;

        Ok(ObjectMetadata {
            key: to_key(&meta.location),
            last_modified: meta.last_modified,
            size: meta.size as u64,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.inner
            .delete(&Path::from(key))
            .await
            .map_err(|e| map_err(key, e))
    }
}
