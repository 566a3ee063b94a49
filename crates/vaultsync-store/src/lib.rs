//! Vaultsync Store - object storage adapter
//!
//! Implements the [`IObjectStore`](vaultsync_core::ports::IObjectStore) port
//! on top of the `object_store` crate, for:
//! - Amazon S3 and S3-compatible services (custom endpoint)
//! - A directory on the local filesystem (`file://` endpoint)
//! - A process-local in-memory store (`memory://` endpoint)
//!
//! ## Modules
//!
//! - [`adapter`] - [`ObjectStoreAdapter`], the port implementation
//! - [`factory`] - [`StoreFactory`], builds adapters from a resolved [`StoreConfig`](vaultsync_core::config::StoreConfig)

pub mod adapter;
pub mod factory;

pub use adapter::ObjectStoreAdapter;
pub use factory::StoreFactory;

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while opening a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend builder rejected the configuration
    #[error("Failed to configure {backend} store: {source}")]
    Build {
        /// Backend name (`s3`, `local`)
        backend: &'static str,
        #[source]
        source: object_store::Error,
    },

    /// The root directory of a local store could not be created
    #[error("Cannot create store root {}: {source}", path.display())]
    LocalRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
