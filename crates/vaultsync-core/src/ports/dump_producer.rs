//! Dump producer port
//!
//! Produces a logical dump of a database. The orchestrator uploads whatever
//! bytes come back; the format is opaque to it.

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::DatabaseConfig;

/// Port trait for producing database dumps
#[async_trait]
pub trait IDumpProducer: Send + Sync {
    /// Dumps the database described by `database`
    ///
    /// # Arguments
    /// * `database` - Fully resolved connection settings
    ///
    /// # Returns
    /// The complete dump contents
    async fn produce(&self, database: &DatabaseConfig) -> anyhow::Result<Bytes>;
}
