//! Vaultsync Sync - directory mirroring and scheduled backups
//!
//! Provides:
//! - One-way incremental mirroring of a local tree into an object store
//! - Independent cron-style timers per backup schedule
//! - Dispatch of fired schedules to directory sync or database dumps
//!
//! ## Modules
//!
//! - [`engine`] - Directory sync engine (classify, then upload and delete)
//! - [`scheduler`] - Schedule trigger engine (one timer task per schedule)
//! - [`orchestrator`] - Resolves per-schedule overrides and runs backups
//! - [`dump`] - `pg_dump` based dump producer

pub mod dump;
pub mod engine;
pub mod orchestrator;
pub mod scheduler;

use std::path::PathBuf;

use thiserror::Error;
use vaultsync_core::domain::errors::DomainError;

pub use dump::PgDumpProducer;
pub use engine::{
    DirectorySyncEngine, PlannedUpload, RemoteObjectIndex, SyncOptions, SyncPlan, SyncReport,
    UploadReason,
};
pub use orchestrator::{BackupOrchestrator, BackupOutcome, DatabaseBackupReport};
pub use scheduler::{FireHandler, Firing, ScheduleTriggerEngine};

/// Errors that can occur during backup operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local source directory does not exist
    #[error("Source path not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// The local source exists but is not a directory
    #[error("Source path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// An object store call failed
    #[error("Object store {operation} failed for '{key}': {source:#}")]
    Transport {
        /// One of `open`, `put`, `get`, `list`, `head`, `delete`
        operation: &'static str,
        /// Key (or prefix, for `list`) the call was made for
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Reading the local tree failed
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The trigger engine is already running
    #[error("Schedule trigger engine is already running")]
    AlreadyRunning,

    /// A domain-level error propagated from vaultsync-core
    #[error("Configuration error: {0}")]
    Config(#[from] DomainError),

    /// The dump producer failed
    #[error("Database dump failed: {0:#}")]
    Dump(#[source] anyhow::Error),
}

impl SyncError {
    pub(crate) fn transport(
        operation: &'static str,
        key: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::Transport {
            operation,
            key: key.into(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error came from cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
