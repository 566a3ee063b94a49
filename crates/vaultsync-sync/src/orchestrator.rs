//! Backup orchestrator
//!
//! Binds a backup target to the component that performs it. Each run
//! resolves the per-schedule storage override against the base storage
//! config, opens a store client for the result and then runs either the
//! [`DirectorySyncEngine`] or a database dump.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vaultsync_core::config::{Config, DatabaseConfig, PartialStoreConfig, StoreConfig};
use vaultsync_core::domain::{object_key, BackupTarget, DatabaseTarget, DirectoryTarget, DomainError};
use vaultsync_core::ports::{IDumpProducer, IObjectStore, IObjectStoreFactory};

use crate::engine::{cancellable, DirectorySyncEngine, SyncOptions, SyncReport};
use crate::scheduler::{FireHandler, Firing};
use crate::SyncError;

/// Timestamp layout used in dump object names.
const DUMP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Object key for a dump of `database` taken at `at`.
///
/// ```
/// use chrono::{Local, TimeZone};
/// use vaultsync_sync::orchestrator::dump_key;
///
/// let at = Local.with_ymd_and_hms(2024, 3, 1, 4, 5, 6).unwrap();
/// assert_eq!(dump_key("db", "app", &at), "db/app_2024-03-01_04-05-06.sql");
/// ```
pub fn dump_key<Tz: TimeZone>(prefix: &str, database: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let name = format!("{database}_{}.sql", at.format(DUMP_TIMESTAMP_FORMAT));
    object_key(prefix, &name)
}

/// Outcome of a database backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseBackupReport {
    pub database: String,
    pub key: String,
    pub bytes: u64,
    pub duration_ms: u64,
}

/// Outcome of any backup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackupOutcome {
    Database(DatabaseBackupReport),
    Directory(SyncReport),
}

/// Runs backups against resolved configuration.
///
/// Holds the base store and database settings; everything else is per run.
pub struct BackupOrchestrator {
    storage: StoreConfig,
    database: DatabaseConfig,
    stores: Arc<dyn IObjectStoreFactory>,
    dumper: Arc<dyn IDumpProducer>,
    cancel: CancellationToken,
}

impl BackupOrchestrator {
    /// Creates an orchestrator
    ///
    /// # Arguments
    /// * `config` - Source of the base storage and database settings
    /// * `stores` - Opens a store client per resolved storage config
    /// * `dumper` - Produces database dumps
    /// * `cancel` - Cancels in-flight runs when triggered
    pub fn new(
        config: &Config,
        stores: Arc<dyn IObjectStoreFactory>,
        dumper: Arc<dyn IDumpProducer>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            storage: config.storage.clone(),
            database: config.database.clone(),
            stores,
            dumper,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn open_store(&self, storage: &StoreConfig) -> Result<Arc<dyn IObjectStore>, SyncError> {
        self.stores
            .open(storage)
            .map_err(|e| SyncError::transport("open", storage.bucket.as_str(), e))
    }

    /// Runs whichever backup `target` describes.
    pub async fn run(
        &self,
        target: &BackupTarget,
        storage: Option<&PartialStoreConfig>,
    ) -> Result<BackupOutcome, SyncError> {
        match target {
            BackupTarget::Database(db) => self
                .backup_database(db, storage)
                .await
                .map(BackupOutcome::Database),
            BackupTarget::Directory(dir) => self
                .backup_directory(dir, storage)
                .await
                .map(BackupOutcome::Directory),
        }
    }

    /// Mirrors a directory under the resolved directory prefix.
    #[tracing::instrument(skip(self, target, storage), fields(source = %target.source_path.display()))]
    pub async fn backup_directory(
        &self,
        target: &DirectoryTarget,
        storage: Option<&PartialStoreConfig>,
    ) -> Result<SyncReport, SyncError> {
        let resolved = self.storage.resolve(storage);
        let store = self.open_store(&resolved)?;
        let options = SyncOptions {
            sync: target.sync,
            delete_orphans: target.delete_orphans,
        };

        DirectorySyncEngine::new(store)
            .sync(
                &target.source_path,
                &resolved.directory_prefix,
                options,
                &self.cancel,
            )
            .await
    }

    /// Dumps a database and uploads the dump
    ///
    /// The object is stored at `{database_prefix}/{name}_{timestamp}.sql`
    /// using the local time of the run.
    ///
    /// # Errors
    /// [`SyncError::Config`] if no database name resolves,
    /// [`SyncError::Dump`] if the dump fails, [`SyncError::Transport`] if the
    /// upload fails.
    #[tracing::instrument(skip(self, target, storage))]
    pub async fn backup_database(
        &self,
        target: &DatabaseTarget,
        storage: Option<&PartialStoreConfig>,
    ) -> Result<DatabaseBackupReport, SyncError> {
        let start = Instant::now();
        let database = self.database.resolve(Some(target));
        if database.name.trim().is_empty() {
            return Err(DomainError::config("database.name", "is required for a database backup").into());
        }

        let resolved = self.storage.resolve(storage);
        let store = self.open_store(&resolved)?;

        info!(
            database = %database.name,
            host = %database.host,
            port = database.port,
            "Starting database backup"
        );

        let dump = cancellable(&self.cancel, async {
            self.dumper.produce(&database).await.map_err(SyncError::Dump)
        })
        .await?;

        let key = dump_key(&resolved.database_prefix, &database.name, &Local::now());
        let bytes = dump.len() as u64;

        cancellable(&self.cancel, async {
            store
                .put(&key, dump)
                .await
                .map_err(|e| SyncError::transport("put", key.as_str(), e))
        })
        .await?;

        let report = DatabaseBackupReport {
            database: database.name,
            key,
            bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            database = %report.database,
            key = %report.key,
            bytes = report.bytes,
            duration_ms = report.duration_ms,
            "Database backup finished"
        );
        Ok(report)
    }
}

/// Cancellation during shutdown is not a failure of the schedule.
fn firing_result<T>(firing: &Firing, result: Result<T, SyncError>) -> anyhow::Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.is_cancelled() => {
            info!(name = %firing.schedule, "Scheduled backup cancelled");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

#[async_trait]
impl FireHandler for BackupOrchestrator {
    async fn on_database_fire(
        &self,
        firing: &Firing,
        target: &DatabaseTarget,
    ) -> anyhow::Result<()> {
        let result = self.backup_database(target, firing.storage.as_ref()).await;
        firing_result(firing, result)
    }

    async fn on_directory_fire(
        &self,
        firing: &Firing,
        target: &DirectoryTarget,
    ) -> anyhow::Result<()> {
        let result = self.backup_directory(target, firing.storage.as_ref()).await;
        firing_result(firing, result)
    }
}
