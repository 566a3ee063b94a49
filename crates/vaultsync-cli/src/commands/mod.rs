//! CLI subcommands and the state they share

pub mod backup;
pub mod completions;
pub mod config;
pub mod schedule;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use vaultsync_core::config::{Config, PartialStoreConfig};
use vaultsync_store::StoreFactory;
use vaultsync_sync::{BackupOrchestrator, PgDumpProducer};

use crate::output::{formatter_for, OutputFormat, OutputFormatter};

/// Global options every command sees
#[derive(Debug, Clone)]
pub struct CommandContext {
    config_path: PathBuf,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl CommandContext {
    pub fn new(config_path: Option<PathBuf>, format: OutputFormat, quiet: bool) -> Self {
        Self {
            config_path: config_path.unwrap_or_else(Config::default_path),
            format,
            quiet,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        formatter_for(self.format, self.quiet)
    }

    /// Loads the config file with the environment overlay applied.
    ///
    /// Used by commands that run backups. Never save the result, it may carry
    /// secrets that only exist in the environment.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = self.load_file_config()?;
        config
            .apply_env()
            .context("Invalid VAULTSYNC_ environment variable")?;
        Ok(config)
    }

    /// Loads the config file exactly as written on disk.
    pub fn load_file_config(&self) -> Result<Config> {
        let config = Config::load_or_default(&self.config_path)?;
        debug!(config_path = %self.config_path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        config.save(&self.config_path)?;
        info!(config_path = %self.config_path.display(), "Saved configuration");
        Ok(())
    }
}

/// Wires the store and dump adapters into an orchestrator.
pub fn build_orchestrator(
    config: &Config,
    pg_dump: Option<&str>,
    cancel: CancellationToken,
) -> BackupOrchestrator {
    let dumper = match pg_dump {
        Some(program) => PgDumpProducer::new(program),
        None => PgDumpProducer::default(),
    };
    BackupOrchestrator::new(
        config,
        Arc::new(StoreFactory::new()),
        Arc::new(dumper),
        cancel,
    )
}

/// Storage settings that override the base `storage` section
#[derive(Debug, Clone, Default, Args)]
pub struct StorageOverrideArgs {
    /// Bucket to back up into
    #[arg(long)]
    pub bucket: Option<String>,

    /// Bucket region
    #[arg(long)]
    pub region: Option<String>,

    /// Access key id
    #[arg(long)]
    pub access_key_id: Option<String>,

    /// Secret access key
    #[arg(long)]
    pub secret_access_key: Option<String>,

    /// Key prefix for the backup objects
    #[arg(long)]
    pub prefix: Option<String>,

    /// Custom S3-compatible endpoint, `file://<dir>` or `memory://`
    #[arg(long)]
    pub endpoint: Option<String>,
}

/// Which prefix field `--prefix` sets.
#[derive(Debug, Clone, Copy)]
pub enum PrefixFor {
    Database,
    Directory,
}

impl StorageOverrideArgs {
    /// Builds the override, or `None` when no flag was given.
    pub fn to_partial(&self, prefix_for: PrefixFor) -> Option<PartialStoreConfig> {
        let (database_prefix, directory_prefix) = match prefix_for {
            PrefixFor::Database => (self.prefix.clone(), None),
            PrefixFor::Directory => (None, self.prefix.clone()),
        };
        let partial = PartialStoreConfig {
            region: self.region.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            bucket: self.bucket.clone(),
            database_prefix,
            directory_prefix,
            endpoint: self.endpoint.clone(),
        };
        (partial != PartialStoreConfig::default()).then_some(partial)
    }
}
