//! One-shot backup commands
//!
//! - `vaultsync db backup` dumps a database and uploads the dump
//! - `vaultsync dir backup` mirrors a directory into the bucket
//!
//! Both resolve the given storage flags over the configured `storage`
//! section, exactly as a scheduled run resolves its schedule's override.
//! Ctrl+C cancels the run.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use vaultsync_core::domain::{DatabaseTarget, DirectoryTarget};
use vaultsync_sync::{DatabaseBackupReport, SyncReport};

use super::worker::shutdown_signal;
use super::{build_orchestrator, CommandContext, PrefixFor, StorageOverrideArgs};
use crate::output::{count, format_duration, OutputFormatter};

// ============================================================================
// vaultsync db
// ============================================================================

#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Dump a database and upload the dump
    Backup(DbBackupArgs),
}

#[derive(Debug, Args)]
pub struct DbBackupArgs {
    /// Database to dump (defaults to `database.name`)
    #[arg(long)]
    pub db_name: Option<String>,

    /// Database host
    #[arg(long)]
    pub host: Option<String>,

    /// Database port
    #[arg(long)]
    pub port: Option<u16>,

    /// Database user
    #[arg(long)]
    pub user: Option<String>,

    /// Dump program to run instead of `pg_dump`
    #[arg(long)]
    pub pg_dump: Option<String>,

    #[command(flatten)]
    pub storage: StorageOverrideArgs,
}

impl DbBackupArgs {
    fn target(&self) -> DatabaseTarget {
        DatabaseTarget {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: None,
            name: self.db_name.clone(),
        }
    }
}

impl DbCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            DbCommand::Backup(args) => db_backup(args, ctx).await,
        }
    }
}

async fn db_backup(args: &DbBackupArgs, ctx: &CommandContext) -> Result<()> {
    let config = ctx.load_config()?;
    let cancel = cancel_on_signal();
    let orchestrator = build_orchestrator(&config, args.pg_dump.as_deref(), cancel);

    let storage = args.storage.to_partial(PrefixFor::Database);
    let report = orchestrator
        .backup_database(&args.target(), storage.as_ref())
        .await?;

    print_db_report(&report, ctx);
    Ok(())
}

fn print_db_report(report: &DatabaseBackupReport, ctx: &CommandContext) {
    let formatter = ctx.formatter();
    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "database": report.database,
            "key": report.key,
            "bytes": report.bytes,
            "duration_ms": report.duration_ms,
        }));
        return;
    }

    formatter.success(&format!(
        "Backed up database '{}' in {}",
        report.database,
        format_duration(report.duration_ms)
    ));
    formatter.info(&format!("Object: {}", report.key));
    formatter.info(&format!("Size:   {} bytes", report.bytes));
}

// ============================================================================
// vaultsync dir
// ============================================================================

#[derive(Debug, Subcommand)]
pub enum DirCommand {
    /// Mirror a directory into the bucket
    Backup(DirBackupArgs),
}

#[derive(Debug, Args)]
pub struct DirBackupArgs {
    /// Directory to back up
    #[arg(long)]
    pub source: PathBuf,

    /// Only upload files that are new or newer than their stored copy
    #[arg(long)]
    pub sync: bool,

    /// With --sync, delete stored objects that no longer exist locally
    #[arg(long)]
    pub delete: bool,

    #[command(flatten)]
    pub storage: StorageOverrideArgs,
}

impl DirCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            DirCommand::Backup(args) => dir_backup(args, ctx).await,
        }
    }
}

async fn dir_backup(args: &DirBackupArgs, ctx: &CommandContext) -> Result<()> {
    if args.delete && !args.sync {
        ctx.formatter().warn("--delete has no effect without --sync");
    }

    let config = ctx.load_config()?;
    let cancel = cancel_on_signal();
    let orchestrator = build_orchestrator(&config, None, cancel);

    let target = DirectoryTarget::new(args.source.clone(), args.sync, args.delete);
    let storage = args.storage.to_partial(PrefixFor::Directory);
    let report = orchestrator
        .backup_directory(&target, storage.as_ref())
        .await?;

    print_dir_report(&report, ctx);
    Ok(())
}

fn print_dir_report(report: &SyncReport, ctx: &CommandContext) {
    let formatter = ctx.formatter();
    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "uploaded": report.uploaded.len(),
            "skipped": report.skipped.len(),
            "deleted": report.deleted.len(),
            "orphans_kept": report.orphans_kept,
            "duration_ms": report.duration_ms,
        }));
        return;
    }

    if report.uploaded.is_empty() && report.deleted.is_empty() {
        formatter.success("Already up to date");
    } else {
        formatter.success(&format!(
            "Backup completed in {}",
            format_duration(report.duration_ms)
        ));
    }
    print_counts(formatter.as_ref(), report);
}

fn print_counts(formatter: &dyn OutputFormatter, report: &SyncReport) {
    if !report.uploaded.is_empty() {
        formatter.info(&format!("Uploaded: {}", count(report.uploaded.len(), "file")));
    }
    if !report.skipped.is_empty() {
        formatter.info(&format!("Skipped:  {}", count(report.skipped.len(), "file")));
    }
    if !report.deleted.is_empty() {
        formatter.info(&format!("Deleted:  {}", count(report.deleted.len(), "object")));
    }
    if report.orphans_kept > 0 {
        formatter.info(&format!(
            "Kept:     {} not present locally",
            count(report.orphans_kept, "object")
        ));
    }
}

/// Token cancelled on SIGINT or SIGTERM.
fn cancel_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
        info!("Cancelling backup");
    });
    token
}
