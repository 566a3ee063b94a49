//! Schedule commands - list, add and remove backup schedules
//!
//! Edits go through a [`ScheduleRegistry`] built from the config file and are
//! written back with an explicit save. The environment overlay is never
//! applied here so env-only secrets don't end up on disk.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use vaultsync_core::domain::{BackupTarget, DatabaseTarget, DirectoryTarget, Schedule, ScheduleKind};

use super::{CommandContext, PrefixFor, StorageOverrideArgs};
use crate::output::count;

/// Manage backup schedules
#[derive(Debug, Subcommand)]
pub enum ScheduleCommand {
    /// List configured schedules
    List {
        /// Only show schedules of this kind (db or dir)
        #[arg(long)]
        kind: Option<ScheduleKind>,
    },
    /// Add or replace a database backup schedule
    AddDb(AddDbArgs),
    /// Add or replace a directory backup schedule
    AddDir(AddDirArgs),
    /// Remove a schedule
    Remove {
        /// Schedule name
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct AddDbArgs {
    /// Schedule name
    pub name: String,

    /// Cron expression or alias (e.g. "0 2 * * *", "daily")
    pub expression: String,

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

    /// Database password
    #[arg(long)]
    pub password: Option<String>,

    #[command(flatten)]
    pub storage: StorageOverrideArgs,
}

#[derive(Debug, Args)]
pub struct AddDirArgs {
    /// Schedule name
    pub name: String,

    /// Cron expression or alias (e.g. "*/15 * * * *", "@hourly")
    pub expression: String,

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

impl AddDbArgs {
    fn to_schedule(&self) -> Schedule {
        let target = DatabaseTarget {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            name: self.db_name.clone(),
        };
        with_override(
            Schedule::new(&self.name, &self.expression, BackupTarget::Database(target)),
            &self.storage,
            PrefixFor::Database,
        )
    }
}

impl AddDirArgs {
    fn to_schedule(&self) -> Schedule {
        let target = DirectoryTarget::new(self.source.clone(), self.sync, self.delete);
        with_override(
            Schedule::new(&self.name, &self.expression, BackupTarget::Directory(target)),
            &self.storage,
            PrefixFor::Directory,
        )
    }
}

fn with_override(
    schedule: Schedule,
    storage: &StorageOverrideArgs,
    prefix_for: PrefixFor,
) -> Schedule {
    match storage.to_partial(prefix_for) {
        Some(partial) => schedule.with_storage(partial),
        None => schedule,
    }
}

impl ScheduleCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            ScheduleCommand::List { kind } => list(ctx, *kind),
            ScheduleCommand::AddDb(args) => add(ctx, args.to_schedule()),
            ScheduleCommand::AddDir(args) => add(ctx, args.to_schedule()),
            ScheduleCommand::Remove { name } => remove(ctx, name),
        }
    }
}

fn list(ctx: &CommandContext, kind: Option<ScheduleKind>) -> Result<()> {
    let formatter = ctx.formatter();
    let registry = ctx.load_file_config()?.registry();
    let schedules = match kind {
        Some(kind) => registry.list_by_kind(kind),
        None => registry.list(),
    };

    if ctx.is_json() {
        let json = serde_json::to_value(&schedules).context("Failed to serialize schedules")?;
        formatter.print_json(&json);
        return Ok(());
    }

    if schedules.is_empty() {
        formatter.success("No schedules configured");
        return Ok(());
    }

    formatter.success(&count(schedules.len(), "schedule"));
    let width = schedules.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for schedule in &schedules {
        let overrides = if schedule.storage.is_some() {
            " (storage override)"
        } else {
            ""
        };
        formatter.info(&format!(
            "{:<width$}  {:<14}  {}{}",
            schedule.name, schedule.expression, schedule.target, overrides
        ));
    }
    Ok(())
}

fn add(ctx: &CommandContext, schedule: Schedule) -> Result<()> {
    let replaced = upsert_schedule(ctx, schedule.clone())?;

    let formatter = ctx.formatter();
    let action = if replaced { "Updated" } else { "Added" };
    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "action": action.to_lowercase(),
            "name": schedule.name,
            "kind": schedule.kind().to_string(),
        }));
    } else {
        formatter.success(&format!(
            "{} {} schedule '{}' ({})",
            action,
            schedule.kind(),
            schedule.name,
            schedule.expression
        ));
    }
    Ok(())
}

/// Validates and saves `schedule`, replacing one with the same name.
///
/// Returns `true` if an existing schedule was replaced.
fn upsert_schedule(ctx: &CommandContext, schedule: Schedule) -> Result<bool> {
    schedule
        .cron()
        .with_context(|| format!("Schedule '{}' has an invalid expression", schedule.name))?;
    if let BackupTarget::Directory(dir) = &schedule.target {
        anyhow::ensure!(
            !dir.source_path.as_os_str().is_empty(),
            "Directory schedule '{}' needs a source path",
            schedule.name
        );
    }

    let mut config = ctx.load_file_config()?;
    let registry = config.registry();
    let replaced = registry.upsert(schedule);
    config.set_schedules(&registry);
    ctx.save_config(&config)?;
    Ok(replaced)
}

fn remove(ctx: &CommandContext, name: &str) -> Result<()> {
    let removed = remove_schedule(ctx, name)?;

    let formatter = ctx.formatter();
    if ctx.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "action": "removed",
            "name": removed.name,
        }));
    } else {
        formatter.success(&format!("Removed schedule '{}'", removed.name));
    }
    Ok(())
}

fn remove_schedule(ctx: &CommandContext, name: &str) -> Result<Schedule> {
    let mut config = ctx.load_file_config()?;
    let registry = config.registry();
    let removed = registry.remove(name)?;
    config.set_schedules(&registry);
    ctx.save_config(&config)?;
    Ok(removed)
}
