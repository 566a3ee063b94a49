//! Worker command - runs scheduled backups in the foreground
//!
//! Starts one timer per configured schedule and dispatches each firing to the
//! backup orchestrator. Runs until SIGINT or SIGTERM; on SIGHUP the schedules
//! are re-read from the config file and the timers restarted.
//!
//! Shutdown order: stop the timers so nothing new fires, then cancel the
//! token shared by in-flight runs.

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vaultsync_core::config::Config;
use vaultsync_core::domain::ScheduleRegistry;
use vaultsync_sync::ScheduleTriggerEngine;

use super::{build_orchestrator, CommandContext};
use crate::output::{count, OutputFormatter};

#[derive(Debug, Args)]
pub struct WorkerCommand {
    /// Dump program to run instead of `pg_dump`
    #[arg(long)]
    pub pg_dump: Option<String>,
}

impl WorkerCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        check_config(&config, formatter.as_ref())?;

        let registry = Arc::new(config.registry());
        let runs = CancellationToken::new();
        let orchestrator = Arc::new(build_orchestrator(
            &config,
            self.pg_dump.as_deref(),
            runs.clone(),
        ));

        let engine = ScheduleTriggerEngine::new(Arc::clone(&registry));
        let active = engine.start(orchestrator)?;
        info!(schedules = active, config_path = %ctx.config_path().display(), "Worker started");
        formatter.success(&format!("Worker running {}", count(active, "schedule")));
        if active == 0 {
            formatter.warn("No schedules are configured");
        }

        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(shutdown_signal(signal_token));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = reload_signal() => {
                    reload_schedules(ctx, &registry, &engine);
                }
            }
        }

        engine.stop();
        runs.cancel();
        info!("Worker stopped");
        formatter.success("Worker stopped");
        Ok(())
    }
}

/// Fails on configuration errors; schedules with a bad expression are only
/// reported, the trigger engine skips them on start.
fn check_config(config: &Config, formatter: &dyn OutputFormatter) -> Result<()> {
    let errors = config.validate();
    if !errors.is_empty() {
        for err in &errors {
            formatter.error(&err.to_string());
        }
        bail!("Configuration is invalid ({})", count(errors.len(), "error"));
    }

    for warning in config.schedule_warnings() {
        formatter.warn(&format!("{warning}, schedule will not run"));
    }
    Ok(())
}

/// Re-reads the schedules and restarts the timers.
///
/// A config that fails to load or validate leaves the running schedules
/// untouched. Changes to the base `storage` or `database` sections need a
/// restart.
fn reload_schedules(
    ctx: &CommandContext,
    registry: &ScheduleRegistry,
    engine: &ScheduleTriggerEngine,
) {
    let config = match ctx.load_config() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %format!("{err:#}"), "Reload failed, keeping current schedules");
            return;
        }
    };

    let errors = config.validate();
    if !errors.is_empty() {
        for err in &errors {
            warn!(field = %err.field, message = %err.message, "Invalid configuration");
        }
        error!(errors = errors.len(), "Reload rejected, keeping current schedules");
        return;
    }
    for warning in config.schedule_warnings() {
        warn!(field = %warning.field, message = %warning.message, "Schedule will not run");
    }

    registry.replace_all(config.schedules);
    match engine.reload() {
        Ok(active) => info!(schedules = active, "Schedules reloaded"),
        Err(err) => error!(error = %err, "Failed to restart schedules"),
    }
}

/// Waits for SIGINT or SIGTERM, then cancels `token`.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

/// Resolves on SIGHUP; never resolves elsewhere.
async fn reload_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::hangup()) {
            Ok(mut hangup) => {
                hangup.recv().await;
                info!("Received SIGHUP");
                return;
            }
            Err(err) => warn!(error = %err, "Failed to install SIGHUP handler"),
        }
    }
    std::future::pending::<()>().await;
}
