//! Config command - view and validate Vaultsync configuration
//!
//! Both subcommands work on the effective configuration: the config file
//! with `VAULTSYNC_*` environment variables applied on top.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tracing::info;

use super::CommandContext;
use crate::output::count;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration (secrets masked)
    Show,
    /// Validate configuration
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(ctx),
            ConfigCommand::Validate => execute_validate(ctx),
        }
    }
}

fn execute_show(ctx: &CommandContext) -> Result<()> {
    let formatter = ctx.formatter();
    let config = ctx.load_config()?.redacted();

    info!(config_path = %ctx.config_path().display(), "Showing configuration");

    if ctx.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
        return Ok(());
    }

    formatter.success(&format!("Configuration ({})", ctx.config_path().display()));
    if !ctx.config_path().exists() {
        formatter.info("(file not found, showing defaults)");
    }
    formatter.info("");

    let yaml =
        serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        formatter.info(line);
    }
    Ok(())
}

fn execute_validate(ctx: &CommandContext) -> Result<()> {
    let formatter = ctx.formatter();
    let config_path = ctx.config_path();
    let config = ctx.load_config()?;

    info!(config_path = %config_path.display(), "Validating configuration");

    let errors = config.validate();
    let warnings = config.schedule_warnings();

    if ctx.is_json() {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        let warning_strings: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
            "warnings": warning_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info(&count(config.schedules.len(), "schedule"));
        for warning in &warnings {
            formatter.warn(&format!("{warning}, schedule will not run"));
        }
    } else {
        formatter.error(&format!("Configuration has {}:", count(errors.len(), "error")));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    if !errors.is_empty() {
        bail!("Configuration is invalid");
    }
    Ok(())
}
