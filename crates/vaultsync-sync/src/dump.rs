//! `pg_dump` dump producer
//!
//! Runs `pg_dump -h <host> -p <port> -U <user> -F p <name>` with the password
//! passed through `PGPASSWORD` and returns the plain SQL written to stdout.

use std::process::Stdio;

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::debug;

use vaultsync_core::config::DatabaseConfig;
use vaultsync_core::ports::IDumpProducer;

/// Program run when none is configured.
pub const DEFAULT_PG_DUMP: &str = "pg_dump";

/// Produces plain-format dumps by running `pg_dump`.
#[derive(Debug, Clone)]
pub struct PgDumpProducer {
    program: String,
}

impl Default for PgDumpProducer {
    fn default() -> Self {
        Self::new(DEFAULT_PG_DUMP)
    }
}

impl PgDumpProducer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn args(database: &DatabaseConfig) -> Vec<String> {
        vec![
            "-h".to_string(),
            database.host.clone(),
            "-p".to_string(),
            database.port.to_string(),
            "-U".to_string(),
            database.user.clone(),
            "-F".to_string(),
            "p".to_string(),
            database.name.clone(),
        ]
    }
}

#[async_trait]
impl IDumpProducer for PgDumpProducer {
    #[tracing::instrument(skip(self, database), fields(database = %database.name))]
    async fn produce(&self, database: &DatabaseConfig) -> anyhow::Result<Bytes> {
        let output = Command::new(&self.program)
            .args(Self::args(database))
            .env("PGPASSWORD", &database.password)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", self.program, output.status, stderr.trim());
        }

        debug!(bytes = output.stdout.len(), "Dump produced");
        Ok(Bytes::from(output.stdout))
    }
}
