//! Backup targets
//!
//! A [`BackupTarget`] says *what* a schedule backs up. It is carried as a
//! tagged variant from the configuration through the trigger engine to the
//! orchestrator, so no stage has to guess the payload's shape.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What a backup run operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackupTarget {
    /// Dump a database and upload the dump
    Database(DatabaseTarget),
    /// Mirror a local directory tree
    Directory(DirectoryTarget),
}

impl BackupTarget {
    /// Short human-readable description used in logs.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl Display for BackupTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BackupTarget::Database(db) => match db.name.as_deref() {
                Some(name) if !name.is_empty() => write!(f, "database '{name}'"),
                _ => write!(f, "database (default)"),
            },
            BackupTarget::Directory(dir) => {
                write!(f, "directory {}", dir.source_path.display())
            }
        }
    }
}

/// Connection fields for a database target.
///
/// Every field is optional: an absent or empty value inherits from the base
/// [`DatabaseConfig`](crate::config::DatabaseConfig) when the target is
/// resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DatabaseTarget {
    /// Target that only names the database and inherits everything else.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// A local directory to mirror into the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryTarget {
    /// Root of the local tree
    pub source_path: PathBuf,
    /// Only upload new or modified files (incremental mode)
    #[serde(default)]
    pub sync: bool,
    /// Delete remote objects with no local counterpart (requires `sync`)
    #[serde(default, alias = "delete")]
    pub delete_orphans: bool,
}

impl DirectoryTarget {
    pub fn new(source_path: impl Into<PathBuf>, sync: bool, delete_orphans: bool) -> Self {
        Self {
            source_path: source_path.into(),
            sync,
            delete_orphans,
        }
    }
}
