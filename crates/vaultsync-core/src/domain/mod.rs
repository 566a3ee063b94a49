//! Domain entities and business logic
//!
//! This module contains the core domain types for Vaultsync:
//! - Backup targets (database or directory)
//! - Schedules and the name-keyed schedule registry
//! - Cron recurrence rules with named presets
//! - Object key derivation
//! - Domain-specific error types

pub mod cron;
pub mod errors;
pub mod object_key;
pub mod schedule;
pub mod target;

// Re-export commonly used types
pub use cron::CronExpr;
pub use errors::DomainError;
pub use object_key::{listing_prefix, object_key, relative_key};
pub use schedule::{Schedule, ScheduleKind, ScheduleRegistry};
pub use target::{BackupTarget, DatabaseTarget, DirectoryTarget};
