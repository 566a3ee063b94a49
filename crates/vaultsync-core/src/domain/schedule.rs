//! Schedules and the schedule registry
//!
//! A [`Schedule`] binds a unique name to a recurrence expression, a
//! [`BackupTarget`] and an optional per-schedule storage override.
//! The [`ScheduleRegistry`] owns the set of schedules and is the only place
//! they are mutated. It is safe to share between the trigger engine and a
//! management interface; persistence is left to whoever owns the
//! configuration (see [`Config::save`](crate::config::Config::save)).

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::cron::CronExpr;
use super::errors::DomainError;
use super::target::BackupTarget;
use crate::config::PartialStoreConfig;

// ============================================================================
// ScheduleKind
// ============================================================================

/// Discriminates schedules by the kind of target they back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Database,
    Directory,
}

impl Display for ScheduleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleKind::Database => write!(f, "database"),
            ScheduleKind::Directory => write!(f, "directory"),
        }
    }
}

impl FromStr for ScheduleKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(ScheduleKind::Database),
            "directory" | "dir" => Ok(ScheduleKind::Directory),
            other => Err(DomainError::config(
                "schedule.type",
                format!("invalid schedule type: {other}"),
            )),
        }
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// A named, independently-timed backup job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique key within a registry
    pub name: String,
    /// Preset name or five-field cron expression
    pub expression: String,
    /// What to back up
    pub target: BackupTarget,
    /// Per-schedule storage override (absent fields inherit the base config)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<PartialStoreConfig>,
}

impl Schedule {
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        target: BackupTarget,
    ) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            target,
            storage: None,
        }
    }

    /// Attaches a storage override to this schedule.
    #[must_use]
    pub fn with_storage(mut self, storage: PartialStoreConfig) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn kind(&self) -> ScheduleKind {
        match self.target {
            BackupTarget::Database(_) => ScheduleKind::Database,
            BackupTarget::Directory(_) => ScheduleKind::Directory,
        }
    }

    /// Parses the schedule's expression into a recurrence rule.
    pub fn cron(&self) -> Result<CronExpr, DomainError> {
        CronExpr::parse(&self.expression)
    }
}

// ============================================================================
// ScheduleRegistry
// ============================================================================

/// Name-keyed collection of schedules.
///
/// Mutation is last-write-wins on name collision. All methods take `&self`
/// so the registry can be shared behind an `Arc` while the trigger engine
/// is running.
#[derive(Debug, Default)]
pub struct ScheduleRegistry {
    schedules: RwLock<Vec<Schedule>>,
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a list, later entries replacing earlier ones
    /// with the same name.
    pub fn from_schedules(schedules: impl IntoIterator<Item = Schedule>) -> Self {
        let registry = Self::new();
        for schedule in schedules {
            registry.upsert(schedule);
        }
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Schedule>> {
        self.schedules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Schedule>> {
        self.schedules.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `schedule`, replacing any existing schedule with the same name.
    ///
    /// Returns `true` if an existing schedule was replaced.
    pub fn upsert(&self, schedule: Schedule) -> bool {
        let mut schedules = self.write();
        if let Some(existing) = schedules.iter_mut().find(|s| s.name == schedule.name) {
            info!(name = %schedule.name, kind = %schedule.kind(), "Updated existing backup schedule");
            *existing = schedule;
            true
        } else {
            info!(name = %schedule.name, kind = %schedule.kind(), "Added new backup schedule");
            schedules.push(schedule);
            false
        }
    }

    /// Replaces the whole set of schedules.
    pub fn replace_all(&self, schedules: impl IntoIterator<Item = Schedule>) {
        let fresh = Self::from_schedules(schedules);
        let fresh = fresh.schedules.into_inner().unwrap_or_else(PoisonError::into_inner);
        *self.write() = fresh;
    }

    /// Removes the schedule called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ScheduleNotFound`] if no such schedule exists.
    pub fn remove(&self, name: &str) -> Result<Schedule, DomainError> {
        let mut schedules = self.write();
        let index = schedules
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| DomainError::ScheduleNotFound(name.to_string()))?;
        let removed = schedules.remove(index);
        info!(name = %removed.name, kind = %removed.kind(), "Removed backup schedule");
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Option<Schedule> {
        self.read().iter().find(|s| s.name == name).cloned()
    }

    /// Snapshot of all schedules in insertion order.
    pub fn list(&self) -> Vec<Schedule> {
        self.read().clone()
    }

    pub fn list_by_kind(&self, kind: ScheduleKind) -> Vec<Schedule> {
        self.read()
            .iter()
            .filter(|s| s.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
