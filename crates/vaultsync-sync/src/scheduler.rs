//! Schedule trigger engine - fires backup schedules on their cron cadence
//!
//! The [`ScheduleTriggerEngine`] snapshots a [`ScheduleRegistry`] on
//! [`start`](ScheduleTriggerEngine::start) and spawns one timer task per
//! schedule whose expression parses. Schedules that fail to parse are logged
//! and skipped; the others run regardless.
//!
//! ## Flow
//!
//! ```text
//! ScheduleRegistry ──snapshot──→ timer task (per schedule)
//!                                   │ sleep until CronExpr::next_after(now)
//!                                   ▼
//!                          tokio::spawn(FireHandler::on_*_fire)
//! ```
//!
//! Firings are spawned fire-and-forget so a slow run never delays another
//! timer. A firing that finds the previous run of the same schedule still
//! active is skipped with a warning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vaultsync_core::config::PartialStoreConfig;
use vaultsync_core::domain::{
    BackupTarget, CronExpr, DatabaseTarget, DirectoryTarget, Schedule, ScheduleRegistry,
};

use crate::SyncError;

// ============================================================================
// FireHandler
// ============================================================================

/// Context passed to a [`FireHandler`] for one firing.
#[derive(Debug, Clone)]
pub struct Firing {
    /// Name of the schedule that fired
    pub schedule: String,
    /// The schedule's storage override, if any
    pub storage: Option<PartialStoreConfig>,
    /// Scheduled fire time
    pub fired_at: DateTime<Local>,
}

/// Receives schedule firings, one method per target kind.
///
/// Errors are logged by the engine and never stop the schedule.
#[async_trait]
pub trait FireHandler: Send + Sync {
    async fn on_database_fire(&self, firing: &Firing, target: &DatabaseTarget)
        -> anyhow::Result<()>;

    async fn on_directory_fire(
        &self,
        firing: &Firing,
        target: &DirectoryTarget,
    ) -> anyhow::Result<()>;
}

// ============================================================================
// Clock
// ============================================================================

/// Wall clock driven by the tokio timer.
///
/// Time is the wall clock at start plus elapsed tokio time, or the real wall
/// clock if that is later (e.g. after a suspend). Under a paused tokio clock
/// this makes fire times deterministic.
#[derive(Debug, Clone, Copy)]
struct TimerClock {
    wall_anchor: DateTime<Local>,
    tick_anchor: Instant,
}

impl TimerClock {
    fn new() -> Self {
        Self {
            wall_anchor: Local::now(),
            tick_anchor: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Local> {
        let elapsed = chrono::Duration::from_std(self.tick_anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let virtual_now = self.wall_anchor + elapsed;
        virtual_now.max(Local::now())
    }
}

// ============================================================================
// ScheduleTriggerEngine
// ============================================================================

struct RunningState {
    token: CancellationToken,
    timers: Vec<(String, JoinHandle<()>)>,
    handler: Arc<dyn FireHandler>,
}

/// Shared between the engine and its timer tasks. A timer holds the lock
/// while it checks the token and spawns a firing, so nothing is spawned once
/// [`ScheduleTriggerEngine::stop`] has taken it.
type FireGate = Arc<Mutex<()>>;

fn lock_gate(gate: &Mutex<()>) -> MutexGuard<'_, ()> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears a schedule's in-flight flag when its firing ends, even on panic.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs one timer per registered schedule.
pub struct ScheduleTriggerEngine {
    registry: Arc<ScheduleRegistry>,
    gate: FireGate,
    state: Mutex<Option<RunningState>>,
}

impl ScheduleTriggerEngine {
    pub fn new(registry: Arc<ScheduleRegistry>) -> Self {
        Self {
            registry,
            gate: Arc::new(Mutex::new(())),
            state: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, Option<RunningState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn registry(&self) -> &Arc<ScheduleRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.state().is_some()
    }

    /// Names of the schedules with a live timer.
    pub fn active_schedules(&self) -> Vec<String> {
        self.state()
            .as_ref()
            .map(|s| s.timers.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    /// Starts one timer per valid schedule in the registry
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// * `handler` - Receives every firing
    ///
    /// # Returns
    /// The number of schedules registered. Invalid schedules are skipped.
    ///
    /// # Errors
    /// [`SyncError::AlreadyRunning`] if the engine was started and not stopped.
    pub fn start(&self, handler: Arc<dyn FireHandler>) -> Result<usize, SyncError> {
        let mut state = self.state();
        if state.is_some() {
            return Err(SyncError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        let clock = TimerClock::new();
        let mut timers = Vec::new();

        for schedule in self.registry.list() {
            let cron = match schedule.cron() {
                Ok(cron) => cron,
                Err(err) => {
                    error!(
                        name = %schedule.name,
                        expression = %schedule.expression,
                        error = %err,
                        "Skipping schedule with invalid expression"
                    );
                    continue;
                }
            };

            match cron.next_after(&clock.now()) {
                Some(next) => info!(
                    name = %schedule.name,
                    schedule = %cron,
                    target = %schedule.target,
                    next_fire = %next,
                    "Registered backup schedule"
                ),
                None => {
                    warn!(
                        name = %schedule.name,
                        schedule = %cron,
                        "Schedule never fires, skipping"
                    );
                    continue;
                }
            }

            let name = schedule.name.clone();
            let task = run_timer(
                schedule,
                cron,
                clock,
                Arc::clone(&handler),
                token.clone(),
                Arc::clone(&self.gate),
            );
            timers.push((name, tokio::spawn(task)));
        }

        let count = timers.len();
        info!(schedules = count, "Schedule trigger engine started");
        *state = Some(RunningState {
            token,
            timers,
            handler,
        });
        Ok(count)
    }

    /// Stops all timers. No firing begins after this returns; firings already
    /// running are left to finish.
    pub fn stop(&self) {
        let Some(running) = self.state().take() else {
            debug!("Schedule trigger engine not running");
            return;
        };
        self.halt(running);
        info!("Schedule trigger engine stopped");
    }

    fn halt(&self, running: RunningState) {
        let _gate = lock_gate(&self.gate);
        running.token.cancel();
        for (_, timer) in running.timers {
            timer.abort();
        }
    }

    /// Restarts timers from the registry's current contents with the same
    /// handler.
    ///
    /// Returns the number of schedules registered, or 0 if the engine was not
    /// running.
    pub fn reload(&self) -> Result<usize, SyncError> {
        let handler = {
            let Some(running) = self.state().take() else {
                return Ok(0);
            };
            let handler = Arc::clone(&running.handler);
            self.halt(running);
            handler
        };
        info!("Reloading backup schedules");
        self.start(handler)
    }
}

impl Drop for ScheduleTriggerEngine {
    fn drop(&mut self) {
        if let Some(running) = self.state().take() {
            self.halt(running);
        }
    }
}

// ============================================================================
// Timer task
// ============================================================================

async fn run_timer(
    schedule: Schedule,
    cron: CronExpr,
    clock: TimerClock,
    handler: Arc<dyn FireHandler>,
    token: CancellationToken,
    gate: FireGate,
) {
    let in_flight = Arc::new(AtomicBool::new(false));

    loop {
        let now = clock.now();
        let Some(next) = cron.next_after(&now) else {
            warn!(name = %schedule.name, "No further fire times, timer exiting");
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!(name = %schedule.name, next_fire = %next, wait_secs = wait.as_secs(), "Waiting for next firing");

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        let _gate = lock_gate(&gate);
        if token.is_cancelled() {
            return;
        }

        if in_flight.swap(true, Ordering::AcqRel) {
            warn!(
                name = %schedule.name,
                "Previous run still in progress, skipping this firing"
            );
            continue;
        }

        let firing = Firing {
            schedule: schedule.name.clone(),
            storage: schedule.storage.clone(),
            fired_at: next,
        };
        let target = schedule.target.clone();
        let handler = Arc::clone(&handler);
        let guard = InFlightGuard(Arc::clone(&in_flight));

        tokio::spawn(async move {
            let _guard = guard;
            info!(name = %firing.schedule, target = %target, "Schedule fired");
            let result = match &target {
                BackupTarget::Database(db) => handler.on_database_fire(&firing, db).await,
                BackupTarget::Directory(dir) => handler.on_directory_fire(&firing, dir).await,
            };
            match result {
                Ok(()) => info!(name = %firing.schedule, target = %target, "Scheduled backup completed"),
                Err(err) => error!(
                    name = %firing.schedule,
                    target = %target,
                    error = %format!("{err:#}"),
                    "Scheduled backup failed"
                ),
            }
        });
    }
}
