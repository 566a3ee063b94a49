//! Schedule trigger engine tests
//!
//! All tests run on a paused tokio clock, so "minutes" pass instantly and
//! fire times are exact.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike};
use tokio::sync::mpsc;

use vaultsync_core::domain::{
    BackupTarget, DatabaseTarget, DirectoryTarget, Schedule, ScheduleRegistry,
};
use vaultsync_sync::{FireHandler, Firing, ScheduleTriggerEngine, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Database,
    Directory,
}

#[derive(Debug, Clone)]
struct Fired {
    schedule: String,
    kind: Kind,
    at: DateTime<Local>,
    bucket: Option<String>,
}

/// Reports each firing on a channel, then optionally sleeps and/or fails.
struct RecordingHandler {
    tx: mpsc::UnboundedSender<Fired>,
    run_for: Duration,
    fail: bool,
}

impl RecordingHandler {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Fired>) {
        Self::with(Duration::ZERO, false)
    }

    fn with(run_for: Duration, fail: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<Fired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx, run_for, fail }), rx)
    }

    async fn record(&self, firing: &Firing, kind: Kind) -> anyhow::Result<()> {
        let _ = self.tx.send(Fired {
            schedule: firing.schedule.clone(),
            kind,
            at: firing.fired_at,
            bucket: firing.storage.as_ref().and_then(|s| s.bucket.clone()),
        });
        if !self.run_for.is_zero() {
            tokio::time::sleep(self.run_for).await;
        }
        if self.fail {
            anyhow::bail!("backup exploded");
        }
        Ok(())
    }
}

#[async_trait]
impl FireHandler for RecordingHandler {
    async fn on_database_fire(
        &self,
        firing: &Firing,
        _target: &DatabaseTarget,
    ) -> anyhow::Result<()> {
        self.record(firing, Kind::Database).await
    }

    async fn on_directory_fire(
        &self,
        firing: &Firing,
        _target: &DirectoryTarget,
    ) -> anyhow::Result<()> {
        self.record(firing, Kind::Directory).await
    }
}

fn dir_schedule(name: &str, expression: &str) -> Schedule {
    Schedule::new(
        name,
        expression,
        BackupTarget::Directory(DirectoryTarget::new("/srv/data", true, false)),
    )
}

fn db_schedule(name: &str, expression: &str) -> Schedule {
    Schedule::new(
        name,
        expression,
        BackupTarget::Database(DatabaseTarget::named("app")),
    )
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Fired>, within: Duration) -> Option<Fired> {
    tokio::time::timeout(within, rx.recv()).await.ok().flatten()
}

const MINUTE: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn test_invalid_schedule_skipped_valid_one_fires_on_time() {
    let registry = Arc::new(ScheduleRegistry::from_schedules(vec![
        dir_schedule("broken", "every full moon"),
        dir_schedule("minutely", "* * * * *"),
    ]));
    let engine = ScheduleTriggerEngine::new(registry);
    let (handler, mut rx) = RecordingHandler::new();

    let registered = engine.start(handler).unwrap();
    assert_eq!(registered, 1);
    assert_eq!(engine.active_schedules(), vec!["minutely"]);

    let fired = next(&mut rx, MINUTE + Duration::from_secs(1))
        .await
        .expect("valid schedule fired within a minute");
    assert_eq!(fired.schedule, "minutely");
    assert_eq!(fired.kind, Kind::Directory);
    assert_eq!(fired.at.second(), 0);

    let again = next(&mut rx, MINUTE + Duration::from_secs(1)).await.unwrap();
    assert_eq!(again.at - fired.at, chrono::Duration::minutes(1));

    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn test_dispatches_by_target_kind_with_override() {
    use vaultsync_core::config::PartialStoreConfig;

    let registry = Arc::new(ScheduleRegistry::from_schedules(vec![db_schedule(
        "nightly-db",
        "* * * * *",
    )
    .with_storage(PartialStoreConfig {
        bucket: Some("db-archive".into()),
        ..Default::default()
    })]));
    let engine = ScheduleTriggerEngine::new(registry);
    let (handler, mut rx) = RecordingHandler::new();
    engine.start(handler).unwrap();

    let fired = next(&mut rx, MINUTE * 2).await.unwrap();
    assert_eq!(fired.kind, Kind::Database);
    assert_eq!(fired.bucket.as_deref(), Some("db-archive"));
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn test_stop_prevents_further_firings() {
    let registry = Arc::new(ScheduleRegistry::from_schedules(vec![dir_schedule(
        "minutely",
        "* * * * *",
    )]));
    let engine = ScheduleTriggerEngine::new(registry);
    let (handler, mut rx) = RecordingHandler::new();
    engine.start(handler).unwrap();

    assert!(next(&mut rx, MINUTE * 2).await.is_some());
    engine.stop();
    assert!(!engine.is_running());

    assert!(next(&mut rx, MINUTE * 5).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failing_firing_does_not_disable_schedule() {
    let registry = Arc::new(ScheduleRegistry::from_schedules(vec![
        dir_schedule("flaky", "* * * * *"),
        db_schedule("every-other", "*/2 * * * *"),
    ]));
    let engine = ScheduleTriggerEngine::new(registry);
    let (handler, mut rx) = RecordingHandler::with(Duration::ZERO, true);
    engine.start(handler).unwrap();

    let mut flaky = 0;
    let mut other = 0;
    while let Some(fired) = next(&mut rx, MINUTE * 2).await {
        match fired.schedule.as_str() {
            "flaky" => flaky += 1,
            _ => other += 1,
        }
        if flaky >= 3 && other >= 1 {
            break;
        }
    }
    assert!(flaky >= 3);
    assert!(other >= 1);
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_firing_of_same_schedule_is_skipped() {
    let registry = Arc::new(ScheduleRegistry::from_schedules(vec![dir_schedule(
        "slow",
        "* * * * *",
    )]));
    let engine = ScheduleTriggerEngine::new(registry);
    // Each run outlives one period but not two.
    let (handler, mut rx) = RecordingHandler::with(Duration::from_secs(90), false);
    engine.start(handler).unwrap();

    let first = next(&mut rx, MINUTE * 2).await.unwrap();
    let second = next(&mut rx, MINUTE * 3).await.unwrap();
    assert_eq!(second.at - first.at, chrono::Duration::minutes(2));
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_an_error() {
    let engine = ScheduleTriggerEngine::new(Arc::new(ScheduleRegistry::new()));
    let (handler, _rx) = RecordingHandler::new();

    assert_eq!(engine.start(handler.clone()).unwrap(), 0);
    assert!(matches!(engine.start(handler), Err(SyncError::AlreadyRunning)));
    engine.stop();
    assert!(!engine.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_reload_picks_up_registry_changes() {
    let registry = Arc::new(ScheduleRegistry::new());
    let engine = ScheduleTriggerEngine::new(Arc::clone(&registry));
    let (handler, mut rx) = RecordingHandler::new();

    assert_eq!(engine.start(handler).unwrap(), 0);
    assert!(next(&mut rx, MINUTE * 2).await.is_none());

    registry.upsert(dir_schedule("added", "* * * * *"));
    assert_eq!(engine.reload().unwrap(), 1);

    let fired = next(&mut rx, MINUTE * 2).await.unwrap();
    assert_eq!(fired.schedule, "added");

    registry.remove("added").unwrap();
    assert_eq!(engine.reload().unwrap(), 0);
    assert!(next(&mut rx, MINUTE * 3).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reload_when_stopped_is_noop() {
    let engine = ScheduleTriggerEngine::new(Arc::new(ScheduleRegistry::from_schedules(vec![
        dir_schedule("a", "daily"),
    ])));
    assert_eq!(engine.reload().unwrap(), 0);
    assert!(!engine.is_running());
}
