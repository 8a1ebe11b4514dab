//! Integrity gate, rehydration gate and the trust pipeline over in-memory
//! collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use daylock_rehydrate::{InMemoryRemoteHistory, RemoteCall, RemoteHistory};
use daylock_runtime::{
    AppLifecycle, AppState, DaylockConfig, IntegrityGate, IntegrityStatus, Overlay,
    RehydrationStatus, Services, StageStatus, TrustOverlay,
};
use daylock_storage::{
    AttemptRecord, AttemptStore, InMemoryAttemptStore, InMemoryKeyValueStore, PuzzleRecord,
    Readiness, SyncState,
};
use daylock_time::mock::{ClockTrackingSource, FixedTimeSource};
use daylock_time::{TimeSource, TimeSourceKind};
use daylock_types::{ManualClock, RecordingReporter};
use parking_lot::Mutex;

const USER: &str = "user-1";

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn attempt(i: u32) -> AttemptRecord {
    let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap() + chrono::Duration::days(i as i64);
    AttemptRecord {
        id: format!("a{i}"),
        user_id: USER.to_string(),
        puzzle_id: format!("p{i}"),
        puzzle_date: date,
        completed: true,
        score: Some(100),
        time_taken_secs: Some(30),
        created_at: date.and_hms_opt(9, 0, 0).unwrap().and_utc(),
        sync_state: SyncState::Synced,
    }
}

fn remote_with(n: u32) -> Arc<InMemoryRemoteHistory> {
    let remote = Arc::new(InMemoryRemoteHistory::new());
    for i in 0..n {
        let a = attempt(i);
        remote.add_puzzle(PuzzleRecord {
            id: a.puzzle_id.clone(),
            puzzle_date: a.puzzle_date,
            game_type: "grid".to_string(),
            content: serde_json::json!({}),
        });
        remote.add_attempt(a);
    }
    remote
}

struct Harness {
    services: Services,
    clock: Arc<ManualClock>,
    source: Arc<FixedTimeSource>,
    store: Arc<InMemoryAttemptStore>,
    remote: Arc<InMemoryRemoteHistory>,
}

fn harness_with(
    store: Arc<InMemoryAttemptStore>,
    remote: Arc<InMemoryRemoteHistory>,
    kv: Arc<InMemoryKeyValueStore>,
) -> Harness {
    let clock = Arc::new(ManualClock::utc(noon()));
    let services = Services {
        config: DaylockConfig::default(),
        clock: clock.clone(),
        reporter: Arc::new(RecordingReporter::new()),
        kv,
        attempts: store.clone(),
        remote: remote.clone(),
        lifecycle: Arc::new(AppLifecycle::default()),
    };
    Harness {
        services,
        clock,
        source: Arc::new(FixedTimeSource::new(TimeSourceKind::WorldTime, noon())),
        store,
        remote,
    }
}

fn harness() -> Harness {
    harness_with(
        Arc::new(InMemoryAttemptStore::new()),
        remote_with(3),
        Arc::new(InMemoryKeyValueStore::new()),
    )
}

impl Harness {
    fn sources(&self) -> Vec<Arc<dyn TimeSource>> {
        vec![self.source.clone() as Arc<dyn TimeSource>]
    }

    fn integrity_gate(&self) -> IntegrityGate {
        IntegrityGate::new(
            self.services.time_authority(self.sources()),
            self.services.lifecycle.clone(),
        )
    }

    /// Make the device clock look `minutes` ahead of the remote clock.
    fn skew(&self, minutes: i64) {
        self.source.set(self.clock_now() - chrono::Duration::minutes(minutes));
    }

    fn clock_now(&self) -> DateTime<Utc> {
        use daylock_types::Clock;
        self.clock.now()
    }
}

// ---- integrity gate ----

#[tokio::test]
async fn integrity_gate_starts_initializing_then_verifies() {
    let h = harness();
    let gate = h.integrity_gate();
    let initial = gate.state();
    assert_eq!(initial.status, IntegrityStatus::Initializing);
    assert_eq!(initial.authorized_date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    assert!(!gate.is_blocking());

    let state = gate.mount().await;
    assert_eq!(state.status, IntegrityStatus::Verified);
    assert_eq!(state.last_check_at, Some(noon()));
    assert!(!gate.is_blocking());
    gate.unmount();
}

#[tokio::test]
async fn offline_is_not_blocking() {
    let h = harness();
    let gate = IntegrityGate::new(
        h.services
            .time_authority(vec![Arc::new(daylock_time::mock::UnavailableSource::new(
                TimeSourceKind::WorldTime,
            )) as Arc<dyn TimeSource>]),
        h.services.lifecycle.clone(),
    );
    assert_eq!(gate.mount().await.status, IntegrityStatus::Offline);
    assert!(!gate.is_blocking());
    gate.unmount();
}

#[tokio::test]
async fn foreground_return_rechecks_and_blocks_on_tamper() {
    let h = harness();
    let gate = h.integrity_gate();
    gate.mount().await;
    let mut rx = gate.subscribe();
    rx.borrow_and_update();

    h.skew(30);
    h.services.lifecycle.set_state(AppState::Background);
    h.services.lifecycle.set_state(AppState::Active);

    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("foreground recheck")
        .unwrap();
    assert_eq!(gate.state().status, IntegrityStatus::Tampered);
    assert!(gate.is_blocking());

    h.skew(0);
    assert_eq!(gate.retry().await.status, IntegrityStatus::Verified);
    assert!(!gate.is_blocking());
    gate.unmount();
}

#[tokio::test]
async fn unmount_stops_listening() {
    let h = harness();
    let gate = h.integrity_gate();
    gate.mount().await;
    assert!(gate.authority().is_midnight_armed());
    let calls = h.source.calls();

    gate.unmount();
    h.services.lifecycle.set_state(AppState::Background);
    h.services.lifecycle.set_state(AppState::Active);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(h.source.calls(), calls);
    assert!(!gate.authority().is_midnight_armed());
}

#[tokio::test(start_paused = true)]
async fn midnight_moves_gate_date() {
    let h = harness();
    h.clock.set(Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 0).unwrap());
    let clock: Arc<dyn daylock_types::Clock> = h.clock.clone();
    let gate = IntegrityGate::new(
        h.services.time_authority(vec![
            Arc::new(ClockTrackingSource::in_sync(TimeSourceKind::WorldTime, clock))
                as Arc<dyn TimeSource>,
        ]),
        h.services.lifecycle.clone(),
    );
    let state = gate.mount().await;
    assert_eq!(state.authorized_date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    let mut rx = gate.subscribe();
    rx.borrow_and_update();

    h.clock.set(Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 1).unwrap());
    tokio::time::advance(Duration::from_secs(61)).await;
    rx.changed().await.unwrap();

    let state = gate.state();
    assert_eq!(state.status, IntegrityStatus::Verified);
    assert_eq!(state.authorized_date, NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
    gate.unmount();
}

// ---- rehydration gate ----

#[tokio::test]
async fn rehydration_gate_restores_and_flags() {
    let h = harness();
    let gate = h.services.rehydration_gate(USER);
    assert_eq!(gate.status(), RehydrationStatus::Idle);
    assert_eq!(gate.overlay(), Overlay::Contentless);

    let status = gate.run().await;
    assert_eq!(
        status,
        RehydrationStatus::Complete {
            attempts_restored: 3,
            degraded: false
        }
    );
    assert_eq!(gate.overlay(), Overlay::None);
    assert_eq!(h.store.attempt_count().await.unwrap(), 3);
    assert!(h.services.flag_store().is_complete(USER).await.unwrap());

    // At most once per mount.
    assert_eq!(gate.run().await, status);
    assert_eq!(h.remote.calls(RemoteCall::Attempts), 1);
}

#[tokio::test]
async fn flag_skips_probe_on_relaunch() {
    let kv = Arc::new(InMemoryKeyValueStore::new());
    let remote = remote_with(3);
    let first = harness_with(Arc::new(InMemoryAttemptStore::new()), remote.clone(), kv.clone());
    first.services.rehydration_gate(USER).run().await;
    let calls = remote.total_calls();

    // Same install, local attempts gone again.
    let relaunch = harness_with(Arc::new(InMemoryAttemptStore::new()), remote.clone(), kv);
    let status = relaunch.services.rehydration_gate(USER).run().await;
    assert_eq!(
        status,
        RehydrationStatus::Complete {
            attempts_restored: 0,
            degraded: false
        }
    );
    assert_eq!(remote.total_calls(), calls);
}

#[tokio::test]
async fn nothing_to_restore_completes_without_flag() {
    let h = harness_with(
        Arc::new(InMemoryAttemptStore::new()),
        Arc::new(InMemoryRemoteHistory::new()),
        Arc::new(InMemoryKeyValueStore::new()),
    );
    let status = h.services.rehydration_gate(USER).run().await;
    assert!(status.is_complete());
    assert!(!h.services.flag_store().is_complete(USER).await.unwrap());
}

#[tokio::test]
async fn failure_shows_retry_and_retry_recovers() {
    let h = harness();
    h.remote.fail(RemoteCall::Attempts);
    let gate = h.services.rehydration_gate(USER);

    let status = gate.run().await;
    assert!(matches!(status, RehydrationStatus::Error { .. }));
    assert_eq!(gate.overlay(), Overlay::RetryPrompt);
    assert!(!h.services.flag_store().is_complete(USER).await.unwrap());

    // Terminal until retried.
    assert!(matches!(gate.run().await, RehydrationStatus::Error { .. }));

    h.remote.recover();
    assert_eq!(
        gate.retry_rehydration().await,
        RehydrationStatus::Complete {
            attempts_restored: 3,
            degraded: false
        }
    );
}

#[tokio::test]
async fn retry_bypasses_flag() {
    let h = harness();
    h.services.flag_store().mark_complete(USER, 0).await.unwrap();
    let gate = h.services.rehydration_gate(USER);

    assert_eq!(h.store.attempt_count().await.unwrap(), 0);
    assert_eq!(
        gate.run().await,
        RehydrationStatus::Complete {
            attempts_restored: 0,
            degraded: false
        }
    );
    assert_eq!(
        gate.retry_rehydration().await,
        RehydrationStatus::Complete {
            attempts_restored: 3,
            degraded: false
        }
    );
}

#[tokio::test(start_paused = true)]
async fn storage_never_ready_degrades_to_complete() {
    let store = Arc::new(InMemoryAttemptStore::with_readiness(Readiness::pending()));
    let h = harness_with(
        store,
        remote_with(3),
        Arc::new(InMemoryKeyValueStore::new()),
    );

    let status = h.services.rehydration_gate(USER).run().await;
    assert_eq!(
        status,
        RehydrationStatus::Complete {
            attempts_restored: 0,
            degraded: true
        }
    );
    assert_eq!(h.remote.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_coalesce() {
    let readiness = Readiness::pending();
    let store = Arc::new(InMemoryAttemptStore::with_readiness(readiness.clone()));
    let h = harness_with(
        store,
        remote_with(3),
        Arc::new(InMemoryKeyValueStore::new()),
    );
    let gate = h.services.rehydration_gate(USER);

    let (a, b, _) = tokio::join!(gate.run(), gate.run(), async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        readiness.mark_ready();
    });

    assert_eq!(a, b);
    assert_eq!(
        a,
        RehydrationStatus::Complete {
            attempts_restored: 3,
            degraded: false
        }
    );
    assert_eq!(h.remote.calls(RemoteCall::Attempts), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_caller_does_not_start_a_second_run() {
    let readiness = Readiness::pending();
    let store = Arc::new(InMemoryAttemptStore::with_readiness(readiness.clone()));
    let h = harness_with(
        store,
        remote_with(3),
        Arc::new(InMemoryKeyValueStore::new()),
    );
    let gate = h.services.rehydration_gate(USER);

    let abandoned = tokio::time::timeout(Duration::from_millis(50), gate.run()).await;
    assert!(abandoned.is_err());
    assert_eq!(gate.status(), RehydrationStatus::Checking);

    let (status, _) = tokio::join!(gate.run(), async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        readiness.mark_ready();
    });
    let restored = RehydrationStatus::Complete {
        attempts_restored: 3,
        degraded: false,
    };
    assert_eq!(status, restored);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(gate.status(), restored);
    assert_eq!(h.remote.calls(RemoteCall::Count), 1);
    assert_eq!(h.remote.calls(RemoteCall::Attempts), 1);
}

#[tokio::test(start_paused = true)]
async fn unmount_cancels_in_flight_run() {
    let readiness = Readiness::pending();
    let store = Arc::new(InMemoryAttemptStore::with_readiness(readiness.clone()));
    let h = harness_with(
        store,
        remote_with(3),
        Arc::new(InMemoryKeyValueStore::new()),
    );
    let gate = h.services.rehydration_gate(USER);

    let running = tokio::spawn({
        let gate = gate.clone();
        async move { gate.run().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gate.status(), RehydrationStatus::Checking);

    gate.unmount();
    readiness.mark_ready();

    let cancelled = RehydrationStatus::Error {
        message: "rehydration cancelled".to_string(),
    };
    assert_eq!(running.await.unwrap(), cancelled);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(gate.status(), cancelled);
    assert_eq!(h.remote.total_calls(), 0);
    assert_eq!(h.store.attempt_count().await.unwrap(), 0);
    assert!(!h.services.flag_store().is_complete(USER).await.unwrap());
}

#[tokio::test]
async fn unmount_after_completion_keeps_result() {
    let h = harness();
    let gate = h.services.rehydration_gate(USER);
    let status = gate.run().await;
    gate.unmount();
    assert_eq!(gate.status(), status);
}

#[tokio::test]
async fn history_lists_restored_attempts_with_puzzles() {
    let h = harness();
    h.services.rehydration_gate(USER).run().await;

    let mut local = attempt(10);
    local.id = "local-1".to_string();
    local.sync_state = SyncState::Pending;
    h.store.insert_attempt_if_absent(&local).await.unwrap();

    let report = h.services.history(USER, 3).await.unwrap();
    assert_eq!(report.stored_attempts, 4);
    assert_eq!(report.pending_sync, 1);
    assert_eq!(
        report
            .recent
            .iter()
            .map(|e| e.attempt.id.as_str())
            .collect::<Vec<_>>(),
        vec!["local-1", "a2", "a1"]
    );
    // Locally recorded play never had its puzzle cached.
    assert_eq!(report.recent[0].game_type, None);
    assert_eq!(report.recent[1].game_type.as_deref(), Some("grid"));
}

// ---- trust pipeline ----

#[tokio::test]
async fn pipeline_releases_gameplay_after_rehydration() {
    let h = harness();
    let pipeline = h.services.trust_pipeline(USER, h.sources());

    let before = pipeline.view();
    assert_eq!(before.overlay, TrustOverlay::Loading);
    assert!(!before.gameplay_released);

    let view = pipeline.start().await;
    assert_eq!(view.integrity.status, IntegrityStatus::Verified);
    assert_eq!(view.overlay, TrustOverlay::None);
    assert!(view.gameplay_released);
    assert_eq!(
        pipeline
            .stages()
            .iter()
            .map(|s| (s.name(), s.stage_status()))
            .collect::<Vec<_>>(),
        vec![
            ("integrity", StageStatus::Passed),
            ("rehydration", StageStatus::Passed)
        ]
    );
    pipeline.shutdown();
}

#[tokio::test]
async fn tampered_overlay_wins_but_app_stays_mounted() {
    let h = harness();
    h.skew(30);
    let pipeline = h.services.trust_pipeline(USER, h.sources());

    let view = pipeline.start().await;
    assert_eq!(view.overlay, TrustOverlay::Tampered);
    assert!(view.gameplay_released);
    assert!(view.rehydration.is_complete());

    h.skew(0);
    let view = pipeline.retry().await;
    assert_eq!(view.overlay, TrustOverlay::None);
    pipeline.shutdown();
}

#[tokio::test]
async fn rehydration_failure_overlay() {
    let h = harness();
    h.remote.fail(RemoteCall::Puzzles);
    let pipeline = h.services.trust_pipeline(USER, h.sources());

    let view = pipeline.start().await;
    assert!(matches!(
        view.overlay,
        TrustOverlay::RehydrationFailed { .. }
    ));
    assert!(!view.gameplay_released);

    h.remote.recover();
    let view = pipeline.retry().await;
    assert_eq!(view.overlay, TrustOverlay::None);
    assert!(view.gameplay_released);
    pipeline.shutdown();
}

type Log = Arc<Mutex<Vec<&'static str>>>;

struct LoggedSource {
    log: Log,
}

#[async_trait]
impl TimeSource for LoggedSource {
    fn kind(&self) -> TimeSourceKind {
        TimeSourceKind::WorldTime
    }

    async fn fetch_time(&self) -> daylock_time::Result<DateTime<Utc>> {
        self.log.lock().push("time");
        Ok(noon())
    }
}

struct LoggedRemote {
    log: Log,
    inner: Arc<InMemoryRemoteHistory>,
}

#[async_trait]
impl RemoteHistory for LoggedRemote {
    async fn count_attempts_since(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> daylock_rehydrate::Result<u64> {
        self.log.lock().push("remote");
        self.inner.count_attempts_since(user_id, since).await
    }

    async fn fetch_recent_attempts(
        &self,
        user_id: &str,
        since: NaiveDate,
        limit: usize,
    ) -> daylock_rehydrate::Result<Vec<AttemptRecord>> {
        self.log.lock().push("remote");
        self.inner.fetch_recent_attempts(user_id, since, limit).await
    }

    async fn fetch_puzzles(
        &self,
        puzzle_ids: &[String],
    ) -> daylock_rehydrate::Result<Vec<PuzzleRecord>> {
        self.log.lock().push("remote");
        self.inner.fetch_puzzles(puzzle_ids).await
    }
}

#[tokio::test]
async fn integrity_completes_before_rehydration_starts() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut h = harness();
    let remote: Arc<dyn RemoteHistory> = Arc::new(LoggedRemote {
        log: log.clone(),
        inner: remote_with(3),
    });
    h.services.remote = remote;

    let source: Arc<dyn TimeSource> = Arc::new(LoggedSource { log: log.clone() });
    let pipeline = h.services.trust_pipeline(USER, vec![source]);
    pipeline.start().await;
    pipeline.shutdown();

    let log = log.lock().clone();
    assert_eq!(log.first(), Some(&"time"));
    let first_remote = log.iter().position(|e| *e == "remote").unwrap();
    assert!(log[first_remote..].iter().all(|e| *e == "remote"));
}
