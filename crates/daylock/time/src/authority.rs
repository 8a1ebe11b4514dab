//! Time authority: derives the authorized local date.
//!
//! Each check races the configured remote clocks in order, each bounded by
//! the source timeout. A remote answer yields a drift measurement and a fresh
//! cache snapshot; no answer at all falls back to the cached snapshot to
//! detect a clock that moved backwards while offline.
//!
//! In-memory state rules:
//! - the authorized date only moves backwards on a `verified` check
//! - `offline` checks never lower it; `tampered` checks never touch it
//! - once `tampered`, only a `verified` check clears the status

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, NaiveDate, Utc};
use daylock_types::{
    duration_until_next_midnight, Breadcrumb, CapturedMessage, Clock, ErrorReporter, ReportLevel,
    SubscriberSet, Subscription,
};
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cache::TimeCacheStore;
use crate::config::{TamperReportCadence, TimeConfig};
use crate::error::TimeError;
use crate::model::{TimeCache, TimeCheckResult, TimeSourceKind, TimeStatus};
use crate::source::TimeSource;

/// How a tampered classification was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detection {
    /// Remote clock disagreed by more than the threshold.
    Drift,
    /// Offline, and the device clock is earlier than the last cached reading.
    ClockRollback,
}

impl Detection {
    fn as_str(&self) -> &'static str {
        match self {
            Detection::Drift => "drift",
            Detection::ClockRollback => "clock_rollback",
        }
    }
}

struct Classification {
    result: TimeCheckResult,
    detection: Option<Detection>,
}

struct AuthorityState {
    authorized_date: NaiveDate,
    last: Option<TimeCheckResult>,
    tamper_episode_open: bool,
}

struct Inner {
    config: TimeConfig,
    clock: Arc<dyn Clock>,
    sources: Vec<Arc<dyn TimeSource>>,
    cache: TimeCacheStore,
    reporter: Arc<dyn ErrorReporter>,
    state: Mutex<AuthorityState>,
    first_sync: OnceCell<TimeCheckResult>,
    midnight_subscribers: SubscriberSet<TimeCheckResult>,
    midnight_task: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.midnight_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Produces a tamper-resistant authorized date.
///
/// Cheap to clone; clones share state. Construct one per application and
/// hand it to the components that need it.
#[derive(Clone)]
pub struct TimeAuthority {
    inner: Arc<Inner>,
}

impl TimeAuthority {
    /// Create an authority. `sources` are tried in order; the first to answer wins.
    pub fn new(
        config: TimeConfig,
        clock: Arc<dyn Clock>,
        sources: Vec<Arc<dyn TimeSource>>,
        cache: TimeCacheStore,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let seed = clock.today();
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                sources,
                cache,
                reporter,
                state: Mutex::new(AuthorityState {
                    authorized_date: seed,
                    last: None,
                    tamper_episode_open: false,
                }),
                first_sync: OnceCell::new(),
                midnight_subscribers: SubscriberSet::new(),
                midnight_task: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Run the first check. Later and concurrent calls share that check and
    /// return the latest result without fetching again.
    pub async fn init(&self) -> TimeCheckResult {
        let first = self.inner.first_sync.get_or_init(|| self.sync()).await;
        self.last_result().unwrap_or_else(|| first.clone())
    }

    /// Run a fresh check. Never fails: every error degrades into a status.
    #[instrument(skip(self), name = "time_sync")]
    pub async fn sync(&self) -> TimeCheckResult {
        let result = self.refresh().await;
        self.ensure_midnight_armed();
        result
    }

    /// Last known authorized date. Safe for display even while tampered;
    /// not to be trusted for gating unless [`Self::status`] says so.
    pub fn authorized_date_unsafe(&self) -> NaiveDate {
        self.inner.state.lock().authorized_date
    }

    /// Status of the latest check, `None` before the first one.
    pub fn status(&self) -> Option<TimeStatus> {
        self.inner.state.lock().last.as_ref().map(|r| r.status)
    }

    pub fn last_result(&self) -> Option<TimeCheckResult> {
        self.inner.state.lock().last.clone()
    }

    /// Register a callback run after each local-midnight recheck.
    pub fn on_midnight<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TimeCheckResult) + Send + Sync + 'static,
    {
        self.inner.midnight_subscribers.subscribe(callback)
    }

    pub fn is_midnight_armed(&self) -> bool {
        self.inner.midnight_task.lock().is_some()
    }

    /// Stop the midnight task. Later syncs will not re-arm it.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        if let Some(task) = self.inner.midnight_task.lock().take() {
            task.abort();
            debug!("midnight refresh cancelled");
        }
    }

    pub fn config(&self) -> &TimeConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    async fn refresh(&self) -> TimeCheckResult {
        let classification = self.check().await;
        self.apply(classification)
    }

    async fn check(&self) -> Classification {
        let client_time = self.inner.clock.now();
        let timeout = self.inner.config.source_timeout();

        for source in &self.inner.sources {
            let kind = source.kind();
            let outcome = match tokio::time::timeout(timeout, source.fetch_time()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TimeError::SourceTimeout {
                    source_kind: kind,
                    timeout_ms: self.inner.config.source_timeout_ms,
                }),
            };

            match outcome {
                Ok(server_time) => {
                    return self.classify_remote(client_time, server_time, kind).await;
                }
                Err(e) => warn!(source = %kind, error = %e, "time source failed, falling back"),
            }
        }

        self.classify_offline(client_time).await
    }

    async fn classify_remote(
        &self,
        client_time: DateTime<Utc>,
        server_time: DateTime<Utc>,
        kind: TimeSourceKind,
    ) -> Classification {
        let drift_ms = (client_time - server_time).num_milliseconds();
        let authorized_date = self.inner.clock.local_date(client_time);

        let snapshot = TimeCache {
            server_time,
            client_time,
            authorized_date,
        };
        if let Err(e) = self.inner.cache.save(&snapshot).await {
            warn!(error = %e, "failed to persist time cache; integrity is in-memory only");
        }

        let tampered =
            drift_ms.unsigned_abs() > self.inner.config.drift_threshold_ms.unsigned_abs();
        Classification {
            result: TimeCheckResult {
                status: if tampered {
                    TimeStatus::Tampered
                } else {
                    TimeStatus::Verified
                },
                authorized_date,
                drift_ms,
                source: kind,
                checked_at: client_time,
            },
            detection: tampered.then_some(Detection::Drift),
        }
    }

    async fn classify_offline(&self, client_time: DateTime<Utc>) -> Classification {
        let cached = match self.inner.cache.load().await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "time cache unreadable, treating as first run");
                None
            }
        };
        let local_today = self.inner.clock.local_date(client_time);

        match cached {
            Some(cache) if client_time < cache.client_time => Classification {
                result: TimeCheckResult {
                    status: TimeStatus::Tampered,
                    authorized_date: cache.authorized_date,
                    drift_ms: (cache.client_time - client_time).num_milliseconds(),
                    source: TimeSourceKind::Cache,
                    checked_at: client_time,
                },
                detection: Some(Detection::ClockRollback),
            },
            Some(_) => Classification {
                result: TimeCheckResult {
                    status: TimeStatus::Offline,
                    authorized_date: local_today,
                    drift_ms: 0,
                    source: TimeSourceKind::Cache,
                    checked_at: client_time,
                },
                detection: None,
            },
            None => Classification {
                result: TimeCheckResult {
                    status: TimeStatus::Offline,
                    authorized_date: local_today,
                    drift_ms: 0,
                    source: TimeSourceKind::Device,
                    checked_at: client_time,
                },
                detection: None,
            },
        }
    }

    fn apply(&self, classification: Classification) -> TimeCheckResult {
        let Classification {
            mut result,
            detection,
        } = classification;

        let report = {
            let mut state = self.inner.state.lock();

            let was_tampered = state.last.as_ref().is_some_and(|r| r.is_tampered());
            if was_tampered && result.status == TimeStatus::Offline {
                debug!("offline recheck cannot close a tampered episode");
                result.status = TimeStatus::Tampered;
            }

            match result.status {
                TimeStatus::Verified => state.authorized_date = result.authorized_date,
                TimeStatus::Offline => {
                    state.authorized_date = state.authorized_date.max(result.authorized_date)
                }
                TimeStatus::Tampered => {}
            }

            let report = detection.filter(|_| match self.inner.config.tamper_report_cadence {
                TamperReportCadence::EveryCheck => true,
                TamperReportCadence::OncePerEpisode => !state.tamper_episode_open,
            });
            state.tamper_episode_open = result.is_tampered();
            state.last = Some(result.clone());
            report
        };

        self.inner.reporter.add_breadcrumb(
            Breadcrumb::new("time_integrity", format!("time check {}", result.status))
                .with_data("source", result.source)
                .with_data("drift_ms", result.drift_ms),
        );
        if let Some(detection) = report {
            self.report_tamper(&result, detection);
        }

        info!(
            status = %result.status,
            source = %result.source,
            drift_ms = result.drift_ms,
            authorized_date = %result.authorized_date,
            "time check complete"
        );
        result
    }

    fn report_tamper(&self, result: &TimeCheckResult, detection: Detection) {
        let drift_minutes = (result.drift_ms.unsigned_abs() + 30_000) / 60_000;
        let direction = match detection {
            Detection::Drift if result.drift_ms >= 0 => "ahead",
            Detection::Drift | Detection::ClockRollback => "behind",
        };

        warn!(
            drift_minutes,
            direction,
            detection = detection.as_str(),
            "device clock tampering detected"
        );
        self.inner.reporter.capture_message(
            CapturedMessage::new(
                format!("Clock tampering detected: device {drift_minutes} min {direction}"),
                ReportLevel::Warning,
            )
            .with_tag("drift_minutes", drift_minutes)
            .with_tag("drift_direction", direction)
            .with_tag("detection_type", detection.as_str()),
        );
    }

    fn ensure_midnight_armed(&self) {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return;
        }
        let mut task = self.inner.midnight_task.lock();
        if task.is_some() {
            return;
        }

        let wait = duration_until_next_midnight(self.inner.clock.as_ref());
        debug!(wait_secs = wait.as_secs(), "armed local-midnight refresh");
        let deadline = Instant::now() + wait;
        *task = Some(tokio::spawn(midnight_loop(
            Arc::downgrade(&self.inner),
            deadline,
        )));
    }
}

impl std::fmt::Debug for TimeAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TimeAuthority")
            .field("authorized_date", &state.authorized_date)
            .field("status", &state.last.as_ref().map(|r| r.status))
            .field("sources", &self.inner.sources.len())
            .finish()
    }
}

/// Sleeps until each local midnight, rechecks, and notifies subscribers.
/// Holds only a weak reference while sleeping.
async fn midnight_loop(weak: Weak<Inner>, first_deadline: Instant) {
    let mut deadline = first_deadline;
    loop {
        tokio::time::sleep_until(deadline).await;
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let authority = TimeAuthority { inner };

        let result = authority.refresh().await;
        info!(
            authorized_date = %result.authorized_date,
            status = %result.status,
            "local day rolled over"
        );
        authority.inner.midnight_subscribers.notify(&result);

        deadline = Instant::now() + duration_until_next_midnight(authority.inner.clock.as_ref());
    }
}
