//! App-level wrapper around [`TimeAuthority`].
//!
//! Publishes an [`IntegrityState`] that re-checks on mount, on every return
//! to the foreground, at local midnight and on manual retry.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use daylock_time::{TimeAuthority, TimeCheckResult, TimeStatus};
use daylock_types::Subscription;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::lifecycle::AppLifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityStatus {
    /// First check still running.
    Initializing,
    Verified,
    Offline,
    Tampered,
}

impl From<TimeStatus> for IntegrityStatus {
    fn from(status: TimeStatus) -> Self {
        match status {
            TimeStatus::Verified => IntegrityStatus::Verified,
            TimeStatus::Offline => IntegrityStatus::Offline,
            TimeStatus::Tampered => IntegrityStatus::Tampered,
        }
    }
}

impl std::fmt::Display for IntegrityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityStatus::Initializing => write!(f, "initializing"),
            IntegrityStatus::Verified => write!(f, "verified"),
            IntegrityStatus::Offline => write!(f, "offline"),
            IntegrityStatus::Tampered => write!(f, "tampered"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityState {
    pub status: IntegrityStatus,
    pub authorized_date: NaiveDate,
    pub last_check_at: Option<DateTime<Utc>>,
}

impl IntegrityState {
    pub fn is_blocking(&self) -> bool {
        self.status == IntegrityStatus::Tampered
    }
}

/// Writes check results into the published state.
#[derive(Clone)]
struct Publisher {
    authority: TimeAuthority,
    tx: Arc<watch::Sender<IntegrityState>>,
}

impl Publisher {
    fn apply(&self, result: &TimeCheckResult) -> IntegrityState {
        let next = IntegrityState {
            status: result.status.into(),
            authorized_date: self.authority.authorized_date_unsafe(),
            last_check_at: Some(result.checked_at),
        };
        self.tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            if state.status != next.status {
                info!(from = %state.status, to = %next.status, "integrity status changed");
            }
            *state = next.clone();
            true
        });
        next
    }
}

pub struct IntegrityGate {
    publisher: Publisher,
    lifecycle: Arc<AppLifecycle>,
    foreground_task: Mutex<Option<JoinHandle<()>>>,
    midnight: Mutex<Option<Subscription>>,
}

impl IntegrityGate {
    pub fn new(authority: TimeAuthority, lifecycle: Arc<AppLifecycle>) -> Self {
        let (tx, _) = watch::channel(IntegrityState {
            status: IntegrityStatus::Initializing,
            authorized_date: authority.authorized_date_unsafe(),
            last_check_at: None,
        });
        Self {
            publisher: Publisher {
                authority,
                tx: Arc::new(tx),
            },
            lifecycle,
            foreground_task: Mutex::new(None),
            midnight: Mutex::new(None),
        }
    }

    /// Start listening for foreground returns and midnight rechecks, then
    /// run the first check. Mounting twice only re-reads the latest result.
    #[instrument(skip(self), name = "integrity_mount")]
    pub async fn mount(&self) -> IntegrityState {
        self.attach_listeners();
        let result = self.publisher.authority.init().await;
        self.publisher.apply(&result)
    }

    /// Run a fresh check now.
    pub async fn retry(&self) -> IntegrityState {
        debug!("manual integrity retry");
        let result = self.publisher.authority.sync().await;
        self.publisher.apply(&result)
    }

    pub fn state(&self) -> IntegrityState {
        self.publisher.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<IntegrityState> {
        self.publisher.tx.subscribe()
    }

    /// True iff the device clock is considered tampered.
    pub fn is_blocking(&self) -> bool {
        self.state().is_blocking()
    }

    pub fn authority(&self) -> &TimeAuthority {
        &self.publisher.authority
    }

    /// Stop listening and shut the authority's midnight task down.
    pub fn unmount(&self) {
        if let Some(task) = self.foreground_task.lock().take() {
            task.abort();
        }
        self.midnight.lock().take();
        self.publisher.authority.shutdown();
        debug!("integrity gate unmounted");
    }

    fn attach_listeners(&self) {
        let mut foreground = self.foreground_task.lock();
        if foreground.is_none() {
            let rx = self.lifecycle.subscribe();
            *foreground = Some(tokio::spawn(foreground_loop(self.publisher.clone(), rx)));
        }

        let mut midnight = self.midnight.lock();
        if midnight.is_none() {
            let publisher = self.publisher.clone();
            *midnight = Some(
                self.publisher
                    .authority
                    .on_midnight(move |result| {
                        publisher.apply(result);
                    }),
            );
        }
    }
}

impl Drop for IntegrityGate {
    fn drop(&mut self) {
        if let Some(task) = self.foreground_task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for IntegrityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityGate")
            .field("state", &self.state())
            .finish()
    }
}

async fn foreground_loop(
    publisher: Publisher,
    mut rx: broadcast::Receiver<crate::lifecycle::LifecycleTransition>,
) {
    loop {
        match rx.recv().await {
            Ok(transition) if transition.is_foreground_return() => {
                debug!("foreground return, rechecking time");
                let result = publisher.authority.sync().await;
                publisher.apply(&result);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "lifecycle listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
