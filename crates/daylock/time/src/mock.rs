//! Scriptable time sources for tests and offline simulations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use daylock_types::Clock;
use parking_lot::RwLock;

use crate::error::{Result, TimeError};
use crate::model::TimeSourceKind;
use crate::source::TimeSource;

/// Source whose answer is set explicitly.
#[derive(Debug)]
pub struct FixedTimeSource {
    kind: TimeSourceKind,
    time: RwLock<DateTime<Utc>>,
    calls: AtomicUsize,
}

impl FixedTimeSource {
    pub fn new(kind: TimeSourceKind, time: DateTime<Utc>) -> Self {
        Self {
            kind,
            time: RwLock::new(time),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.write() = time;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimeSource for FixedTimeSource {
    fn kind(&self) -> TimeSourceKind {
        self.kind
    }

    async fn fetch_time(&self) -> Result<DateTime<Utc>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.time.read())
    }
}

/// Source that reads a device clock and subtracts a fixed lag, so the device
/// appears `lag` ahead of the remote clock.
pub struct ClockTrackingSource {
    kind: TimeSourceKind,
    clock: Arc<dyn Clock>,
    lag: chrono::Duration,
}

impl ClockTrackingSource {
    pub fn new(kind: TimeSourceKind, clock: Arc<dyn Clock>, lag: chrono::Duration) -> Self {
        Self { kind, clock, lag }
    }

    /// Remote clock in perfect agreement with the device.
    pub fn in_sync(kind: TimeSourceKind, clock: Arc<dyn Clock>) -> Self {
        Self::new(kind, clock, chrono::Duration::zero())
    }
}

#[async_trait]
impl TimeSource for ClockTrackingSource {
    fn kind(&self) -> TimeSourceKind {
        self.kind
    }

    async fn fetch_time(&self) -> Result<DateTime<Utc>> {
        Ok(self.clock.now() - self.lag)
    }
}

/// Source that always fails, as if the network were down.
#[derive(Debug)]
pub struct UnavailableSource {
    kind: TimeSourceKind,
    calls: AtomicUsize,
}

impl UnavailableSource {
    pub fn new(kind: TimeSourceKind) -> Self {
        Self {
            kind,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimeSource for UnavailableSource {
    fn kind(&self) -> TimeSourceKind {
        self.kind
    }

    async fn fetch_time(&self) -> Result<DateTime<Utc>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TimeError::SourceUnavailable {
            source_kind: self.kind,
            reason: "network unreachable".to_string(),
        })
    }
}

/// Source that never answers; exercises the caller's timeout.
#[derive(Debug)]
pub struct StalledSource {
    kind: TimeSourceKind,
}

impl StalledSource {
    pub fn new(kind: TimeSourceKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl TimeSource for StalledSource {
    fn kind(&self) -> TimeSourceKind {
        self.kind
    }

    async fn fetch_time(&self) -> Result<DateTime<Utc>> {
        std::future::pending().await
    }
}
