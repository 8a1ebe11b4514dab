//! Wall-clock abstraction.
//!
//! Device time is the thing under suspicion, so every component reads it
//! through [`Clock`] instead of calling `Utc::now()` directly. Tests swap in
//! a [`ManualClock`] to move the device clock forwards or backwards.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, Utc};
use parking_lot::RwLock;

/// Source of device wall-clock time plus the device's local UTC offset.
pub trait Clock: Send + Sync {
    /// Current device time.
    fn now(&self) -> DateTime<Utc>;

    /// Local UTC offset in effect at `at`.
    fn local_offset(&self, at: DateTime<Utc>) -> FixedOffset;

    /// Local calendar date of `at`.
    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.local_offset(at)).date_naive()
    }

    /// Local calendar date right now.
    fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }
}

/// Operating-system clock in the process-local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_offset(&self, at: DateTime<Utc>) -> FixedOffset {
        at.with_timezone(&Local).offset().fix()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    /// Create a clock reading `start` in the given local offset.
    pub fn new(start: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: RwLock::new(start),
            offset,
        }
    }

    /// Create a clock whose local timezone is UTC.
    pub fn utc(start: DateTime<Utc>) -> Self {
        Self::new(start, Utc.fix())
    }

    /// Set the device clock to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write() = to;
    }

    /// Move the device clock by a signed amount.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }

    fn local_offset(&self, _at: DateTime<Utc>) -> FixedOffset {
        self.offset
    }
}
