//! Shared primitives for the Daylock trust and continuity layer.
//!
//! - [`Clock`]: injectable wall clock with a local UTC offset
//! - calendar helpers for local dates and midnight boundaries
//! - [`ErrorReporter`]: breadcrumb and tagged-message capture collaborator
//! - [`SubscriberSet`] / [`Subscription`]: observer registry with RAII disposers

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod clock;
pub mod date;
pub mod report;
pub mod subscription;

pub use clock::{Clock, ManualClock, SystemClock};
pub use date::{duration_until_next_midnight, format_date, next_local_midnight, parse_date};
pub use report::{
    Breadcrumb, CapturedMessage, ErrorReporter, RecordingReporter, ReportLevel, TracingReporter,
};
pub use subscription::{SubscriberSet, Subscription};

/// Calendar date used for "today" filtering. Serializes as `YYYY-MM-DD`.
pub type CalendarDate = chrono::NaiveDate;
