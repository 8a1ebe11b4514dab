//! Calendar-date helpers.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use crate::clock::Clock;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Slack added after midnight so a timer firing a few milliseconds early
/// still observes the new calendar day.
const MIDNIGHT_GRACE: Duration = Duration::from_secs(1);

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
}

/// First instant of the local calendar day following `at`.
pub fn next_local_midnight(at: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local_date = at.with_timezone(&offset).date_naive();
    local_date
        .succ_opt()
        .and_then(|next| next.and_hms_opt(0, 0, 0))
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| at + chrono::Duration::days(1))
}

/// How long to sleep from the clock's current reading until just past the
/// next local midnight.
pub fn duration_until_next_midnight(clock: &dyn Clock) -> Duration {
    let now = clock.now();
    let midnight = next_local_midnight(now, clock.local_offset(now));
    (midnight - now).to_std().unwrap_or(Duration::ZERO) + MIDNIGHT_GRACE
}
