//! Receipt timestamps arrive in assorted timezones; payout timestamps are stored in UTC. Date comparison happens
//! in the settlement platform's timezone (Moscow, fixed UTC+3 — Russia abolished DST in 2014).
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

pub const PLATFORM_UTC_OFFSET_SECS: i32 = 3 * 3600;

/// The calendar date of `ts` as seen in the platform's timezone.
pub fn platform_date(ts: DateTime<Utc>) -> NaiveDate {
    let offset = FixedOffset::east_opt(PLATFORM_UTC_OFFSET_SECS).expect("fixed +03:00 offset is valid");
    ts.with_timezone(&offset).date_naive()
}
