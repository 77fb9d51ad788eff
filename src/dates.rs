//! Day arithmetic on certificate validity instants.

use chrono::{DateTime, Local, TimeZone, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};

use crate::error::CheckError;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Default `strftime` pattern for displayed timestamps.
pub const DEFAULT_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Whole days between two instants, in either order.
///
/// The millisecond distance is rounded to the nearest day, halves away from zero.
pub fn days_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    let millis = (a - b).num_milliseconds().abs();
    (millis as f64 / MILLIS_PER_DAY).round() as i64
}

/// Signed days from `from` until `to`.
///
/// Negative once `to` lies in the past. The sign is decided against the
/// wall clock read at call time, not against `from`.
pub fn days_remaining(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let remaining = days_between(from, to);
    if to < Utc::now() {
        -remaining
    } else {
        remaining
    }
}

/// Converts an ASN.1 certificate time into a UTC instant.
pub fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>, CheckError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| CheckError::InvalidInput {
            field: "certificate time".to_string(),
            reason: format!("{} is out of range", time),
        })
}

/// Renders an instant in the local time zone.
pub fn format_local(instant: DateTime<Utc>, pattern: &str) -> String {
    instant.with_timezone(&Local).format(pattern).to_string()
}
