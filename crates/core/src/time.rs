// Timestamp normalization for vendor values given in epoch milliseconds.

use chrono::{DateTime, Local, TimeZone, Utc};

/// Convert epoch milliseconds to an ISO-8601 local wall-clock string
/// (no offset). Out-of-range input falls back to the raw millis.
pub fn to_local_iso(epoch_millis: i64) -> String {
    to_iso_in(epoch_millis, &Local)
}

/// Same as [`to_local_iso`] but in an explicit timezone.
pub fn to_iso_in<Tz: TimeZone>(epoch_millis: i64, tz: &Tz) -> String {
    let Some(utc) = DateTime::<Utc>::from_timestamp_millis(epoch_millis) else {
        tracing::debug!(epoch_millis, "timestamp out of range");
        return epoch_millis.to_string();
    };

    let local = utc.with_timezone(tz).naive_local();
    if epoch_millis.rem_euclid(1000) == 0 {
        local.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        local.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}
