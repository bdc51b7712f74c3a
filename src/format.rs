//! Local-time formatting for output stamps, result tables and export file names.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

fn now_local() -> OffsetDateTime {
    // local_offset can fail on multi-threaded unix processes; fall back to UTC.
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// `HH:MM:SS` wall clock stamp for output log lines.
pub fn clock_stamp() -> String {
    now_local()
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "--:--:--".into())
}

/// `YYYY-MM-DD` of today, used in export file names.
pub fn today() -> String {
    now_local()
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "today".into())
}

/// Render a server timestamp as local `YYYY-MM-DD HH:MM:SS`.
///
/// Accepts RFC 3339 as well as the naive ISO form (`2025-10-01T10:00:00.123456`) that
/// Python's `isoformat()` emits; naive values are taken as local time already.
pub fn local_datetime(raw: &str) -> Option<String> {
    let out = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let raw = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return dt.to_offset(local_offset()).format(out).ok();
    }
    let naive =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");
    PrimitiveDateTime::parse(&raw.replacen(' ', "T", 1), naive)
        .ok()
        .and_then(|dt| dt.format(out).ok())
}
