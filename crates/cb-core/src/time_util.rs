//! Human-readable timestamps for logs and record tagging.
//!
//! Two clocks matter here: the host's local clock (when a record was
//! captured) and the exchange clock. Shanghai and Shenzhen both run on
//! China Standard Time, so provider epoch timestamps are always rendered at a
//! fixed UTC+08:00 offset regardless of where the collector runs.

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};

/// Offset of the exchange clock from UTC, in seconds.
pub const EXCHANGE_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Current local time as a string.
///
/// - `with_day = false, with_micros = false` → `HH:MM:SS`
/// - `with_day = false, with_micros = true`  → `HH:MM:SS.ffffff`
/// - `with_day = true,  with_micros = false` → `YYYY-MM-DD HH:MM:SS`
/// - `with_day = true,  with_micros = true`  → `YYYY-MM-DD HH:MM:SS.ffffff`
pub fn now_local(with_day: bool, with_micros: bool) -> String {
    format_local(&Local::now(), with_day, with_micros)
}

/// Shorthand for `now_local(true, false)`, the format used for capture tags.
pub fn now_stamp() -> String {
    now_local(true, false)
}

/// Today's local date as `YYYY-MM-DD`.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Current time as milliseconds since Unix epoch.
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render an epoch-seconds timestamp in exchange time as
/// `YYYY-MM-DD HH:MM:SS`. Returns `None` for out-of-range values.
pub fn exchange_time(epoch_secs: i64) -> Option<String> {
    let tz = FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS)?;
    let dt = tz.timestamp_opt(epoch_secs, 0).single()?;
    Some(dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn format_local<Tz: TimeZone>(t: &DateTime<Tz>, with_day: bool, with_micros: bool) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let fmt = match (with_day, with_micros) {
        (false, false) => "%H:%M:%S",
        (false, true) => "%H:%M:%S%.6f",
        (true, false) => "%Y-%m-%d %H:%M:%S",
        (true, true) => "%Y-%m-%d %H:%M:%S%.6f",
    };
    t.format(fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_time_is_utc_plus_eight() {
        // 2022-09-01 01:30:03 UTC
        assert_eq!(exchange_time(1_661_995_803).as_deref(), Some("2022-09-01 09:30:03"));
    }

    #[test]
    fn local_formats() {
        let t = Utc.with_ymd_and_hms(2022, 9, 1, 9, 5, 7).unwrap();
        assert_eq!(format_local(&t, false, false), "09:05:07");
        assert_eq!(format_local(&t, true, false), "2022-09-01 09:05:07");
        assert_eq!(format_local(&t, false, true), "09:05:07.000000");
        assert_eq!(format_local(&t, true, true), "2022-09-01 09:05:07.000000");
    }

    #[test]
    fn stamp_shape() {
        let now = Local::now();
        let s = format_local(&now, true, false);
        assert_eq!(s.len(), 19);
        assert_eq!(&s[10..11], " ");
        assert_eq!(now.format("%Y-%m-%d").to_string(), s[..10]);
        assert_eq!(now_stamp().len(), 19);
        assert_eq!(today().len(), 10);
    }
}
