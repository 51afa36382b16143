//! Time helpers
//!
//! Storage keeps UTC millisecond timestamps; receipts render wall-clock
//! time in the configured shop timezone.

use chrono::TimeZone;
use chrono_tz::Tz;

/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Format a millisecond timestamp as local wall-clock time
pub fn format_timestamp(millis: i64, tz: Tz) -> String {
    match tz.timestamp_millis_opt(millis) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => String::from("invalid time"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_in_nairobi_time() {
        // 2024-01-01 00:00:00 UTC is 03:00 in Nairobi (UTC+3, no DST)
        let tz: Tz = "Africa/Nairobi".parse().unwrap();
        assert_eq!(format_timestamp(1_704_067_200_000, tz), "2024-01-01 03:00:00");
    }
}
