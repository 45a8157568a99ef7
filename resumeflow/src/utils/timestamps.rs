//! Timestamp helpers.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

const FILE_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6f";

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// # Examples
///
/// ```
/// use resumeflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Formats a timestamp for use inside a file name.
///
/// The result sorts lexicographically in chronological order and contains
/// no characters that need escaping on common filesystems.
#[must_use]
pub fn file_stamp(ts: &Timestamp) -> String {
    ts.format(FILE_STAMP_FORMAT).to_string().replace('.', "")
}

/// Parses a stamp produced by [`file_stamp`].
#[must_use]
pub fn parse_file_stamp(stamp: &str) -> Option<Timestamp> {
    // Re-insert the fractional separator that file_stamp strips.
    if stamp.len() < 7 {
        return None;
    }
    let (whole, micros) = stamp.split_at(stamp.len() - 6);
    let with_dot = format!("{whole}.{micros}");
    NaiveDateTime::parse_from_str(&with_dot, FILE_STAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }

    #[test]
    fn test_file_stamp_has_no_separators() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let stamp = file_stamp(&ts);
        assert_eq!(stamp, "20240309T140507000000");
        assert!(!stamp.contains(':'));
    }

    #[test]
    fn test_file_stamp_parses_back() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        let parsed = parse_file_stamp(&file_stamp(&ts)).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_file_stamp_orders_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
        assert!(file_stamp(&earlier) < file_stamp(&later));
    }

    #[test]
    fn test_parse_file_stamp_rejects_garbage() {
        assert!(parse_file_stamp("abc").is_none());
        assert!(parse_file_stamp("not-a-stamp-at-all").is_none());
    }
}
