//! Small header-value helpers shared by the writer, the file sender and the body reader.

use std::time::SystemTime;

/// Parses a leading decimal integer the lenient way HTTP clients expect:
/// leading whitespace and an optional sign are accepted, trailing junk is ignored.
/// Returns `None` when no digit is found.
pub fn parse_int(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// `Content-Length` as an unsigned byte count, if present and well-formed.
pub fn parse_content_length(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Parses an HTTP date (IMF-fixdate, RFC 850 or asctime).
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value.trim()).ok()
}

/// Formats `time` as an IMF-fixdate.
pub fn format_http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_is_lenient() {
        assert_eq!(parse_int("10"), Some(10));
        assert_eq!(parse_int(" 10"), Some(10));
        assert_eq!(parse_int("10abc"), Some(10));
        assert_eq!(parse_int("-5"), Some(-5));
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("abc"), None);
        assert_eq!(parse_int("-"), None);
    }

    #[test]
    fn test_content_length_is_strict() {
        assert_eq!(parse_content_length("42"), Some(42));
        assert_eq!(parse_content_length(" 42 "), Some(42));
        assert_eq!(parse_content_length("4x"), None);
        assert_eq!(parse_content_length("-1"), None);
    }

    #[test]
    fn test_http_date_round_trip() {
        let date = "Sun, 06 Nov 1994 08:49:37 GMT";
        let parsed = parse_http_date(date).unwrap();
        assert_eq!(format_http_date(parsed), date);
        assert!(parse_http_date("yesterday").is_none());
    }
}
