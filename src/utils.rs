//! Shared helpers: timestamps, ticket ids, and the string scrubbing
//! used by storage and attachment handling.

use jiff::civil;
use jiff::tz::TimeZone;
use jiff::{Span, Timestamp};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::error::{NoticError, Result};

/// Length of the random suffix in a ticket id.
pub const ID_SUFFIX_LEN: usize = 6;

const ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ID_RETRIES: u32 = 64;

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex should be valid"));
static ISSUE_STRIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9 _-]").expect("issue strip regex should be valid"));
static UNSAFE_FILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9._-]").expect("file name regex should be valid"));
static UNSAFE_ID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("id regex should be valid"));

/// Current time as an ISO-8601 UTC string at second precision.
pub fn now_iso() -> String {
    format_ts(Timestamp::now())
}

pub fn format_ts(ts: Timestamp) -> String {
    ts.strftime("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse a stored timestamp string.
///
/// Accepts full RFC 3339 instants, zone-less datetimes (interpreted in
/// the system time zone, matching what browser `datetime-local` inputs
/// produce), and bare dates (UTC midnight).
pub fn parse_ts(s: &str) -> Option<Timestamp> {
    if let Ok(ts) = s.parse::<Timestamp>() {
        return Some(ts);
    }
    if let Ok(dt) = s.parse::<civil::DateTime>()
        && let Ok(zoned) = dt.to_zoned(TimeZone::system())
    {
        return Some(zoned.timestamp());
    }
    if let Ok(date) = s.parse::<civil::Date>()
        && let Ok(zoned) = date.at(0, 0, 0, 0).to_zoned(TimeZone::UTC)
    {
        return Some(zoned.timestamp());
    }
    None
}

pub fn add_minutes(ts: Timestamp, minutes: i64) -> Timestamp {
    ts.checked_add(Span::new().minutes(minutes)).unwrap_or(ts)
}

/// Whole minutes from `from` to `to`, rounded to the nearest minute.
/// Negative when `to` precedes `from`.
pub fn minutes_between(from: Timestamp, to: Timestamp) -> i64 {
    let millis = to.as_millisecond() - from.as_millisecond();
    (millis as f64 / 60_000.0).round() as i64
}

/// Canonical id prefix: uppercased and stripped to alphanumerics, with
/// `NTC` as the fallback when nothing survives.
pub fn ticket_prefix(raw: &str) -> String {
    let prefix: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase();
    if prefix.is_empty() {
        "NTC".to_string()
    } else {
        prefix
    }
}

/// Generate a ticket id of the form `PREFIX-XXXXXX` where the suffix is
/// six uppercase base-36 characters, retrying while `exists` reports a
/// collision.
pub fn generate_ticket_id<F>(prefix: &str, exists: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    let mut rng = rand::rng();
    for _ in 0..ID_RETRIES {
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
            .collect();
        let candidate = format!("{prefix}-{suffix}");
        if !exists(&candidate) {
            return Ok(candidate);
        }
    }
    Err(NoticError::Storage(format!(
        "failed to generate a unique ticket id after {ID_RETRIES} attempts"
    )))
}

/// Collapse an issue description to its comparable core: lowercase,
/// single-spaced, stripped of everything outside `[a-z0-9 _-]`.
pub fn normalize_issue(issue: &str) -> String {
    let lowered = issue.to_lowercase();
    let collapsed = WHITESPACE_RUN.replace_all(&lowered, " ");
    ISSUE_STRIP.replace_all(&collapsed, "").trim().to_string()
}

/// Make an uploaded file name safe to store by replacing every
/// character outside `[a-zA-Z0-9._-]` with `_`. Separators become
/// underscores, so the result is always a single path component.
pub fn sanitize_file_name(name: &str) -> String {
    UNSAFE_FILE_CHARS.replace_all(name, "_").into_owned()
}

/// Make an id safe to use as a path component.
pub fn sanitize_id(id: &str) -> String {
    UNSAFE_ID_CHARS.replace_all(id, "_").into_owned()
}

/// Timestamp stamp usable inside a file name.
pub fn file_stamp() -> String {
    now_iso().replace([':', '.'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_iso_format() {
        let date = now_iso();
        assert!(date.contains('T'));
        assert!(date.ends_with('Z'));
        assert!(parse_ts(&date).is_some());
    }

    #[test]
    fn test_parse_ts_variants() {
        assert!(parse_ts("2024-03-14T09:26:53Z").is_some());
        assert!(parse_ts("2024-03-14T09:26:53+02:00").is_some());
        // datetime-local form, no zone
        assert!(parse_ts("2024-03-14T09:26").is_some());
        assert!(parse_ts("2024-03-14T09:26:53").is_some());
        // bare date
        assert!(parse_ts("2024-03-14").is_some());
        assert!(parse_ts("not a date").is_none());
        assert!(parse_ts("").is_none());
    }

    #[test]
    fn test_add_minutes() {
        let ts = parse_ts("2024-03-14T00:00:00Z").unwrap();
        assert_eq!(format_ts(add_minutes(ts, 90)), "2024-03-14T01:30:00Z");
    }

    #[test]
    fn test_minutes_between_rounds() {
        let a = parse_ts("2024-03-14T00:00:00Z").unwrap();
        let b = parse_ts("2024-03-14T01:30:29Z").unwrap();
        assert_eq!(minutes_between(a, b), 90);
        let c = parse_ts("2024-03-14T01:30:31Z").unwrap();
        assert_eq!(minutes_between(a, c), 91);
        assert_eq!(minutes_between(b, a), -90);
    }

    #[test]
    fn test_ticket_prefix() {
        assert_eq!(ticket_prefix("NTC"), "NTC");
        assert_eq!(ticket_prefix("help desk"), "HELPDESK");
        assert_eq!(ticket_prefix("it-42"), "IT42");
        assert_eq!(ticket_prefix("!!!"), "NTC");
        assert_eq!(ticket_prefix(""), "NTC");
    }

    #[test]
    fn test_generate_ticket_id_format() {
        let id = generate_ticket_id("NTC", |_| false).unwrap();
        let re = Regex::new(r"^NTC-[A-Z0-9]{6}$").unwrap();
        assert!(re.is_match(&id), "unexpected id format: {id}");
    }

    #[test]
    fn test_generate_ticket_id_retries_on_collision() {
        let taken = generate_ticket_id("NTC", |_| false).unwrap();
        let id = generate_ticket_id("NTC", |candidate| candidate == taken).unwrap();
        assert_ne!(id, taken);
    }

    #[test]
    fn test_generate_ticket_id_gives_up() {
        let result = generate_ticket_id("NTC", |_| true);
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_issue() {
        assert_eq!(normalize_issue("Printer Jam"), "printer jam");
        assert_eq!(normalize_issue("printer   jam!!"), "printer jam");
        assert_eq!(normalize_issue("  VPN  (again?)  "), "vpn again");
        assert_eq!(normalize_issue("under_score-dash"), "under_score-dash");
        assert_eq!(normalize_issue("!!!"), "");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("my file (1).png"), "my_file__1_.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name("C:\\temp\\dump.bin"), "C__temp_dump.bin");
        assert_eq!(sanitize_file_name("snapshot-2.tar.gz"), "snapshot-2.tar.gz");
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("NTC-A1B2C3"), "NTC-A1B2C3");
        assert_eq!(sanitize_id("../evil"), "___evil");
        assert_eq!(sanitize_id("a b"), "a_b");
    }

    #[test]
    fn test_file_stamp_has_no_colons() {
        let stamp = file_stamp();
        assert!(!stamp.contains(':'));
        assert!(!stamp.contains('.'));
    }
}
