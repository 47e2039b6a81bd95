//! Time-point string codec (spec §6.5): epoch seconds, `now`, `-<n>d`, ISO-8601.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static DAYS_AGO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-(\d+)d$").unwrap());

/// Parses a persisted time-point string into a UTC instant.
pub fn parse(input: &str) -> Result<DateTime<Utc>> {
    if input == "now" {
        return Ok(Utc::now());
    }
    if let Some(caps) = DAYS_AGO.captures(input) {
        let days: i64 = caps[1].parse()?;
        return Ok(Utc::now() - Duration::days(days));
    }
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("invalid time point {input:?}: {e}"))
}

/// Current time as epoch seconds, the unit every stored `CRTD`/`TTL` field uses.
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_now() {
        let before = Utc::now();
        let parsed = parse("now").unwrap();
        assert!(parsed >= before);
    }

    #[test]
    fn parses_days_ago() {
        let parsed = parse("-10d").unwrap();
        let expected = Utc::now() - Duration::days(10);
        assert!((parsed - expected).num_seconds().abs() < 5);
    }

    #[test]
    fn parses_iso8601() {
        let parsed = parse("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(parsed.timestamp(), 1_704_067_200);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("not-a-time").is_err());
    }
}
