//! TTL strings such as `"7d"`, `"2h"`, `"30m"` and `"1w"`.

use chrono::{TimeDelta, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Days in the fallback TTL used whenever a TTL string cannot be parsed.
pub const DEFAULT_TTL_DAYS: i64 = 7;

/// The fallback TTL (7 days).
pub fn default_ttl() -> TimeDelta {
    TimeDelta::days(DEFAULT_TTL_DAYS)
}

static TTL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*([mhdw])$").expect("static regex"));

/// Parse a short TTL string into a duration.
///
/// Accepts `<n><unit>` with unit `m`, `h`, `d` or `w`, case-insensitive and
/// with surrounding whitespace. Never fails: empty, zero, unknown-unit or
/// overflowing input yields [`default_ttl()`], as does any amount whose
/// expiry would fall outside the representable date range.
pub fn parse_ttl(input: &str) -> TimeDelta {
    try_parse_ttl(input).unwrap_or_else(|| {
        log::debug!("unparsable ttl {:?}, using default of 7d", input);
        default_ttl()
    })
}

fn try_parse_ttl(input: &str) -> Option<TimeDelta> {
    let normalized = input.trim().to_ascii_lowercase();
    let caps = TTL_PATTERN.captures(&normalized)?;
    let amount: i64 = caps[1].parse().ok()?;
    if amount == 0 {
        return None;
    }
    let ttl = match &caps[2] {
        "m" => TimeDelta::try_minutes(amount),
        "h" => TimeDelta::try_hours(amount),
        "d" => TimeDelta::try_days(amount),
        "w" => TimeDelta::try_weeks(amount),
        _ => None,
    }?;
    // An expiry must be representable as a timestamp from now.
    Utc::now().checked_add_signed(ttl).map(|_| ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_ttl("30m"), TimeDelta::minutes(30));
        assert_eq!(parse_ttl("2h"), TimeDelta::hours(2));
        assert_eq!(parse_ttl("7d"), TimeDelta::days(7));
        assert_eq!(parse_ttl("1w"), TimeDelta::weeks(1));
    }

    #[test]
    fn test_parse_is_lenient_about_case_and_space() {
        assert_eq!(parse_ttl(" 3D "), TimeDelta::days(3));
        assert_eq!(parse_ttl("12 h"), TimeDelta::hours(12));
    }

    #[test]
    fn test_unparsable_falls_back_to_default() {
        for input in ["", "abc", "7", "d", "-1d", "0h", "5y", "1.5d", "99999999999999999999w"] {
            assert_eq!(parse_ttl(input), default_ttl(), "input {:?}", input);
        }
    }

    #[test]
    fn test_unrepresentable_expiry_falls_back_to_default() {
        for input in ["100000000000d", "9000000000000m", "20000000000w"] {
            assert_eq!(parse_ttl(input), default_ttl(), "input {:?}", input);
        }
        // Far off but still a valid date
        assert_eq!(parse_ttl("36500d"), TimeDelta::days(36_500));
    }

    #[test]
    fn test_huge_ttl_never_panics_when_applied() {
        use crate::model::{Record, Task};

        let task = Task::new("x").with_ttl(parse_ttl("100000000000d"));
        let expiry = task.meta().ttl_expiry.expect("expiry set");
        assert_eq!(expiry - task.created_at(), default_ttl());

        let task = Task::new("y").with_ttl(TimeDelta::days(1_000_000_000));
        let expiry = task.meta().ttl_expiry.expect("expiry set");
        assert_eq!(expiry - task.created_at(), default_ttl());
    }
}
