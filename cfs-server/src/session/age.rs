use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use super::error::SessionError;

/// Parses an age token of the form `NwNdNhNm` into a point in time `age`
/// before `now`. Recovers the exact grammar from
/// `original_source/.../sessions.py::_age_to_timestamp`: for each unit in
/// `weeks, days, hours, minutes` (in that order) a case-insensitive
/// `(\d+)<unit-letter>` is searched in the token and, if found, summed into
/// the duration subtracted from `now`.
pub fn parse_age(token: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, SessionError> {
    let mut total = Duration::zero();
    let mut matched_anything = false;

    for (letter, to_duration) in [
        ('w', Duration::weeks as fn(i64) -> Duration),
        ('d', Duration::days as fn(i64) -> Duration),
        ('h', Duration::hours as fn(i64) -> Duration),
        ('m', Duration::minutes as fn(i64) -> Duration),
    ] {
        let pattern = format!(r"(?i)(\d+)\w*{letter}");
        let re = Regex::new(&pattern).expect("static regex is valid");
        if let Some(caps) = re.captures(token) {
            let amount: i64 = caps[1]
                .parse()
                .map_err(|_| SessionError::InvalidAge(token.to_string()))?;
            total = total + to_duration(amount);
            matched_anything = true;
        }
    }

    if !matched_anything {
        return Err(SessionError::InvalidAge(token.to_string()));
    }

    Ok(now - total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_combined_weeks_days_hours_minutes() {
        let cutoff = parse_age("1w2d3h4m", now()).unwrap();
        let expected = now() - Duration::weeks(1) - Duration::days(2) - Duration::hours(3) - Duration::minutes(4);
        assert_eq!(cutoff, expected);
    }

    #[test]
    fn parses_single_unit() {
        let cutoff = parse_age("5h", now()).unwrap();
        assert_eq!(cutoff, now() - Duration::hours(5));
    }

    #[test]
    fn rejects_token_with_no_recognized_units() {
        assert!(parse_age("banana", now()).is_err());
    }
}
