//! Suffixed duration parsing (`30s`, `5m`, `2h`, `1d`)

use crate::error::{HarnessError, Result};
use std::time::Duration;

/// Units accepted for run durations
const RUN_UNITS: &[char] = &['s', 'm', 'h', 'd'];

/// Units accepted for cleanup age filters
const AGE_UNITS: &[char] = &['m', 'h', 'd'];

/// Parse a run duration such as `30s`, `5m` or `1h`
pub fn parse_duration(input: &str) -> Result<Duration> {
    parse_with_units(input, RUN_UNITS)
}

/// Parse a cleanup age threshold. Only `m`, `h` and `d` are accepted.
pub fn parse_age(input: &str) -> Result<Duration> {
    parse_with_units(input, AGE_UNITS)
}

fn parse_with_units(input: &str, units: &[char]) -> Result<Duration> {
    let input = input.trim();
    let unit = input
        .chars()
        .last()
        .ok_or_else(|| HarnessError::Input("empty duration".to_string()))?;

    if !units.contains(&unit) {
        return Err(HarnessError::Input(format!(
            "unrecognized duration suffix in '{}' (expected one of: {})",
            input,
            units.iter().collect::<String>()
        )));
    }

    let value: u64 = input[..input.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| HarnessError::Input(format!("invalid duration '{}'", input)))?;

    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        _ => 86400,
    };

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| HarnessError::Input(format!("duration '{}' is too large", input)))
}

/// Render a duration the way k6 options expect it
pub fn format_k6(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_age_units() {
        assert_eq!(parse_age("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_age("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_age("30m").unwrap(), Duration::from_secs(1800));
    }

    #[test]
    fn test_parse_age_rejects_unknown_suffix() {
        let err = parse_age("5x").unwrap_err();
        assert!(err.is_input_error());

        // seconds are a run duration unit, not an age unit
        assert!(parse_age("30s").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration(" 1h ").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("1.5m").is_err());
        assert!(parse_duration("-2m").is_err());
    }

    #[test]
    fn test_oversized_values_are_input_errors() {
        assert!(parse_age("999999999999999999d").unwrap_err().is_input_error());
        assert!(parse_duration("99999999999999999999s").unwrap_err().is_input_error());
        assert!(parse_duration(&format!("{}s", u64::MAX)).is_ok());
    }

    #[test]
    fn test_format_k6() {
        assert_eq!(format_k6(Duration::from_secs(300)), "300s");
    }
}
