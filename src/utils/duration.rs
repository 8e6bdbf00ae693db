//! Duration parsing utilities.
//!
//! Command-line durations such as `--timeout 500ms` are parsed here; the
//! settings file goes through `humantime_serde` instead.

use std::time::Duration;

/// Parse a duration string (e.g. "500ms", "2s", "1m") into a [`Duration`]
///
/// Supported formats:
/// - Raw seconds: "2"
/// - Milliseconds: "500ms", "500msec", "500millis"
/// - Seconds: "2s", "2sec", "2secs", "2second", "2seconds"
/// - Minutes: "1m", "1min", "1mins", "1minute", "1minutes"
/// - Hours: "1h", "1hr", "1hrs", "1hour", "1hours"
///
/// # Arguments
/// * `duration` - The duration string to parse
///
/// # Returns
/// * `Ok(Duration)` if parsing succeeds
/// * `Err(String)` - An error message if parsing fails
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use p3ipam::utils::duration::parse_duration;
///
/// assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
/// assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
/// assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(duration: &str) -> Result<Duration, String> {
    let duration = duration.trim();
    let (number, unit) = duration.split_at(number_len(duration));

    let value: u64 = number
        .parse()
        .map_err(|_| format!("Invalid duration format: {}", duration))?;

    let millis_per_unit: u64 = match unit.trim() {
        "ms" | "msec" | "msecs" | "millis" => 1,
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1_000,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000,
        _ => return Err(format!("Invalid duration format: {}", duration)),
    };

    value
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("Duration out of range: {}", duration))
}

/// Length of the leading run of ASCII digits
fn number_len(duration: &str) -> usize {
    duration
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(duration.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        // Raw seconds
        assert_eq!(parse_duration("2"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));

        // Milliseconds
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("250millis"), Ok(Duration::from_millis(250)));

        // Seconds
        assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("3 seconds"), Ok(Duration::from_secs(3)));

        // Minutes and hours
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2min"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("1.5s").is_err());
        assert!(parse_duration("5minutesx").is_err());
        assert!(parse_duration("99999999999999999h").is_err());
    }
}
