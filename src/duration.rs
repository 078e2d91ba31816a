//! Duration parsing utilities for human-readable durations like "60s", "14d".

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};

/// Parse a duration string like "500ms", "60s", "15m", "24h", "14d".
///
/// The input is case-insensitive and whitespace is trimmed.
///
/// # Examples
///
/// ```
/// use hodlbook::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("14d").unwrap(), Duration::from_secs(14 * 24 * 60 * 60));
/// assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    // "ms" must be checked before "m" and "s".
    let (num, unit_ms): (&str, u64) = if let Some(num) = s.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = s.strip_suffix('d') {
        (num, 24 * 60 * 60 * 1000)
    } else if let Some(num) = s.strip_suffix('h') {
        (num, 60 * 60 * 1000)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60 * 1000)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1000)
    } else {
        anyhow::bail!("Duration must end with ms, s, m, h, or d");
    };

    let num: u64 = num
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in duration: {s}"))?;
    let millis = num.checked_mul(unit_ms).context("Duration is too large")?;

    Ok(Duration::from_millis(millis))
}

/// Format a duration using the largest unit that divides it evenly.
///
/// ```
/// use hodlbook::duration::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(60)), "1m");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
/// ```
pub fn format_duration(d: Duration) -> String {
    const MS_PER_DAY: u128 = 24 * 60 * 60 * 1000;
    const MS_PER_HOUR: u128 = 60 * 60 * 1000;
    const MS_PER_MINUTE: u128 = 60 * 1000;
    const MS_PER_SECOND: u128 = 1000;

    let ms = d.as_millis();
    for (unit, suffix) in [
        (MS_PER_DAY, "d"),
        (MS_PER_HOUR, "h"),
        (MS_PER_MINUTE, "m"),
        (MS_PER_SECOND, "s"),
    ] {
        if ms >= unit && ms % unit == 0 {
            return format!("{}{suffix}", ms / unit);
        }
    }
    format!("{ms}ms")
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}
