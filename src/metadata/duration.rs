//! `xs:duration` parsing for metadata `cacheDuration` attributes.

use std::time::Duration;

const SECS_PER_MINUTE: f64 = 60.0;
const SECS_PER_HOUR: f64 = 60.0 * SECS_PER_MINUTE;
const SECS_PER_DAY: f64 = 24.0 * SECS_PER_HOUR;
// Calendar units have no fixed length; use the usual approximations.
const SECS_PER_MONTH: f64 = 30.0 * SECS_PER_DAY;
const SECS_PER_YEAR: f64 = 365.0 * SECS_PER_DAY;

/// Parse an `xs:duration` such as `PT1H`, `P1DT12H` or `PT0.5S`.
///
/// Negative durations parse to zero. Years and months are approximated as
/// 365 and 30 days.
pub fn parse_xs_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let rest = rest
        .strip_prefix('P')
        .ok_or_else(|| format!("duration '{}' must start with 'P'", s))?;

    let mut secs = 0.0_f64;
    let mut in_time = false;
    let mut components = 0;
    let mut time_components = 0;
    let mut last_rank = None;
    let mut number = String::new();

    for c in rest.chars() {
        match c {
            '0'..='9' | '.' => number.push(c),
            'T' if !in_time && number.is_empty() => in_time = true,
            designator => {
                if number.is_empty() {
                    return Err(format!("duration '{}' has a designator without a value", s));
                }
                if number.contains('.') && !(in_time && designator == 'S') {
                    return Err(format!("duration '{}' has a fraction outside seconds", s));
                }
                let value: f64 = number
                    .parse()
                    .map_err(|_| format!("duration '{}' has an invalid number '{}'", s, number))?;
                number.clear();

                let (rank, unit) = match (in_time, designator) {
                    (false, 'Y') => (0, SECS_PER_YEAR),
                    (false, 'M') => (1, SECS_PER_MONTH),
                    (false, 'D') => (2, SECS_PER_DAY),
                    (true, 'H') => (3, SECS_PER_HOUR),
                    (true, 'M') => (4, SECS_PER_MINUTE),
                    (true, 'S') => (5, 1.0),
                    _ => {
                        return Err(format!(
                            "duration '{}' has an unexpected designator '{}'",
                            s, designator
                        ))
                    }
                };

                // Units appear at most once, largest first
                if last_rank.is_some_and(|last| rank <= last) {
                    return Err(format!(
                        "duration '{}' has designator '{}' out of order",
                        s, designator
                    ));
                }
                last_rank = Some(rank);

                secs += value * unit;
                components += 1;
                if in_time {
                    time_components += 1;
                }
            }
        }
    }

    if !number.is_empty() {
        return Err(format!("duration '{}' ends without a designator", s));
    }
    if components == 0 || (in_time && time_components == 0) {
        return Err(format!("duration '{}' has no components", s));
    }

    if negative {
        return Ok(Duration::ZERO);
    }

    Duration::try_from_secs_f64(secs).map_err(|e| format!("duration '{}' out of range: {}", s, e))
}
