//! ISO 8601 duration parsing (`P1DT2H30M`, `PT45.5S`).
//!
//! Tracking durations are kept as seconds in `f64`; limit conditions and
//! run-time data arrive in the textual form and are converted here.

const SECS_PER_MINUTE: f64 = 60.0;
const SECS_PER_HOUR: f64 = 3_600.0;
const SECS_PER_DAY: f64 = 86_400.0;
// Calendar units are approximated the same way the run-time data model does.
const SECS_PER_MONTH: f64 = 30.0 * SECS_PER_DAY;
const SECS_PER_YEAR: f64 = 365.0 * SECS_PER_DAY;

/// Parse an ISO 8601 duration, or a bare number of seconds, into seconds.
pub fn parse_duration(input: &str) -> Option<f64> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<f64>() {
        return (!secs.is_nan()).then_some(secs);
    }

    let rest = s.strip_prefix('P').or_else(|| s.strip_prefix('p'))?;
    let mut total = 0.0;
    let mut in_time = false;
    let mut number = String::new();
    let mut saw_component = false;

    for c in rest.chars() {
        match c {
            'T' | 't' => {
                if in_time || !number.is_empty() {
                    return None;
                }
                in_time = true;
            }
            '0'..='9' | '.' => number.push(c),
            unit => {
                let value: f64 = number.parse().ok()?;
                number.clear();
                let factor = match (in_time, unit.to_ascii_uppercase()) {
                    (false, 'Y') => SECS_PER_YEAR,
                    (false, 'M') => SECS_PER_MONTH,
                    (false, 'W') => 7.0 * SECS_PER_DAY,
                    (false, 'D') => SECS_PER_DAY,
                    (true, 'H') => SECS_PER_HOUR,
                    (true, 'M') => SECS_PER_MINUTE,
                    (true, 'S') => 1.0,
                    _ => return None,
                };
                total += value * factor;
                saw_component = true;
            }
        }
    }

    if !number.is_empty() || !saw_component {
        return None;
    }
    Some(total)
}
