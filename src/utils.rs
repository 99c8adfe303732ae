use chrono::{DateTime, FixedOffset, Timelike};

use crate::models::records::Source;

/// Heating demand levels as reported by `callForHeat`, in percent.
const HEATING_LEVELS: [(&str, f64); 4] = [("NONE", 0.0), ("LOW", 33.0), ("MEDIUM", 66.0), ("HIGH", 100.0)];

/// Historical samples in the export sit on this grid.
const HISTORICAL_STEP_MINUTES: u32 = 15;

pub fn parse_int(value: Option<&str>) -> Option<i64> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }
    text.parse().ok()
}

pub fn parse_float(value: Option<&str>) -> Option<f64> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }
    text.parse().ok()
}

/// Map a heating level label (or, failing that, its numeric level) to a
/// heating power percentage.
///
/// The label wins whenever it names a known level, case-insensitively. The
/// numeric fallback is bucketed to the same four steps; values in the gaps
/// between the steps (e.g. `1.5`) have no meaning and yield `None`.
pub fn translate_heating(level: &str, numeric_text: Option<&str>) -> Option<f64> {
    let label = level.trim().to_ascii_uppercase();
    if let Some((_, pct)) = HEATING_LEVELS.iter().find(|(name, _)| *name == label) {
        return Some(*pct);
    }

    let raw = parse_float(numeric_text)?;
    if raw <= 0.0 {
        Some(0.0)
    } else if raw == 1.0 {
        Some(33.0)
    } else if raw == 2.0 {
        Some(66.0)
    } else if raw >= 3.0 {
        Some(100.0)
    } else {
        None
    }
}

/// Scale a unit-interval humidity to percent, clamped to `[0, 100]`.
pub fn humidity_percent(fraction: f64) -> f64 {
    (fraction * 100.0).clamp(0.0, 100.0)
}

/// Parse an export timestamp. Only zoned instants are accepted: `Z`-suffixed
/// or with an explicit offset, `T` or space separated.
pub fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%#z"))
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .ok()
}

/// Decide whether a sample came from the 15-minute historical grid or from
/// the realtime poller. Anything that does not parse is treated as realtime.
pub fn classify_source(timestamp: &str) -> Source {
    match parse_timestamp(timestamp) {
        Some(ts)
            if ts.second() == 0 && ts.nanosecond() == 0 && ts.minute() % HISTORICAL_STEP_MINUTES == 0 =>
        {
            Source::Historical
        }
        _ => Source::Realtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_parsers_treat_blank_and_garbage_as_absent() {
        assert_eq!(parse_int(Some(" 42 ")), Some(42));
        assert_eq!(parse_int(Some("")), None);
        assert_eq!(parse_int(Some("4.2")), None);
        assert_eq!(parse_int(None), None);
        assert_eq!(parse_float(Some(" 21.5\t")), Some(21.5));
        assert_eq!(parse_float(Some("   ")), None);
        assert_eq!(parse_float(Some("warm")), None);
    }

    #[test]
    fn heating_label_wins_over_numeric_level() {
        assert_eq!(translate_heating("low", Some("3")), Some(33.0));
        assert_eq!(translate_heating("LoW", None), Some(33.0));
        assert_eq!(translate_heating(" HIGH ", Some("0")), Some(100.0));
        assert_eq!(translate_heating("none", Some("2")), Some(0.0));
    }

    #[test]
    fn heating_numeric_fallback_buckets() {
        assert_eq!(translate_heating("", Some("2")), Some(66.0));
        assert_eq!(translate_heating("", Some("-5")), Some(0.0));
        assert_eq!(translate_heating("", Some("0")), Some(0.0));
        assert_eq!(translate_heating("", Some("1")), Some(33.0));
        assert_eq!(translate_heating("", Some("7")), Some(100.0));
        assert_eq!(translate_heating("", Some("1.5")), None);
        assert_eq!(translate_heating("", Some("0.5")), None);
        assert_eq!(translate_heating("", Some("n/a")), None);
        assert_eq!(translate_heating("unknown", Some("")), None);
    }

    #[test]
    fn humidity_is_clamped() {
        assert_eq!(humidity_percent(1.2), 100.0);
        assert_eq!(humidity_percent(-0.1), 0.0);
        assert!((humidity_percent(0.456) - 45.6).abs() < 1e-9);
    }

    #[test]
    fn classifies_quarter_hour_samples_as_historical() {
        assert_eq!(classify_source("2024-01-05T10:15:00Z"), Source::Historical);
        assert_eq!(classify_source("2024-01-05T10:00:00+02:00"), Source::Historical);
        assert_eq!(classify_source("2024-01-05 10:45:00+00:00"), Source::Historical);
    }

    #[test]
    fn classifies_jittered_or_unparsable_samples_as_realtime() {
        assert_eq!(classify_source("2024-01-05T10:15:01Z"), Source::Realtime);
        assert_eq!(classify_source("2024-01-05T10:15:00.250Z"), Source::Realtime);
        assert_eq!(classify_source("2024-01-05T10:10:00Z"), Source::Realtime);
        assert_eq!(classify_source("yesterday"), Source::Realtime);
        assert_eq!(classify_source(""), Source::Realtime);
    }
}
