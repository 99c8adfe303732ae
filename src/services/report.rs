//! Operator-facing summaries. Everything here goes to the log only.

use log::info;
use serde::Serialize;

use crate::models::records::ParseSummary;
use crate::services::ingest::MergeCounts;

pub fn fmt_float(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

pub fn fmt_id(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Render one parsed record as a single JSON line for the sample log.
pub fn describe<T: Serialize>(row: &T) -> String {
    serde_json::to_string(row).unwrap_or_else(|e| format!("<unserializable record: {}>", e))
}

pub fn log_summary(summary: &ParseSummary) {
    info!("Climate rows prepared: {}", summary.climate_rows.len());
    info!("Weather rows prepared: {}", summary.weather_rows.len());
    if summary.skipped_missing_home > 0 {
        info!("Skipped rows missing homeId: {}", summary.skipped_missing_home);
    }
    if summary.skipped_missing_zone > 0 {
        info!("Skipped climate points missing zoneId: {}", summary.skipped_missing_zone);
    }
}

pub fn log_sample(summary: &ParseSummary, max_rows: usize) {
    if max_rows == 0 {
        return;
    }
    info!("Sample climate rows:");
    if summary.climate_rows.is_empty() {
        info!("  (none)");
    }
    for row in summary.climate_rows.iter().take(max_rows) {
        info!("  {}", describe(row));
    }

    info!("Sample weather rows:");
    if summary.weather_rows.is_empty() {
        info!("  (none)");
    }
    for row in summary.weather_rows.iter().take(max_rows) {
        info!("  {}", describe(row));
    }
}

pub fn log_merge_counts(counts: &MergeCounts) {
    info!(
        "Climate rows inserted: {}, updated: {}",
        counts.climate_inserted, counts.climate_updated
    );
    info!(
        "Weather rows inserted: {}, updated: {}",
        counts.weather_inserted, counts.weather_updated
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::records::{ClimateRecord, Source, WeatherRecord};

    #[test]
    fn describes_records_as_json_lines() {
        let climate = ClimateRecord {
            time: "2024-01-05T10:00:00Z".to_string(),
            home_tado_id: 1001,
            zone_tado_id: 1,
            device_tado_id: None,
            inside_temp_c: Some(20.5),
            humidity_pct: None,
            setpoint_temp_c: Some(21.0),
            heating_power_pct: None,
            source: Source::Historical,
        };
        assert_eq!(
            describe(&climate),
            r#"{"time":"2024-01-05T10:00:00Z","home_tado_id":1001,"zone_tado_id":1,"device_tado_id":null,"inside_temp_c":20.5,"humidity_pct":null,"setpoint_temp_c":21.0,"heating_power_pct":null,"source":"historical"}"#
        );

        let weather = WeatherRecord {
            time: "2024-01-05T10:00:03Z".to_string(),
            home_tado_id: 1001,
            outside_temp_c: None,
            weather_state: Some("SUN".to_string()),
            source: Source::Realtime,
        };
        assert_eq!(
            describe(&weather),
            r#"{"time":"2024-01-05T10:00:03Z","home_tado_id":1001,"outside_temp_c":null,"weather_state":"SUN","source":"realtime"}"#
        );
    }

    #[test]
    fn formats_ids() {
        assert_eq!(fmt_id(Some(12)), "12");
        assert_eq!(fmt_id(None), "-");
    }
}
