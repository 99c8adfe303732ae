//! Wide per-timestamp records rebuilt from the long-format Influx export.

use serde::Serialize;
use std::fmt::{self, Display, Formatter};

use crate::db::models::event_source;

/// Provenance of a measurement: backfilled history or a live sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Historical,
    Realtime,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Historical => event_source::HISTORICAL,
            Source::Realtime => event_source::REALTIME,
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One zone/device reading. Any subset of the measurement fields may be set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateRecord {
    pub time: String,
    pub home_tado_id: i64,
    pub zone_tado_id: i64,
    pub device_tado_id: Option<String>,
    pub inside_temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub setpoint_temp_c: Option<f64>,
    pub heating_power_pct: Option<f64>,
    pub source: Source,
}

/// One home-level weather reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherRecord {
    pub time: String,
    pub home_tado_id: i64,
    pub outside_temp_c: Option<f64>,
    pub weather_state: Option<String>,
    pub source: Source,
}

/// Output of a full pass over an export file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseSummary {
    pub climate_rows: Vec<ClimateRecord>,
    pub weather_rows: Vec<WeatherRecord>,
    /// Counted per source row.
    pub skipped_missing_home: usize,
    /// Counted per distinct climate key.
    pub skipped_missing_zone: usize,
}
