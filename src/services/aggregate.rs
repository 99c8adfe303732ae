//! Fold single-field export rows into wide climate and weather records.
//!
//! Every row of the export carries exactly one value. Rows that describe the
//! same instant are collected under a composite key; within a key each field
//! keeps the first value seen for it, and the provenance is fixed by the
//! first row that contributed to the key.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use log::{debug, trace};

use crate::influx_csv::{InfluxRows, RawRow};
use crate::models::records::{ClimateRecord, ParseSummary, Source, WeatherRecord};
use crate::utils::{classify_source, humidity_percent, parse_float, parse_int, translate_heating};

const HELPER_MEASUREMENT: &str = "intervalCumulativeHelper";
const SUNNY_MEASUREMENT: &str = "weather_sunny";
const SUNNY_FIELD: &str = "sunny";

/// (time, home, zone, device)
type ClimateKey = (String, i64, Option<i64>, Option<String>);
/// (time, home)
type WeatherKey = (String, i64);

#[derive(Debug, Default)]
struct ClimateFields {
    source: Option<Source>,
    inside_temp_c: Option<f64>,
    humidity_pct: Option<f64>,
    setpoint_temp_c: Option<f64>,
    heating_power_pct: Option<f64>,
}

#[derive(Debug, Default)]
struct WeatherFields {
    source: Option<Source>,
    outside_temp_c: Option<f64>,
    weather_state: Option<String>,
}

/// The measurement/field pairs the importer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Contribution {
    Humidity,
    HeatingPower,
    InsideTemperature,
    Setpoint,
    Weather,
}

impl Contribution {
    fn from_pair(measurement: &str, field: &str) -> Option<Self> {
        match (measurement, field) {
            ("humidity", "humidity") => Some(Contribution::Humidity),
            ("call_for_heat", "numericLevel") => Some(Contribution::HeatingPower),
            ("temperature", "temperature") => Some(Contribution::InsideTemperature),
            ("heating", "temperature") => Some(Contribution::Setpoint),
            ("weather", "temperature") => Some(Contribution::Weather),
            _ => None,
        }
    }
}

fn column<'a>(row: &'a RawRow, name: &str) -> &'a str {
    row.get(name).map(String::as_str).unwrap_or_default()
}

fn is_noise(measurement: &str, field: &str) -> bool {
    // header line repeated inside a table
    if measurement == "_measurement" && field == "_field" {
        return true;
    }
    measurement == HELPER_MEASUREMENT
        || field == HELPER_MEASUREMENT
        || measurement == SUNNY_MEASUREMENT
        || field == SUNNY_FIELD
}

#[derive(Debug, Default)]
pub struct Aggregator {
    climate: HashMap<ClimateKey, ClimateFields>,
    weather: HashMap<WeatherKey, WeatherFields>,
    skipped_missing_home: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: &RawRow) {
        let measurement = column(row, "_measurement").trim();
        let field = column(row, "_field").trim();
        if measurement.is_empty() || field.is_empty() || is_noise(measurement, field) {
            return;
        }

        let timestamp = column(row, "_time").trim();
        if timestamp.is_empty() {
            return;
        }
        let Some(home_id) = parse_int(row.get("homeId").map(String::as_str)) else {
            self.skipped_missing_home += 1;
            return;
        };

        let Some(contribution) = Contribution::from_pair(measurement, field) else {
            trace!("aggregate: ignoring {measurement}/{field}");
            return;
        };

        let zone_id = parse_int(row.get("zoneId").map(String::as_str));
        let device_id = Some(column(row, "deviceId").trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let level_text = column(row, "callForHeatLevel").trim();
        let raw_value = row.get("_value").map(String::as_str);
        let numeric_value = parse_float(raw_value);

        let climate_key = || (timestamp.to_string(), home_id, zone_id, device_id.clone());

        match contribution {
            Contribution::Humidity => {
                if let Some(v) = numeric_value {
                    let entry = self.climate_entry(climate_key(), timestamp);
                    entry.humidity_pct.get_or_insert(humidity_percent(v));
                }
            }
            Contribution::HeatingPower => {
                if let Some(pct) = translate_heating(level_text, raw_value) {
                    let entry = self.climate_entry(climate_key(), timestamp);
                    entry.heating_power_pct.get_or_insert(pct);
                }
            }
            Contribution::InsideTemperature => {
                if let Some(v) = numeric_value {
                    let entry = self.climate_entry(climate_key(), timestamp);
                    entry.inside_temp_c.get_or_insert(v);
                }
            }
            Contribution::Setpoint => {
                if let Some(v) = numeric_value {
                    let entry = self.climate_entry(climate_key(), timestamp);
                    entry.setpoint_temp_c.get_or_insert(v);
                }
            }
            Contribution::Weather => {
                if numeric_value.is_none() && level_text.is_empty() {
                    return;
                }
                let entry = self
                    .weather
                    .entry((timestamp.to_string(), home_id))
                    .or_default();
                entry.source.get_or_insert_with(|| classify_source(timestamp));
                if let Some(v) = numeric_value {
                    entry.outside_temp_c.get_or_insert(v);
                }
                if !level_text.is_empty() {
                    entry.weather_state.get_or_insert_with(|| level_text.to_string());
                }
            }
        }
    }

    fn climate_entry(&mut self, key: ClimateKey, timestamp: &str) -> &mut ClimateFields {
        let entry = self.climate.entry(key).or_default();
        entry.source.get_or_insert_with(|| classify_source(timestamp));
        entry
    }

    pub fn finish(self) -> ParseSummary {
        let mut skipped_missing_zone = 0;
        let mut climate_rows = Vec::with_capacity(self.climate.len());
        for ((time, home_tado_id, zone_id, device_tado_id), fields) in self.climate {
            let Some(zone_tado_id) = zone_id else {
                skipped_missing_zone += 1;
                continue;
            };
            climate_rows.push(ClimateRecord {
                time,
                home_tado_id,
                zone_tado_id,
                device_tado_id,
                inside_temp_c: fields.inside_temp_c,
                humidity_pct: fields.humidity_pct,
                setpoint_temp_c: fields.setpoint_temp_c,
                heating_power_pct: fields.heating_power_pct,
                source: fields.source.unwrap_or(Source::Historical),
            });
        }
        climate_rows.sort_by(|a, b| {
            (&a.time, a.home_tado_id, a.zone_tado_id, a.device_tado_id.as_deref().unwrap_or("")).cmp(&(
                &b.time,
                b.home_tado_id,
                b.zone_tado_id,
                b.device_tado_id.as_deref().unwrap_or(""),
            ))
        });

        let mut weather_rows = self
            .weather
            .into_iter()
            .map(|((time, home_tado_id), fields)| WeatherRecord {
                time,
                home_tado_id,
                outside_temp_c: fields.outside_temp_c,
                weather_state: fields.weather_state,
                source: fields.source.unwrap_or(Source::Historical),
            })
            .collect::<Vec<_>>();
        weather_rows.sort_by(|a, b| (&a.time, a.home_tado_id).cmp(&(&b.time, b.home_tado_id)));

        debug!(
            "aggregate: {} climate key(s) without zone, {} row(s) without home",
            skipped_missing_zone, self.skipped_missing_home
        );

        ParseSummary {
            climate_rows,
            weather_rows,
            skipped_missing_home: self.skipped_missing_home,
            skipped_missing_zone,
        }
    }
}

/// Fold a stream of rows into wide records, stopping at the first read error.
pub fn aggregate_rows<I, E>(rows: I) -> Result<ParseSummary, E>
where
    I: IntoIterator<Item = Result<RawRow, E>>,
{
    let mut aggregator = Aggregator::new();
    for row in rows {
        aggregator.push(&row?);
    }
    Ok(aggregator.finish())
}

/// Read and aggregate a whole export file.
pub fn parse_csv(path: &Path) -> io::Result<ParseSummary> {
    aggregate_rows(InfluxRows::open(path)?)
}
