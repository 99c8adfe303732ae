//! Session-scoped staging tables used by the merge.
//!
//! Both tables are created as `TEMP ... ON COMMIT DROP` inside the merge
//! transaction; the declarations below only exist so the rows can be bulk
//! loaded with `COPY ... FROM STDIN` and validated with the query builder.
//! Columns mirror the parsed records: Tado identifiers, not surrogate keys.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::models::records::{ClimateRecord, WeatherRecord};
use crate::schema::{devices, homes, zones};
use crate::utils::parse_timestamp;

diesel::table! {
    tmp_climate (time, tado_home_id, tado_zone_id, tado_device_id) {
        time -> Timestamptz,
        tado_home_id -> Int8,
        tado_zone_id -> Int8,
        // empty string when the export carried no device
        tado_device_id -> Text,
        inside_temp_c -> Nullable<Float8>,
        humidity_pct -> Nullable<Float8>,
        setpoint_temp_c -> Nullable<Float8>,
        heating_power_pct -> Nullable<Float8>,
        source -> Text,
    }
}

diesel::table! {
    tmp_weather (time, tado_home_id) {
        time -> Timestamptz,
        tado_home_id -> Int8,
        outside_temp_c -> Nullable<Float8>,
        // empty string when the export carried no state
        weather_state -> Text,
        source -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(tmp_climate, homes);
diesel::allow_tables_to_appear_in_same_query!(tmp_climate, zones);
diesel::allow_tables_to_appear_in_same_query!(tmp_climate, devices);
diesel::allow_tables_to_appear_in_same_query!(tmp_weather, homes);

pub const CREATE_TMP_CLIMATE: &str = "
    CREATE TEMP TABLE tmp_climate (
        time timestamptz NOT NULL,
        tado_home_id bigint NOT NULL,
        tado_zone_id bigint NOT NULL,
        tado_device_id text NOT NULL,
        inside_temp_c double precision,
        humidity_pct double precision,
        setpoint_temp_c double precision,
        heating_power_pct double precision,
        source text NOT NULL
    ) ON COMMIT DROP";

pub const CREATE_TMP_WEATHER: &str = "
    CREATE TEMP TABLE tmp_weather (
        time timestamptz NOT NULL,
        tado_home_id bigint NOT NULL,
        outside_temp_c double precision,
        weather_state text NOT NULL,
        source text NOT NULL
    ) ON COMMIT DROP";

pub const DROP_STAGING: &str = "DROP TABLE IF EXISTS tmp_climate, tmp_weather";

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = tmp_climate, treat_none_as_default_value = false)]
pub struct StagedClimate {
    pub time: DateTime<Utc>,
    pub tado_home_id: i64,
    pub tado_zone_id: i64,
    pub tado_device_id: String,
    pub inside_temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub setpoint_temp_c: Option<f64>,
    pub heating_power_pct: Option<f64>,
    pub source: String,
}

impl StagedClimate {
    /// Returns `None` when the record's timestamp is not a zoned instant.
    pub fn from_record(record: &ClimateRecord) -> Option<Self> {
        Some(StagedClimate {
            time: parse_timestamp(&record.time)?.to_utc(),
            tado_home_id: record.home_tado_id,
            tado_zone_id: record.zone_tado_id,
            tado_device_id: record.device_tado_id.clone().unwrap_or_default(),
            inside_temp_c: record.inside_temp_c,
            humidity_pct: record.humidity_pct,
            setpoint_temp_c: record.setpoint_temp_c,
            heating_power_pct: record.heating_power_pct,
            source: record.source.as_str().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = tmp_weather, treat_none_as_default_value = false)]
pub struct StagedWeather {
    pub time: DateTime<Utc>,
    pub tado_home_id: i64,
    pub outside_temp_c: Option<f64>,
    pub weather_state: String,
    pub source: String,
}

impl StagedWeather {
    pub fn from_record(record: &WeatherRecord) -> Option<Self> {
        Some(StagedWeather {
            time: parse_timestamp(&record.time)?.to_utc(),
            tado_home_id: record.home_tado_id,
            outside_temp_c: record.outside_temp_c,
            weather_state: record.weather_state.clone().unwrap_or_default(),
            source: record.source.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::records::Source;
    use chrono::TimeZone;

    #[test]
    fn staged_climate_converts_offsets_to_utc_and_blanks_missing_device() {
        let record = ClimateRecord {
            time: "2024-03-01T10:15:00+01:00".to_string(),
            home_tado_id: 7,
            zone_tado_id: 3,
            device_tado_id: None,
            inside_temp_c: Some(21.0),
            humidity_pct: None,
            setpoint_temp_c: None,
            heating_power_pct: Some(33.0),
            source: Source::Historical,
        };
        let staged = StagedClimate::from_record(&record).expect("timestamp parses");
        assert_eq!(staged.time, Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap());
        assert_eq!(staged.tado_device_id, "");
        assert_eq!(staged.source, "historical");
    }

    #[test]
    fn staged_weather_rejects_naive_timestamps() {
        let record = WeatherRecord {
            time: "2024-03-01 10:15:00".to_string(),
            home_tado_id: 7,
            outside_temp_c: Some(4.5),
            weather_state: Some("CLOUDY".to_string()),
            source: Source::Realtime,
        };
        assert!(StagedWeather::from_record(&record).is_none());
    }

    // COPY needs every column bound, so `None` must stay NULL rather than DEFAULT.
    #[test]
    fn staged_rows_with_missing_values_build_copy_statements() {
        let climate = StagedClimate {
            time: Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap(),
            tado_home_id: 7,
            tado_zone_id: 3,
            tado_device_id: String::new(),
            inside_temp_c: None,
            humidity_pct: None,
            setpoint_temp_c: None,
            heating_power_pct: None,
            source: "historical".to_string(),
        };
        let weather = StagedWeather {
            time: Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap(),
            tado_home_id: 7,
            outside_temp_c: None,
            weather_state: String::new(),
            source: "realtime".to_string(),
        };
        let _climate_copy = diesel::copy_from(tmp_climate::table).from_insertable(std::slice::from_ref(&climate));
        let _weather_copy = diesel::copy_from(tmp_weather::table).from_insertable(std::slice::from_ref(&weather));
    }
}
