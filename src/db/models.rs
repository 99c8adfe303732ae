//! Diesel models for the tables this importer touches.
//!
//! Homes, zones and devices are owned by the realtime service; the importer
//! only joins against them to resolve Tado identifiers to surrogate keys, so
//! their insertable forms exist for seeding store tests. The measurement
//! rows are written with set-based SQL and read back only by those tests.

// Values stored in the measurement `source` column.
pub mod event_source {
    pub const REALTIME: &str = "realtime";
    pub const HISTORICAL: &str = "historical";
}

#[cfg(test)]
pub use self::rows::*;

#[cfg(test)]
mod rows {
    use chrono::{DateTime, Utc};
    use diesel::prelude::*;

    use crate::schema;

    #[derive(Debug, Clone, Insertable)]
    #[diesel(table_name = schema::homes)]
    pub struct NewHome {
        pub tado_home_id: i64,
        pub name: Option<String>,
        pub timezone: Option<String>,
    }

    #[derive(Debug, Clone, Insertable)]
    #[diesel(table_name = schema::zones)]
    pub struct NewZone {
        pub home_id: i64,
        pub tado_zone_id: i64,
        pub name: Option<String>,
        pub zone_type: Option<String>,
    }

    #[derive(Debug, Clone, Insertable)]
    #[diesel(table_name = schema::devices)]
    pub struct NewDevice {
        pub home_id: i64,
        pub tado_device_id: String,
        pub short_serial_no: Option<String>,
        pub device_type: Option<String>,
        pub firmware_version: Option<String>,
    }

    // Hypertable: climate_measurements
    #[derive(Debug, Clone, Queryable, Selectable)]
    #[diesel(table_name = schema::climate_measurements)]
    pub struct ClimateMeasurement {
        pub id: i64,
        pub time: DateTime<Utc>,
        pub home_id: i64,
        pub zone_id: Option<i64>,
        pub device_id: Option<i64>,
        pub source: String,
        pub inside_temp_c: Option<f64>,
        pub humidity_pct: Option<f64>,
        pub setpoint_temp_c: Option<f64>,
        pub heating_power_pct: Option<f64>,
        pub ac_power_on: Option<bool>,
        pub ac_mode: Option<String>,
        pub window_open: Option<bool>,
        pub battery_low: Option<bool>,
        pub connection_up: Option<bool>,
    }

    // Hypertable: weather_measurements
    #[derive(Debug, Clone, Queryable, Selectable)]
    #[diesel(table_name = schema::weather_measurements)]
    pub struct WeatherMeasurement {
        pub id: i64,
        pub time: DateTime<Utc>,
        pub home_id: i64,
        pub source: String,
        pub outside_temp_c: Option<f64>,
        pub solar_intensity_pct: Option<f64>,
        pub weather_state: Option<String>,
    }
}
