//! Merge parsed records into the measurement hypertables.
//!
//! The whole merge is one unit of work: stage both record sets with
//! `COPY`, check that every Tado identifier resolves to a known home, zone
//! and device, then upsert into the permanent tables. On conflict a column
//! takes the incoming value only when it is non-null, so an import never
//! erases values that are already stored (including the status columns that
//! only the realtime poller fills).

use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use diesel::PgConnection;
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use diesel::result::ConnectionError;
use diesel::sql_types::{BigInt, Double, Nullable, Text, Timestamptz};
use log::{debug, info, warn};

use crate::db::staging::{
    CREATE_TMP_CLIMATE, CREATE_TMP_WEATHER, DROP_STAGING, StagedClimate, StagedWeather, tmp_climate, tmp_weather,
};
use crate::models::records::{ClimateRecord, WeatherRecord};
use crate::schema::{devices, homes, zones};
use crate::services::report::{fmt_float, fmt_id};

/// Errors that abort a merge. Nothing is left behind when one is returned.
#[derive(Debug)]
pub enum IngestError {
    /// Could not open a database connection
    Connection(ConnectionError),
    /// A statement or the transaction itself failed
    Store(diesel::result::Error),
    /// A record timestamp is not a zoned instant
    InvalidTimestamp(String),
    /// Staged rows reference homes that do not exist
    MissingHomes { table: &'static str, count: i64 },
    /// Staged climate rows reference zones that do not exist in their home
    MissingZones { count: i64 },
    /// Staged climate rows reference devices that do not exist in their home
    MissingDevices { count: i64 },
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Connection(e) => write!(f, "database connection failed: {}", e),
            IngestError::Store(e) => write!(f, "database error: {}", e),
            IngestError::InvalidTimestamp(ts) => write!(f, "unparsable timestamp in parsed records: {:?}", ts),
            IngestError::MissingHomes { table, count } => {
                write!(f, "missing homes for {} {} row(s)", count, table)
            }
            IngestError::MissingZones { count } => write!(f, "missing zones for {} climate row(s)", count),
            IngestError::MissingDevices { count } => write!(f, "missing devices for {} climate row(s)", count),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IngestError::Connection(e) => Some(e),
            IngestError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<diesel::result::Error> for IngestError {
    fn from(value: diesel::result::Error) -> Self {
        IngestError::Store(value)
    }
}

impl From<ConnectionError> for IngestError {
    fn from(value: ConnectionError) -> Self {
        IngestError::Connection(value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    /// Undo everything at the end while still reporting the counts.
    pub rollback: bool,
    /// Number of staged rows per table to log before upserting; 0 disables.
    pub preview_rows: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeCounts {
    pub climate_inserted: i64,
    pub climate_updated: i64,
    pub weather_inserted: i64,
    pub weather_updated: i64,
}

#[derive(Debug, QueryableByName)]
struct UpsertTally {
    #[diesel(sql_type = BigInt)]
    inserted: i64,
    #[diesel(sql_type = BigInt)]
    updated: i64,
}

#[derive(Debug, QueryableByName)]
struct ClimatePreview {
    #[diesel(sql_type = Timestamptz)]
    time: DateTime<Utc>,
    #[diesel(sql_type = BigInt)]
    home_id: i64,
    #[diesel(sql_type = Nullable<BigInt>)]
    zone_id: Option<i64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    device_id: Option<i64>,
    #[diesel(sql_type = Nullable<Double>)]
    inside_temp_c: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    humidity_pct: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    setpoint_temp_c: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    heating_power_pct: Option<f64>,
    #[diesel(sql_type = Text)]
    source: String,
}

#[derive(Debug, QueryableByName)]
struct WeatherPreview {
    #[diesel(sql_type = Timestamptz)]
    time: DateTime<Utc>,
    #[diesel(sql_type = BigInt)]
    home_id: i64,
    #[diesel(sql_type = Nullable<Double>)]
    outside_temp_c: Option<f64>,
    #[diesel(sql_type = Nullable<Text>)]
    weather_state: Option<String>,
    #[diesel(sql_type = Text)]
    source: String,
}

const CLIMATE_PREVIEW: &str = "
    SELECT
        c.time,
        h.id AS home_id,
        z.id AS zone_id,
        d.id AS device_id,
        c.inside_temp_c,
        c.humidity_pct,
        c.setpoint_temp_c,
        c.heating_power_pct,
        c.source
    FROM tmp_climate c
    JOIN homes h ON h.tado_home_id = c.tado_home_id
    LEFT JOIN zones z ON z.home_id = h.id AND z.tado_zone_id = c.tado_zone_id
    LEFT JOIN devices d ON d.home_id = h.id AND d.tado_device_id = NULLIF(c.tado_device_id, '')
    ORDER BY c.time
    LIMIT $1";

const WEATHER_PREVIEW: &str = "
    SELECT
        w.time,
        h.id AS home_id,
        w.outside_temp_c,
        NULLIF(w.weather_state, '') AS weather_state,
        w.source
    FROM tmp_weather w
    JOIN homes h ON h.tado_home_id = w.tado_home_id
    ORDER BY w.time
    LIMIT $1";

// `xmax = 0` holds only for tuples created by this statement, which lets the
// upsert itself report whether each row was inserted or merged.
const CLIMATE_UPSERT: &str = "
    WITH mapped AS (
        SELECT
            c.time,
            h.id AS home_id,
            z.id AS zone_id,
            d.id AS device_id,
            c.inside_temp_c,
            c.humidity_pct,
            c.setpoint_temp_c,
            c.heating_power_pct,
            c.source
        FROM tmp_climate c
        JOIN homes h ON h.tado_home_id = c.tado_home_id
        LEFT JOIN zones z ON z.home_id = h.id AND z.tado_zone_id = c.tado_zone_id
        LEFT JOIN devices d ON d.home_id = h.id AND d.tado_device_id = NULLIF(c.tado_device_id, '')
    ), upsert AS (
        INSERT INTO climate_measurements (
            time, home_id, zone_id, device_id, source,
            inside_temp_c, humidity_pct, setpoint_temp_c, heating_power_pct,
            ac_power_on, ac_mode, window_open, battery_low, connection_up
        )
        SELECT
            time, home_id, zone_id, device_id, source,
            inside_temp_c, humidity_pct, setpoint_temp_c, heating_power_pct,
            NULL, NULL, NULL, NULL, NULL
        FROM mapped
        ON CONFLICT (time, home_id, source, zone_id, device_id)
        DO UPDATE SET
            inside_temp_c = COALESCE(EXCLUDED.inside_temp_c, climate_measurements.inside_temp_c),
            humidity_pct = COALESCE(EXCLUDED.humidity_pct, climate_measurements.humidity_pct),
            setpoint_temp_c = COALESCE(EXCLUDED.setpoint_temp_c, climate_measurements.setpoint_temp_c),
            heating_power_pct = COALESCE(EXCLUDED.heating_power_pct, climate_measurements.heating_power_pct),
            ac_power_on = COALESCE(EXCLUDED.ac_power_on, climate_measurements.ac_power_on),
            ac_mode = COALESCE(EXCLUDED.ac_mode, climate_measurements.ac_mode),
            window_open = COALESCE(EXCLUDED.window_open, climate_measurements.window_open),
            battery_low = COALESCE(EXCLUDED.battery_low, climate_measurements.battery_low),
            connection_up = COALESCE(EXCLUDED.connection_up, climate_measurements.connection_up)
        RETURNING (xmax = 0) AS inserted
    )
    SELECT
        COALESCE(SUM(CASE WHEN inserted THEN 1 ELSE 0 END), 0)::bigint AS inserted,
        COALESCE(SUM(CASE WHEN inserted THEN 0 ELSE 1 END), 0)::bigint AS updated
    FROM upsert";

const WEATHER_UPSERT: &str = "
    WITH mapped AS (
        SELECT
            w.time,
            h.id AS home_id,
            w.outside_temp_c,
            NULLIF(w.weather_state, '') AS weather_state,
            w.source
        FROM tmp_weather w
        JOIN homes h ON h.tado_home_id = w.tado_home_id
    ), upsert AS (
        INSERT INTO weather_measurements (
            time, home_id, source, outside_temp_c, solar_intensity_pct, weather_state
        )
        SELECT time, home_id, source, outside_temp_c, NULL, weather_state
        FROM mapped
        ON CONFLICT (home_id, time, source)
        DO UPDATE SET
            outside_temp_c = COALESCE(EXCLUDED.outside_temp_c, weather_measurements.outside_temp_c),
            solar_intensity_pct = COALESCE(EXCLUDED.solar_intensity_pct, weather_measurements.solar_intensity_pct),
            weather_state = COALESCE(EXCLUDED.weather_state, weather_measurements.weather_state)
        RETURNING (xmax = 0) AS inserted
    )
    SELECT
        COALESCE(SUM(CASE WHEN inserted THEN 1 ELSE 0 END), 0)::bigint AS inserted,
        COALESCE(SUM(CASE WHEN inserted THEN 0 ELSE 1 END), 0)::bigint AS updated
    FROM upsert";

pub fn connect(database_url: &str) -> Result<PgConnection, IngestError> {
    Ok(PgConnection::establish(database_url)?)
}

/// Stage, validate and upsert both record sets in a single transaction.
///
/// With `options.rollback` set the transaction is rolled back after the
/// upserts; the returned counts still describe what the merge would have done.
pub fn upsert_into_database(
    conn: &mut PgConnection,
    climate: &[ClimateRecord],
    weather: &[WeatherRecord],
    options: MergeOptions,
) -> Result<MergeCounts, IngestError> {
    let (staged_climate, staged_weather) = stage_records(climate, weather)?;

    in_unit_of_work(conn, options.rollback, |conn| {
        load_staging(conn, &staged_climate, &staged_weather)?;
        validate_staging(conn)?;
        if options.preview_rows > 0 {
            log_preview(conn, options.preview_rows)?;
        }

        let climate_tally: UpsertTally = diesel::sql_query(CLIMATE_UPSERT).get_result(conn)?;
        debug!(
            "Ingest: climate upsert inserted={} updated={}",
            climate_tally.inserted, climate_tally.updated
        );
        let weather_tally: UpsertTally = diesel::sql_query(WEATHER_UPSERT).get_result(conn)?;
        debug!(
            "Ingest: weather upsert inserted={} updated={}",
            weather_tally.inserted, weather_tally.updated
        );

        diesel::sql_query(DROP_STAGING).execute(conn)?;

        Ok(MergeCounts {
            climate_inserted: climate_tally.inserted,
            climate_updated: climate_tally.updated,
            weather_inserted: weather_tally.inserted,
            weather_updated: weather_tally.updated,
        })
    })
}

/// Convert both record sets to staging rows. Fails on the first timestamp
/// that is not a zoned instant, before any statement is sent.
fn stage_records(
    climate: &[ClimateRecord],
    weather: &[WeatherRecord],
) -> Result<(Vec<StagedClimate>, Vec<StagedWeather>), IngestError> {
    let staged_climate = climate
        .iter()
        .map(|r| StagedClimate::from_record(r).ok_or_else(|| IngestError::InvalidTimestamp(r.time.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    let staged_weather = weather
        .iter()
        .map(|r| StagedWeather::from_record(r).ok_or_else(|| IngestError::InvalidTimestamp(r.time.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((staged_climate, staged_weather))
}

fn in_unit_of_work<T>(
    conn: &mut PgConnection,
    rollback: bool,
    work: impl FnOnce(&mut PgConnection) -> Result<T, IngestError>,
) -> Result<T, IngestError> {
    <AnsiTransactionManager as TransactionManager<PgConnection>>::begin_transaction(conn)?;
    match work(conn) {
        Ok(value) => {
            if rollback {
                <AnsiTransactionManager as TransactionManager<PgConnection>>::rollback_transaction(conn)?;
                info!("Ingest: transaction rolled back on request");
            } else {
                <AnsiTransactionManager as TransactionManager<PgConnection>>::commit_transaction(conn)?;
            }
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) =
                <AnsiTransactionManager as TransactionManager<PgConnection>>::rollback_transaction(conn)
            {
                warn!("Ingest: rollback after failure also failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

fn load_staging(
    conn: &mut PgConnection,
    climate: &[StagedClimate],
    weather: &[StagedWeather],
) -> Result<(), IngestError> {
    diesel::sql_query(CREATE_TMP_CLIMATE).execute(conn)?;
    diesel::sql_query(CREATE_TMP_WEATHER).execute(conn)?;

    if !climate.is_empty() {
        let copied = diesel::copy_from(tmp_climate::table)
            .from_insertable(climate)
            .execute(conn)?;
        debug!("Ingest: staged {} climate row(s)", copied);
    }
    if !weather.is_empty() {
        let copied = diesel::copy_from(tmp_weather::table)
            .from_insertable(weather)
            .execute(conn)?;
        debug!("Ingest: staged {} weather row(s)", copied);
    }
    Ok(())
}

fn validate_staging(conn: &mut PgConnection) -> Result<(), IngestError> {
    let climate_without_home: i64 = tmp_climate::table
        .left_join(homes::table.on(homes::tado_home_id.eq(tmp_climate::tado_home_id)))
        .filter(homes::id.is_null())
        .count()
        .get_result(conn)?;
    if climate_without_home > 0 {
        return Err(IngestError::MissingHomes {
            table: "climate",
            count: climate_without_home,
        });
    }

    let weather_without_home: i64 = tmp_weather::table
        .left_join(homes::table.on(homes::tado_home_id.eq(tmp_weather::tado_home_id)))
        .filter(homes::id.is_null())
        .count()
        .get_result(conn)?;
    if weather_without_home > 0 {
        return Err(IngestError::MissingHomes {
            table: "weather",
            count: weather_without_home,
        });
    }

    let climate_without_zone: i64 = tmp_climate::table
        .inner_join(homes::table.on(homes::tado_home_id.eq(tmp_climate::tado_home_id)))
        .left_join(
            zones::table.on(zones::home_id
                .eq(homes::id)
                .and(zones::tado_zone_id.eq(tmp_climate::tado_zone_id))),
        )
        .filter(zones::id.is_null())
        .count()
        .get_result(conn)?;
    if climate_without_zone > 0 {
        return Err(IngestError::MissingZones {
            count: climate_without_zone,
        });
    }

    let climate_without_device: i64 = tmp_climate::table
        .inner_join(homes::table.on(homes::tado_home_id.eq(tmp_climate::tado_home_id)))
        .left_join(
            devices::table.on(devices::home_id
                .eq(homes::id)
                .and(devices::tado_device_id.eq(tmp_climate::tado_device_id))),
        )
        .filter(tmp_climate::tado_device_id.ne(""))
        .filter(devices::id.is_null())
        .count()
        .get_result(conn)?;
    if climate_without_device > 0 {
        return Err(IngestError::MissingDevices {
            count: climate_without_device,
        });
    }

    Ok(())
}

fn log_preview(conn: &mut PgConnection, limit: i64) -> Result<(), IngestError> {
    let climate: Vec<ClimatePreview> = diesel::sql_query(CLIMATE_PREVIEW).bind::<BigInt, _>(limit).load(conn)?;
    info!("Database preview (climate_measurements):");
    if climate.is_empty() {
        info!("  (none)");
    }
    for row in &climate {
        info!(
            "  {} home={} zone={} device={} inside={} humidity={} setpoint={} heating={} source={}",
            row.time,
            row.home_id,
            fmt_id(row.zone_id),
            fmt_id(row.device_id),
            fmt_float(row.inside_temp_c),
            fmt_float(row.humidity_pct),
            fmt_float(row.setpoint_temp_c),
            fmt_float(row.heating_power_pct),
            row.source
        );
    }

    let weather: Vec<WeatherPreview> = diesel::sql_query(WEATHER_PREVIEW).bind::<BigInt, _>(limit).load(conn)?;
    info!("Database preview (weather_measurements):");
    if weather.is_empty() {
        info!("  (none)");
    }
    for row in &weather {
        info!(
            "  {} home={} outside={} state={} source={}",
            row.time,
            row.home_id,
            fmt_float(row.outside_temp_c),
            row.weather_state.as_deref().unwrap_or("-"),
            row.source
        );
    }
    Ok(())
}
