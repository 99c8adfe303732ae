pub mod models {
    pub mod records;
}

pub mod config;
pub mod db {
    pub mod models;
    pub mod staging;
}
pub mod influx_csv;
pub mod schema;
pub mod utils;
pub mod services {
    pub mod aggregate;
    pub mod ingest;
    pub mod report;
}

use crate::config::{Cli, Config, RunMode};
use crate::services::ingest::{self, MergeOptions};
use crate::services::{aggregate, report};
use clap::Parser;
use diesel::PgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{error, info};
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

pub fn run(cli: &Cli) -> Result<(), String> {
    // 1) Resolve config; rejects bad switches before the file is touched
    let cfg = Config::from_env(cli)?;
    info!(
        "Config loaded (input={}, mode={:?}, sample_rows={}, preview_rows={}, apply_migrations={})",
        cfg.csv_path.display(),
        cfg.mode,
        cfg.sample_rows,
        cfg.preview_rows,
        cfg.apply_migrations
    );

    // 2) Parse and aggregate the export
    let summary = aggregate::parse_csv(&cfg.csv_path)
        .map_err(|e| format!("reading {} failed: {}", cfg.csv_path.display(), e))?;
    report::log_summary(&summary);
    report::log_sample(&summary, cfg.sample_rows);

    let database_url = match (cfg.mode, cfg.database_url.as_deref()) {
        (RunMode::ParseOnly, _) | (_, None) => {
            info!("Dry run: CSV parsed; database untouched");
            info!("Parse-only dry run complete");
            return Ok(());
        }
        (_, Some(url)) => url,
    };

    // 3) Connect DB
    let mut conn = ingest::connect(database_url).map_err(|e| e.to_string())?;
    info!("Connected to database");

    if cfg.apply_migrations {
        apply_database_migrations(&mut conn)?;
    }

    // 4) Stage, validate and upsert in one transaction
    let options = MergeOptions {
        rollback: cfg.mode == RunMode::Rollback,
        preview_rows: i64::from(cfg.preview_rows),
    };
    let counts = ingest::upsert_into_database(&mut conn, &summary.climate_rows, &summary.weather_rows, options)
        .map_err(|e| e.to_string())?;
    report::log_merge_counts(&counts);

    if options.rollback {
        info!("Dry run: transaction rolled back");
        info!("Rollback dry run complete");
    } else {
        info!("Import complete");
    }
    Ok(())
}

fn load_env(cli: &Cli) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = cli.env_file.as_ref() {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        load_env_file(path)?;
        return Ok(Some(LoadedEnvFile {
            path: path.clone(),
            explicit: true,
        }));
    }

    let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
    let default_path = cwd.join(".env");
    if default_path.is_file() {
        load_env_file(&default_path)?;
        Ok(Some(LoadedEnvFile {
            path: default_path,
            explicit: false,
        }))
    } else {
        Ok(None)
    }
}

// Variables already present in the process environment take precedence.
fn load_env_file(path: &Path) -> Result<(), String> {
    dotenvy::from_path(path).map_err(|e| format!("failed to load {}: {}", path.display(), e))
}

fn main() {
    let cli = Cli::parse();

    let loaded_env = match load_env(&cli) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "tado-transfer {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(&cli) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
