//! Command line and environment configuration.

use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_SAMPLE_ROWS: usize = 3;
pub const DEFAULT_PREVIEW_ROWS: u32 = 3;

/// Transfer an InfluxDB historical export of Tado data into PostgreSQL.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the raw CSV exported via `influx query --raw`
    pub csv: PathBuf,

    /// Parse the CSV and report counts without touching the database
    #[arg(long)]
    pub parse_only: bool,

    /// Run the database merge inside a transaction that is rolled back at the end
    #[arg(long)]
    pub rollback: bool,

    /// Load environment variables from this file instead of `./.env`
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// Parsed records per table to log before merging
    #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
    pub sample_rows: usize,

    /// Staged rows per table to preview against the database; 0 disables
    #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
    pub preview_rows: u32,

    /// Apply the embedded schema migrations before merging
    #[arg(long)]
    pub apply_migrations: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Parse only; the database is never contacted.
    ParseOnly,
    /// Merge and commit.
    Commit,
    /// Merge, report, then roll back.
    Rollback,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub csv_path: PathBuf,
    pub mode: RunMode,
    /// Present for every mode except `ParseOnly`.
    pub database_url: Option<String>,
    pub sample_rows: usize,
    pub preview_rows: u32,
    pub apply_migrations: bool,
}

impl Config {
    pub fn from_env(cli: &Cli) -> Result<Self, String> {
        Self::resolve(cli, std::env::var("DATABASE_URL").ok())
    }

    /// Validate the switches and the input path before any parsing starts.
    pub fn resolve(cli: &Cli, database_url: Option<String>) -> Result<Self, String> {
        let mode = match (cli.parse_only, cli.rollback) {
            (true, true) => return Err("--parse-only and --rollback cannot be combined".to_string()),
            (true, false) => RunMode::ParseOnly,
            (false, true) => RunMode::Rollback,
            (false, false) => RunMode::Commit,
        };

        if !cli.csv.is_file() {
            return Err(format!("Input file not found: {}", cli.csv.display()));
        }

        let database_url = match mode {
            RunMode::ParseOnly => None,
            RunMode::Commit | RunMode::Rollback => match database_url {
                Some(url) if !url.trim().is_empty() => Some(url.trim().to_string()),
                _ => return Err("DATABASE_URL must be set".to_string()),
            },
        };

        Ok(Config {
            csv_path: cli.csv.clone(),
            mode,
            database_url,
            sample_rows: cli.sample_rows,
            preview_rows: cli.preview_rows,
            apply_migrations: cli.apply_migrations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "tests/data/influx-export.csv";

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tado-transfer").chain(args.iter().copied())).expect("valid arguments")
    }

    #[test]
    fn defaults_to_commit_mode() {
        let cfg = Config::resolve(&cli(&[FIXTURE]), Some(" postgres://localhost/tado ".to_string())).unwrap();
        assert_eq!(cfg.mode, RunMode::Commit);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/tado"));
        assert_eq!(cfg.sample_rows, DEFAULT_SAMPLE_ROWS);
        assert_eq!(cfg.preview_rows, DEFAULT_PREVIEW_ROWS);
        assert!(!cfg.apply_migrations);
    }

    #[test]
    fn parse_only_does_not_need_a_database() {
        let cfg = Config::resolve(&cli(&[FIXTURE, "--parse-only"]), None).unwrap();
        assert_eq!(cfg.mode, RunMode::ParseOnly);
        assert_eq!(cfg.database_url, None);
    }

    #[test]
    fn rollback_requires_a_database() {
        let err = Config::resolve(&cli(&[FIXTURE, "--rollback"]), Some("   ".to_string())).unwrap_err();
        assert_eq!(err, "DATABASE_URL must be set");
        let cfg = Config::resolve(&cli(&[FIXTURE, "--rollback"]), Some("postgres://db".to_string())).unwrap();
        assert_eq!(cfg.mode, RunMode::Rollback);
    }

    #[test]
    fn rejects_conflicting_switches() {
        let err = Config::resolve(&cli(&[FIXTURE, "--parse-only", "--rollback"]), None).unwrap_err();
        assert!(err.contains("cannot be combined"));
    }

    #[test]
    fn rejects_missing_input_file() {
        let err = Config::resolve(&cli(&["tests/data/missing.csv", "--parse-only"]), None).unwrap_err();
        assert!(err.starts_with("Input file not found"));
    }

    #[test]
    fn accepts_sampling_overrides() {
        let cfg = Config::resolve(
            &cli(&[FIXTURE, "--parse-only", "--sample-rows", "0", "--preview-rows", "10"]),
            None,
        )
        .unwrap();
        assert_eq!(cfg.sample_rows, 0);
        assert_eq!(cfg.preview_rows, 10);
    }
}
