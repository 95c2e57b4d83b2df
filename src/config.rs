// src/config.rs

use anyhow::{anyhow, bail, Context, Result};
use std::{collections::HashMap, fmt, path::PathBuf};
use url::Url;

/// Rows handed to the sink per loader window.
pub const ROW_CHUNK_SIZE: usize = 500_000;
/// Rows per multi-row `INSERT`.
pub const INSERT_BATCH_SIZE: usize = 5_000;

/// Connection settings for the PostgreSQL sink.
#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl DbConfig {
    /// `tokio_postgres::Config` for `database`, which is either the target
    /// database or the `postgres` maintenance database used for bootstrap.
    pub fn pg_config(&self, database: &str) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(database)
            .application_name("ridesload");
        if !self.password.is_empty() {
            cfg.password(&self.password);
        }
        cfg
    }
}

// keeps the password out of logs
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Immutable run configuration, built once at startup and passed to every
/// component.
#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub base_url: Url,
    pub year: i32,
    pub start_month: u32,
    pub end_month: u32,
    pub table: String,
    pub timestamp_column: String,
    pub staging_dir: PathBuf,
    pub ensure_database: bool,
    /// Rows per loader window.
    pub row_chunk_size: usize,
    /// Rows per `INSERT` statement (further capped by the bind-parameter limit).
    pub insert_batch_size: usize,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Build the configuration from an explicit set of `KEY=value` pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();

        let db = DbConfig {
            host: require(&vars, "DB_HOST")?.to_string(),
            port: parse_or(lookup(&vars, "DB_PORT"), "DB_PORT", 5432)?,
            name: require(&vars, "DB_NAME")?.to_string(),
            user: require(&vars, "DB_USER")?.to_string(),
            password: vars.get("DB_PASSWORD").cloned().unwrap_or_default(),
        };

        let base_url = parse_base_url(require(&vars, "BASE_URL")?)?;
        let year: i32 = require(&vars, "YEAR")?
            .parse()
            .context("YEAR must be an integer")?;
        let start_month = parse_or(lookup(&vars, "START_MONTH"), "START_MONTH", 1u32)?;
        let end_month: u32 = require(&vars, "END_MONTH")?
            .parse()
            .context("END_MONTH must be an integer")?;

        for (key, month) in [("START_MONTH", start_month), ("END_MONTH", end_month)] {
            if !(1..=12).contains(&month) {
                bail!("{} must be within 1..=12, got {}", key, month);
            }
        }

        let ensure_database = match lookup(&vars, "ENSURE_DATABASE") {
            None => false,
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => bail!("ENSURE_DATABASE must be a boolean, got {:?}", other),
            },
        };

        Ok(Config {
            db,
            base_url,
            year,
            start_month,
            end_month,
            table: lookup(&vars, "TABLE_NAME").unwrap_or("raw_rides").to_string(),
            timestamp_column: lookup(&vars, "TIMESTAMP_COLUMN")
                .unwrap_or("dropoff_datetime")
                .to_string(),
            staging_dir: PathBuf::from(lookup(&vars, "STAGING_DIR").unwrap_or(".")),
            ensure_database,
            row_chunk_size: positive(
                lookup(&vars, "ROW_CHUNK_SIZE"),
                "ROW_CHUNK_SIZE",
                ROW_CHUNK_SIZE,
            )?,
            insert_batch_size: positive(
                lookup(&vars, "INSERT_BATCH_SIZE"),
                "INSERT_BATCH_SIZE",
                INSERT_BATCH_SIZE,
            )?,
        })
    }
}

fn lookup<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn require<'a>(vars: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    lookup(vars, key).ok_or_else(|| anyhow!("missing required environment variable {}", key))
}

fn parse_or<T>(raw: Option<&str>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        None => Ok(default),
        Some(v) => v
            .parse()
            .with_context(|| format!("{} has invalid value {:?}", key, v)),
    }
}

fn positive(raw: Option<&str>, key: &str, default: usize) -> Result<usize> {
    let v = parse_or(raw, key, default)?;
    if v == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(v)
}

/// Parse `BASE_URL`, forcing a trailing slash so `Url::join` appends the
/// file name instead of replacing the last path segment.
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut normalised = raw.to_string();
    if !normalised.ends_with('/') {
        normalised.push('/');
    }
    Url::parse(&normalised).with_context(|| format!("parsing BASE_URL {}", raw))
}
