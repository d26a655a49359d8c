//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "bottega";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_JOBS_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_ORDERS_CONCURRENCY: u32 = 4;
const DEFAULT_EMAILS_CONCURRENCY: u32 = 2;
const DEFAULT_REPORTS_CONCURRENCY: u32 = 1;
const DEFAULT_LANE_CONCURRENCY: u32 = 1;
const DEFAULT_MONITORING_CONCURRENCY: u32 = 1;

/// Command-line arguments for the Bottega binary.
#[derive(Debug, Parser)]
#[command(name = "bottega", version, about = "Bottega catalog and order service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BOTTEGA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the fulfillment/maintenance worker pool and the scheduler.
    Worker(Box<WorkerArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub overrides: WorkerOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the service database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the jobs database pool size.
    #[arg(long = "database-jobs-max-connections", value_name = "COUNT")]
    pub database_jobs_max_connections: Option<u32>,

    /// Override the orders-lane worker concurrency.
    #[arg(long = "jobs-orders-concurrency", value_name = "COUNT")]
    pub jobs_orders_concurrency: Option<u32>,

    /// Override the emails-lane worker concurrency.
    #[arg(long = "jobs-emails-concurrency", value_name = "COUNT")]
    pub jobs_emails_concurrency: Option<u32>,

    /// Override the reports-lane worker concurrency.
    #[arg(long = "jobs-reports-concurrency", value_name = "COUNT")]
    pub jobs_reports_concurrency: Option<u32>,

    /// Override the default-lane worker concurrency.
    #[arg(long = "jobs-default-concurrency", value_name = "COUNT")]
    pub jobs_default_concurrency: Option<u32>,

    /// Override the monitoring-lane worker concurrency.
    #[arg(long = "jobs-monitoring-concurrency", value_name = "COUNT")]
    pub jobs_monitoring_concurrency: Option<u32>,

    /// Toggle the read-path cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the cache entry TTL in seconds.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub jobs: JobsSettings,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub jobs_max_connections: NonZeroU32,
}

/// Per-lane worker concurrency.
#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub orders_concurrency: NonZeroU32,
    pub emails_concurrency: NonZeroU32,
    pub reports_concurrency: NonZeroU32,
    pub default_concurrency: NonZeroU32,
    pub monitoring_concurrency: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Parse CLI arguments and load settings in one step.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("BOTTEGA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Worker(args)) => raw.apply_worker_overrides(&args.overrides),
        None => raw.apply_worker_overrides(&WorkerOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    jobs: RawJobsSettings,
    cache: RawCacheSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    jobs_max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    orders_concurrency: Option<u32>,
    emails_concurrency: Option<u32>,
    reports_concurrency: Option<u32>,
    default_concurrency: Option<u32>,
    monitoring_concurrency: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    ttl_seconds: Option<u64>,
}

impl RawSettings {
    fn apply_worker_overrides(&mut self, overrides: &WorkerOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(max) = overrides.database_jobs_max_connections {
            self.database.jobs_max_connections = Some(max);
        }
        if let Some(value) = overrides.jobs_orders_concurrency {
            self.jobs.orders_concurrency = Some(value);
        }
        if let Some(value) = overrides.jobs_emails_concurrency {
            self.jobs.emails_concurrency = Some(value);
        }
        if let Some(value) = overrides.jobs_reports_concurrency {
            self.jobs.reports_concurrency = Some(value);
        }
        if let Some(value) = overrides.jobs_default_concurrency {
            self.jobs.default_concurrency = Some(value);
        }
        if let Some(value) = overrides.jobs_monitoring_concurrency {
            self.jobs.monitoring_concurrency = Some(value);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            jobs,
            cache,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let jobs = build_jobs_settings(jobs)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            logging,
            database,
            jobs,
            cache,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero(
        "database.max_connections",
        database.max_connections.unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
    )?;
    let jobs_max_connections = non_zero(
        "database.jobs_max_connections",
        database
            .jobs_max_connections
            .unwrap_or(DEFAULT_DB_JOBS_MAX_CONNECTIONS),
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
        jobs_max_connections,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    Ok(JobsSettings {
        orders_concurrency: non_zero(
            "jobs.orders_concurrency",
            jobs.orders_concurrency.unwrap_or(DEFAULT_ORDERS_CONCURRENCY),
        )?,
        emails_concurrency: non_zero(
            "jobs.emails_concurrency",
            jobs.emails_concurrency.unwrap_or(DEFAULT_EMAILS_CONCURRENCY),
        )?,
        reports_concurrency: non_zero(
            "jobs.reports_concurrency",
            jobs.reports_concurrency
                .unwrap_or(DEFAULT_REPORTS_CONCURRENCY),
        )?,
        default_concurrency: non_zero(
            "jobs.default_concurrency",
            jobs.default_concurrency.unwrap_or(DEFAULT_LANE_CONCURRENCY),
        )?,
        monitoring_concurrency: non_zero(
            "jobs.monitoring_concurrency",
            jobs.monitoring_concurrency
                .unwrap_or(DEFAULT_MONITORING_CONCURRENCY),
        )?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let defaults = CacheConfig::default();
    let ttl_seconds = cache.ttl_seconds.unwrap_or(defaults.ttl_seconds);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheConfig {
        enabled: cache.enabled.unwrap_or(defaults.enabled),
        ttl_seconds,
    })
}

fn non_zero(key: &'static str, value: u32) -> Result<NonZeroU32, LoadError> {
    NonZeroU32::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let settings = Settings::from_raw(RawSettings::default()).expect("settings");
        assert_eq!(settings.database.max_connections.get(), 8);
        assert_eq!(settings.jobs.orders_concurrency.get(), 4);
        assert!(settings.cache.enabled);
        assert_eq!(settings.cache.ttl_seconds, 300);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let raw = RawSettings {
            jobs: RawJobsSettings {
                orders_concurrency: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key, .. }) if key == "jobs.orders_concurrency"
        ));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let raw = RawSettings {
            cache: RawCacheSettings {
                ttl_seconds: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key, .. }) if key == "cache.ttl_seconds"
        ));
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let mut raw = RawSettings::default();
        let overrides = WorkerOverrides {
            database_url: Some("postgres://localhost/bottega".to_string()),
            jobs_orders_concurrency: Some(9),
            cache_enabled: Some(false),
            ..Default::default()
        };
        raw.apply_worker_overrides(&overrides);

        let settings = Settings::from_raw(raw).expect("settings");
        assert_eq!(
            settings.database.url.as_deref(),
            Some("postgres://localhost/bottega")
        );
        assert_eq!(settings.jobs.orders_concurrency.get(), 9);
        assert!(!settings.cache.enabled);
    }

    #[test]
    fn blank_database_url_is_treated_as_unset() {
        let raw = RawSettings {
            database: RawDatabaseSettings {
                url: Some("   ".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = Settings::from_raw(raw).expect("settings");
        assert!(settings.database.url.is_none());
    }
}
