//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, time::Duration};

use clap::{Parser, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::infra::db::RetrySettings;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pollcast";
const ENV_PREFIX: &str = "POLLCAST";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_DB_IDLE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_DB_MAX_LIFETIME_SECS: u64 = 300;
const DEFAULT_COOKIE_MAX_AGE_SECS: u64 = 86_400;

/// Command-line arguments for the Pollcast binary.
#[derive(Debug, Default, Parser)]
#[command(name = "pollcast", version, about = "Pollcast voting backend")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "POLLCAST_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

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

    /// Toggle the Secure attribute on the session cookie.
    #[arg(
        long = "secure-cookie",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub secure_cookie: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheConfig,
    pub retry: RetrySettings,
    pub session: SessionSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
            database: DatabaseSettings::default(),
            cache: CacheConfig::default(),
            retry: RetrySettings::default(),
            session: SessionSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Absolute URL clients reach this service under; used to build image
    /// links in API payloads.
    pub base_url: String,
    /// Hard deadline after which a request's cancellation signal fires.
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            idle_timeout_secs: DEFAULT_DB_IDLE_TIMEOUT_SECS,
            max_lifetime_secs: DEFAULT_DB_MAX_LIFETIME_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Whether the session cookie carries the Secure attribute. Disable only
    /// for plain-HTTP local development.
    pub secure_cookie: bool,
    pub cookie_max_age_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            secure_cookie: true,
            cookie_max_age_secs: DEFAULT_COOKIE_MAX_AGE_SECS,
        }
    }
}

impl SessionSettings {
    pub fn cookie_max_age(&self) -> Duration {
        Duration::from_secs(self.cookie_max_age_secs)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Parse CLI arguments and resolve the full settings stack.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load_settings(&cli)?;
    Ok((cli, settings))
}

/// Resolve settings for a pre-parsed set of CLI arguments.
pub fn load_settings(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = &cli.config_file {
        builder = builder.add_source(File::from(path.clone()));
    }

    let raw = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let mut settings: Settings = raw.try_deserialize()?;
    apply_cli_overrides(&mut settings, cli);
    Ok(settings)
}

fn apply_cli_overrides(settings: &mut Settings, cli: &CliArgs) {
    if let Some(url) = &cli.database_url {
        settings.database.url = Some(url.clone());
    }
    if let Some(host) = &cli.server_host {
        settings.server.host = host.clone();
    }
    if let Some(port) = cli.server_port {
        settings.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }
    if let Some(json) = cli.log_json {
        settings.logging.format = if json {
            LogFormat::Json
        } else {
            LogFormat::Compact
        };
    }
    if let Some(secure) = cli.secure_cookie {
        settings.session.secure_cookie = secure;
    }
}
