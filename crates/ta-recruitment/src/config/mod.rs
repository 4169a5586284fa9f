use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::recruitment::TaCategory;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the recruitment service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub recruitment: RecruitmentConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidLogFormat(raw))?,
            Err(_) => LogFormat::Compact,
        };

        let recruitment = RecruitmentConfig {
            undergraduate_hours: hours_from_env(
                "TA_UNDERGRADUATE_HOURS",
                RecruitmentConfig::DEFAULT_UNDERGRADUATE_HOURS,
            )?,
            postgraduate_hours: hours_from_env(
                "TA_POSTGRADUATE_HOURS",
                RecruitmentConfig::DEFAULT_POSTGRADUATE_HOURS,
            )?,
            conflict_retries: match env::var("TA_CONFLICT_RETRIES") {
                Ok(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|retries| *retries > 0)
                    .ok_or(ConfigError::InvalidRetries(raw))?,
                Err(_) => RecruitmentConfig::DEFAULT_CONFLICT_RETRIES,
            },
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            recruitment,
        })
    }
}

fn hours_from_env(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidHours { key, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output layout for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Defaults applied to new rounds and the optimistic-concurrency retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecruitmentConfig {
    pub undergraduate_hours: u32,
    pub postgraduate_hours: u32,
    pub conflict_retries: u32,
}

impl RecruitmentConfig {
    pub const DEFAULT_UNDERGRADUATE_HOURS: u32 = 6;
    pub const DEFAULT_POSTGRADUATE_HOURS: u32 = 8;
    pub const DEFAULT_CONFLICT_RETRIES: u32 = 8;

    pub fn hour_limit(&self, category: TaCategory) -> u32 {
        match category {
            TaCategory::Undergraduate => self.undergraduate_hours,
            TaCategory::Postgraduate => self.postgraduate_hours,
        }
    }
}

impl Default for RecruitmentConfig {
    fn default() -> Self {
        Self {
            undergraduate_hours: Self::DEFAULT_UNDERGRADUATE_HOURS,
            postgraduate_hours: Self::DEFAULT_POSTGRADUATE_HOURS,
            conflict_retries: Self::DEFAULT_CONFLICT_RETRIES,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLogFormat(String),
    InvalidHours { key: &'static str, value: String },
    InvalidRetries(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json' (found '{value}')")
            }
            ConfigError::InvalidHours { key, value } => {
                write!(f, "{key} must be a whole number of hours (found '{value}')")
            }
            ConfigError::InvalidRetries(value) => {
                write!(f, "TA_CONFLICT_RETRIES must be a positive integer (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidLogFormat(_)
            | ConfigError::InvalidHours { .. }
            | ConfigError::InvalidRetries(_) => None,
        }
    }
}
