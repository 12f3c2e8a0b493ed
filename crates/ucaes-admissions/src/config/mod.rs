use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::admissions::{AdmissionsSettings, AllocatorSettings, SubmissionPolicy};

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub admissions: AdmissionsConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            admissions: AdmissionsConfig::from_env()?,
        })
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Application-ID prefix and counter retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionsConfig {
    pub id_prefix: String,
    pub counter_max_attempts: u32,
    pub counter_backoff_ms: u64,
}

impl Default for AdmissionsConfig {
    fn default() -> Self {
        Self {
            id_prefix: "UCAES".to_string(),
            counter_max_attempts: 5,
            counter_backoff_ms: 25,
        }
    }
}

impl AdmissionsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let id_prefix = env::var("ADMISSIONS_ID_PREFIX")
            .map(|prefix| prefix.trim().to_ascii_uppercase())
            .unwrap_or(defaults.id_prefix);
        if id_prefix.is_empty() {
            return Err(ConfigError::EmptyIdPrefix);
        }

        let counter_max_attempts = parse_var(
            "ADMISSIONS_COUNTER_MAX_ATTEMPTS",
            defaults.counter_max_attempts,
        )?;
        if counter_max_attempts == 0 {
            return Err(ConfigError::InvalidNumber {
                variable: "ADMISSIONS_COUNTER_MAX_ATTEMPTS",
            });
        }

        let counter_backoff_ms =
            parse_var("ADMISSIONS_COUNTER_BACKOFF_MS", defaults.counter_backoff_ms)?;

        Ok(Self {
            id_prefix,
            counter_max_attempts,
            counter_backoff_ms,
        })
    }

    pub fn settings(&self) -> AdmissionsSettings {
        AdmissionsSettings {
            id_prefix: self.id_prefix.clone(),
            allocator: AllocatorSettings {
                max_attempts: self.counter_max_attempts,
                retry_backoff: Duration::from_millis(self.counter_backoff_ms),
            },
            submission_policy: SubmissionPolicy::default(),
        }
    }
}

fn parse_var<N: std::str::FromStr>(variable: &'static str, default: N) -> Result<N, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<N>()
            .map_err(|_| ConfigError::InvalidNumber { variable }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    EmptyIdPrefix,
    AcademicYearOutOfRange { start: u16 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a positive integer")
            }
            ConfigError::EmptyIdPrefix => write!(f, "ADMISSIONS_ID_PREFIX must not be empty"),
            ConfigError::AcademicYearOutOfRange { start } => {
                write!(f, "academic year starting {start} has no four-digit end year")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::EmptyIdPrefix
            | ConfigError::AcademicYearOutOfRange { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("ADMISSIONS_ID_PREFIX");
        env::remove_var("ADMISSIONS_COUNTER_MAX_ATTEMPTS");
        env::remove_var("ADMISSIONS_COUNTER_BACKOFF_MS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.admissions, AdmissionsConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn admissions_settings_follow_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ADMISSIONS_ID_PREFIX", " ucaes ");
        env::set_var("ADMISSIONS_COUNTER_MAX_ATTEMPTS", "8");
        env::set_var("ADMISSIONS_COUNTER_BACKOFF_MS", "0");
        let config = AppConfig::load().expect("config loads");
        reset_env();

        let settings = config.admissions.settings();
        assert_eq!(settings.id_prefix, "UCAES");
        assert_eq!(settings.allocator.max_attempts, 8);
        assert!(settings.allocator.retry_backoff.is_zero());
    }

    #[test]
    fn rejects_zero_attempts() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ADMISSIONS_COUNTER_MAX_ATTEMPTS", "0");
        let result = AppConfig::load();
        reset_env();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidNumber {
                variable: "ADMISSIONS_COUNTER_MAX_ATTEMPTS"
            })
        ));
    }
}
