//! services/journal_api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use mood_journal_core::{InsightConfig, MonitorConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// The deployment flavor. Development disables the manual refresh throttle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl FromStr for AppEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(AppEnv::Development),
            "production" | "prod" => Ok(AppEnv::Production),
            other => Err(format!("'{}' is not one of development, production", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub environment: AppEnv,
    pub data_dir: PathBuf,
    pub openai_api_key: Option<String>,
    pub transcription_model: String,
    pub classifier_model: String,
    pub insights_model: String,
    pub firebase_api_key: Option<String>,
    pub identity_base_url: String,
    pub token_base_url: String,
    pub connectivity_probe_url: String,
    pub poll_interval: Duration,
    pub refresh_cooldown: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server Settings ---
        let bind_address = parse_or(&var, "BIND_ADDRESS", "127.0.0.1:3000")?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let environment = parse_or(&var, "APP_ENV", "production")?;
        let data_dir = var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        // --- API Keys (as optional) ---
        let openai_api_key = var("OPENAI_API_KEY");
        let firebase_api_key = var("FIREBASE_API_KEY");

        // --- Adapter-specific Settings ---
        let transcription_model =
            var("TRANSCRIPTION_MODEL").unwrap_or_else(|| "whisper-1".to_string());
        let classifier_model =
            var("CLASSIFIER_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let insights_model = var("INSIGHTS_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let identity_base_url = var("IDENTITY_BASE_URL")
            .unwrap_or_else(|| "https://identitytoolkit.googleapis.com/v1".to_string());
        let token_base_url = var("TOKEN_BASE_URL")
            .unwrap_or_else(|| "https://securetoken.googleapis.com/v1".to_string());
        let connectivity_probe_url = var("CONNECTIVITY_PROBE_URL")
            .unwrap_or_else(|| "https://www.gstatic.com/generate_204".to_string());

        // --- Session Monitor Timing ---
        let poll_interval = Duration::from_secs(parse_or(&var, "POLL_INTERVAL_SECS", "5")?);
        let refresh_cooldown =
            Duration::from_secs(parse_or(&var, "REFRESH_COOLDOWN_SECS", "30")?);
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "POLL_INTERVAL_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            log_level,
            environment,
            data_dir,
            openai_api_key,
            transcription_model,
            classifier_model,
            insights_model,
            firebase_api_key,
            identity_base_url,
            token_base_url,
            connectivity_probe_url,
            poll_interval,
            refresh_cooldown,
        })
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: self.poll_interval,
            refresh_cooldown: self.refresh_cooldown,
            throttle_refresh: self.environment == AppEnv::Production,
        }
    }

    pub fn insight_config(&self) -> InsightConfig {
        InsightConfig::default()
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var(name).unwrap_or_else(|| default.to_string());
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.environment, AppEnv::Production);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.refresh_cooldown, Duration::from_secs(30));
        assert!(config.openai_api_key.is_none());
        assert!(config.monitor_config().throttle_refresh);
    }

    #[test]
    fn development_disables_refresh_throttle() {
        let config =
            Config::from_lookup(lookup(&[("APP_ENV", "development"), ("POLL_INTERVAL_SECS", "2")]))
                .unwrap();
        let monitor = config.monitor_config();
        assert!(!monitor.throttle_refresh);
        assert_eq!(monitor.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = Config::from_lookup(lookup(&[("BIND_ADDRESS", "nowhere")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "BIND_ADDRESS"));

        let err = Config::from_lookup(lookup(&[("POLL_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "POLL_INTERVAL_SECS"));

        let err = Config::from_lookup(lookup(&[("APP_ENV", "staging")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "APP_ENV"));
    }
}
