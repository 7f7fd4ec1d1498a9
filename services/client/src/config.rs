//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub supabase_url: String,
    pub anon_key: String,
    pub storage_bucket: String,
    pub log_level: Level,
    pub email: Option<String>,
    pub password: Option<String>,
    pub realtime_heartbeat: Duration,
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

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
        };

        // --- Backend Endpoint ---
        let supabase_url = required("SUPABASE_URL")?.trim_end_matches('/').to_string();
        if !supabase_url.starts_with("http://") && !supabase_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "SUPABASE_URL".to_string(),
                format!("'{}' is not an http(s) URL", supabase_url),
            ));
        }
        let anon_key = required("SUPABASE_ANON_KEY")?;

        let storage_bucket =
            lookup("STORAGE_BUCKET").unwrap_or_else(|| "object-images".to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Optional Credentials for the Headless Binary ---
        let email = lookup("CAMPUS_SWAP_EMAIL");
        let password = lookup("CAMPUS_SWAP_PASSWORD");

        let heartbeat_str = lookup("REALTIME_HEARTBEAT_SECS").unwrap_or_else(|| "30".to_string());
        let heartbeat_secs = heartbeat_str
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "REALTIME_HEARTBEAT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", heartbeat_str),
                )
            })?;

        Ok(Self {
            supabase_url,
            anon_key,
            storage_bucket,
            log_level,
            email,
            password,
            realtime_heartbeat: Duration::from_secs(heartbeat_secs),
        })
    }

    /// Both credentials, when the binary should sign in on startup.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.email.as_deref()?, self.password.as_deref()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let config = load(&[
            ("SUPABASE_URL", "https://abc.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon"),
        ])
        .unwrap();

        assert_eq!(config.supabase_url, "https://abc.supabase.co");
        assert_eq!(config.storage_bucket, "object-images");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.realtime_heartbeat, Duration::from_secs(30));
        assert!(config.credentials().is_none());
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let err = load(&[("SUPABASE_URL", "https://abc.supabase.co")]).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("SUPABASE_ANON_KEY".to_string()));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let base = [
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ];

        let mut vars = base.to_vec();
        vars.push(("RUST_LOG", "chatty"));
        assert!(matches!(load(&vars), Err(ConfigError::InvalidValue(name, _)) if name == "RUST_LOG"));

        let mut vars = base.to_vec();
        vars.push(("REALTIME_HEARTBEAT_SECS", "0"));
        assert!(load(&vars).is_err());

        assert!(load(&[("SUPABASE_URL", "abc.supabase.co"), ("SUPABASE_ANON_KEY", "anon")]).is_err());
    }

    #[test]
    fn credentials_need_both_values() {
        let config = load(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("CAMPUS_SWAP_EMAIL", "ana@ufrn.edu.br"),
            ("CAMPUS_SWAP_PASSWORD", "segredo"),
        ])
        .unwrap();
        assert_eq!(config.credentials(), Some(("ana@ufrn.edu.br", "segredo")));
    }
}
