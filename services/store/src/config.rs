//! services/store/src/config.rs
//!
//! Defines the store configuration and its loading logic.
//!
//! Connection settings are loaded from environment variables once at startup.
//! The `.env` file is used for local development.

use chrono_tz::Tz;

/// The civil timezone used for `lastViewed` timestamps unless overridden.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Jerusalem;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
}

/// Holds everything needed to reach the store.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_name: String,
    pub timezone: Tz,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Only `DB_URL` and `DB_NAME` are read. A `.env` file in the current
    /// directory is honoured outside of tests so that tests stay hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        Ok(Self {
            database_url: required("DB_URL")?,
            database_name: required("DB_NAME")?,
            timezone: DEFAULT_TIMEZONE,
        })
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }
}
