//! Runtime configuration read from the environment.

use std::{str::FromStr, time::Duration};

use secrecy::{ExposeSecret, SecretString};
use services::services::{
    claude_api::{DEFAULT_API_URL, DEFAULT_MODEL},
    notification::SweepConfig,
};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://taskdeck.db?mode=rwc";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3001;
const DEV_JWT_SECRET: &str = "taskdeck-development-secret-change-me";
const MAX_JWT_EXPIRY_HOURS: i64 = 24 * 365;
const MAX_DUE_SOON_HOURS: i64 = 24 * 90;
const MAX_RETENTION_DAYS: i64 = 365 * 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: SecretString,
    pub jwt_expiry: chrono::Duration,
    pub anthropic_api_key: Option<SecretString>,
    pub ai_model: String,
    pub ai_api_url: String,
    /// Allowed browser origin; any origin when unset
    pub cors_origin: Option<String>,
    pub sweep: SweepConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_expiry", &self.jwt_expiry)
            .field("ai_enabled", &self.anthropic_api_key.is_some())
            .field("ai_model", &self.ai_model)
            .field("cors_origin", &self.cors_origin)
            .field("sweep", &self.sweep)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            jwt_secret: SecretString::from(DEV_JWT_SECRET.to_string()),
            jwt_expiry: chrono::Duration::hours(168),
            anthropic_api_key: None,
            ai_model: DEFAULT_MODEL.to_string(),
            ai_api_url: DEFAULT_API_URL.to_string(),
            cors_origin: None,
            sweep: SweepConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => SecretString::from(secret),
            None => {
                warn!("JWT_SECRET is not set, using an insecure development secret");
                defaults.jwt_secret
            }
        };

        let sweep = SweepConfig {
            sweep_interval: Duration::from_secs(parse(&get, "NOTIFICATION_SWEEP_SECS", 60)?),
            cleanup_interval: Duration::from_secs(parse(&get, "CLEANUP_SWEEP_SECS", 3600)?),
            due_soon_window: span(&get, "DUE_SOON_HOURS", 24, MAX_DUE_SOON_HOURS, chrono::Duration::try_hours)?,
            retention: span(
                &get,
                "NOTIFICATION_RETENTION_DAYS",
                30,
                MAX_RETENTION_DAYS,
                chrono::Duration::try_days,
            )?,
        };
        if sweep.sweep_interval.is_zero() || sweep.cleanup_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "NOTIFICATION_SWEEP_SECS/CLEANUP_SWEEP_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT", DEFAULT_PORT)?,
            jwt_secret,
            jwt_expiry: span(
                &get,
                "JWT_EXPIRY_HOURS",
                168,
                MAX_JWT_EXPIRY_HOURS,
                chrono::Duration::try_hours,
            )?,
            anthropic_api_key: get("ANTHROPIC_API_KEY").map(SecretString::from),
            ai_model: get("AI_MODEL").unwrap_or(defaults.ai_model),
            ai_api_url: get("AI_API_URL").unwrap_or(defaults.ai_api_url),
            cors_origin: get("CORS_ORIGIN"),
            sweep,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn jwt_secret_bytes(&self) -> &[u8] {
        self.jwt_secret.expose_secret().as_bytes()
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// A whole number of hours or days in `1..=max`.
fn span<G>(
    get: &G,
    key: &'static str,
    default: i64,
    max: i64,
    unit: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let amount = parse(get, key, default)?;
    (1..=max)
        .contains(&amount)
        .then(|| unit(amount))
        .flatten()
        .ok_or_else(|| ConfigError::Invalid {
            key,
            value: amount.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:3001");
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.jwt_expiry, chrono::Duration::hours(168));
        assert!(config.anthropic_api_key.is_none());
        assert_eq!(config.sweep.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.sweep.retention, chrono::Duration::days(30));
    }

    #[test]
    fn values_are_read_and_blank_ones_ignored() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("JWT_SECRET", "s3cret"),
            ("ANTHROPIC_API_KEY", "  "),
            ("DUE_SOON_HOURS", "6"),
            ("CORS_ORIGIN", "http://localhost:5173"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt_secret_bytes(), b"s3cret");
        assert!(config.anthropic_api_key.is_none());
        assert_eq!(config.sweep.due_soon_window, chrono::Duration::hours(6));
        assert_eq!(config.cors_origin.as_deref(), Some("http://localhost:5173"));
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
        assert!(Config::from_lookup(lookup(&[("CLEANUP_SWEEP_SECS", "0")])).is_err());
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        for (key, value) in [
            ("JWT_EXPIRY_HOURS", "9223372036854775807"),
            ("JWT_EXPIRY_HOURS", "0"),
            ("DUE_SOON_HOURS", "-5"),
            ("NOTIFICATION_RETENTION_DAYS", "1000000000000"),
        ] {
            let err = Config::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: k, .. } if k == key), "{key}={value}");
        }
        let config = Config::from_lookup(lookup(&[("JWT_EXPIRY_HOURS", "8760")])).unwrap();
        assert_eq!(config.jwt_expiry, chrono::Duration::days(365));
    }
}
