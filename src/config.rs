use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Process settings read from the environment.
///
/// The server itself uses `http_port`, the log settings and `seed_fixtures`.
/// `api_url` and `probe_timeout_ms` configure a client-side store picked by
/// [`crate::store::connect`], `geocoder_url` feeds
/// [`crate::geo::Geocoder::from_config`] and `session_file` backs
/// [`crate::session::AuthContext::open`].
#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub api_url: String,
    pub geocoder_url: String,
    pub probe_timeout_ms: u64,
    pub seed_fixtures: bool,
    pub session_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("compact") => LogFormat::Compact,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact/json"
                )));
            }
        };

        Ok(Self {
            http_port: parse_or_default(&lookup, "HTTP_PORT", 3000)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            api_url: lookup("API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            geocoder_url: lookup("GEOCODER_URL")
                .unwrap_or_else(|| "https://nominatim.openstreetmap.org".to_string()),
            probe_timeout_ms: parse_or_default(&lookup, "PROBE_TIMEOUT_MS", 2000)?,
            seed_fixtures: parse_or_default(&lookup, "SEED_FIXTURES", true)?,
            session_file: lookup("SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".fast-shipping/session.json")),
        })
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{Config, LogFormat};

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, crate::error::AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.api_url, "http://localhost:3000");
        assert_eq!(config.log_format, LogFormat::Compact);
        assert!(config.seed_fixtures);
    }

    #[test]
    fn api_url_loses_trailing_slash() {
        let config = config_from(&[("API_URL", "http://store:4000/")]).unwrap();
        assert_eq!(config.api_url, "http://store:4000");
    }

    #[test]
    fn invalid_port_is_reported_with_its_key() {
        let err = config_from(&[("HTTP_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("invalid HTTP_PORT"));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(config_from(&[("LOG_FORMAT", "yaml")]).is_err());
    }
}
