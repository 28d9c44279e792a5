//! Service configuration, read from the environment (and `.env`).

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("malformed BMA_ENDPOINTS entry {0:?}, expected currency=url[,url]")]
    MalformedEndpoints(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Node base URLs per currency.
    pub endpoints: HashMap<String, Vec<String>>,
    pub request_timeout: Duration,
    /// Period of the background sync loop; zero disables it.
    pub sync_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("wallet-data"),
            endpoints: HashMap::new(),
            request_timeout: Duration::from_secs(10),
            sync_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = parse_number("PORT", &port)?;
        }
        if let Some(dir) = lookup("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("BMA_ENDPOINTS") {
            config.endpoints = parse_endpoints(&raw)?;
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_number("REQUEST_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "REQUEST_TIMEOUT_SECS",
                    value: "0".to_string(),
                });
            }
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = lookup("SYNC_INTERVAL_SECS") {
            config.sync_interval = Duration::from_secs(parse_number("SYNC_INTERVAL_SECS", &secs)?);
        }
        Ok(config)
    }

    /// Configured currencies, sorted.
    pub fn currencies(&self) -> Vec<String> {
        let mut currencies: Vec<String> = self.endpoints.keys().cloned().collect();
        currencies.sort();
        currencies
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

/// `g1=https://a,https://b;g1-test=https://c`
fn parse_endpoints(raw: &str) -> Result<HashMap<String, Vec<String>>, ConfigError> {
    let mut endpoints: HashMap<String, Vec<String>> = HashMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((currency, urls)) = entry.split_once('=') else {
            return Err(ConfigError::MalformedEndpoints(entry.to_string()));
        };
        let currency = currency.trim();
        let urls: Vec<String> = urls
            .split(',')
            .map(|u| u.trim().trim_end_matches('/'))
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();
        if currency.is_empty() || urls.is_empty() {
            return Err(ConfigError::MalformedEndpoints(entry.to_string()));
        }
        endpoints.entry(currency.to_string()).or_default().extend(urls);
    }
    Ok(endpoints)
}
