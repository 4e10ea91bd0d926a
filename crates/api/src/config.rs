//! API process configuration.

use std::net::SocketAddr;

use thiserror::Error;

pub const BIND_ENV: &str = "STOCKLEDGER_BIND";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Postgres connection string; the in-memory store is used when absent.
    pub database_url: Option<String>,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_bind = lookup(BIND_ENV).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = raw_bind.trim().parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            key: BIND_ENV,
            value: raw_bind.clone(),
            reason: e.to_string(),
        })?;
        let database_url = lookup(DATABASE_URL_ENV).filter(|url| !url.trim().is_empty());
        Ok(Self { bind_addr, database_url })
    }
}
