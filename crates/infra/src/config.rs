//! Engine configuration.

use std::str::FromStr;

use tracing::warn;

pub const CONFLICT_RETRIES_ENV: &str = "STOCKLEDGER_CONFLICT_RETRIES";
pub const PAGE_SIZE_ENV: &str = "STOCKLEDGER_PAGE_SIZE";

/// Upper bound on any ledger page, whatever the caller asks for.
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How many times a workflow re-reads and re-validates after losing an
    /// optimistic concurrency race before giving up.
    pub max_conflict_retries: u32,
    /// Page size used by ledger history queries when none is requested.
    pub default_page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            default_page_size: 50,
        }
    }
}

impl EngineConfig {
    /// Read the configuration from the process environment.
    ///
    /// Unset or unparsable values fall back to the defaults (with a warning
    /// for the unparsable case).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_conflict_retries: parse_or(&lookup, CONFLICT_RETRIES_ENV, defaults.max_conflict_retries),
            default_page_size: parse_or(&lookup, PAGE_SIZE_ENV, defaults.default_page_size)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparsable configuration value");
            default
        }),
    }
}
