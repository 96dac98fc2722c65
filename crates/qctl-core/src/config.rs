//! The recognized configuration keys and their validation/default rules.
//!
//! Config is a small string-keyed map persisted by the `Store`; this module
//! only knows the handful of keys the core reads and how to validate a
//! proposed value for each. Unknown keys are rejected with `UnknownConfig`.

use crate::error::{QctlError, Result};

pub const BACKOFF_BASE: &str = "backoff_base";
pub const MAX_RETRIES: &str = "max_retries";
pub const DEFAULT_TIMEOUT: &str = "default_timeout";
pub const POLL_INTERVAL_MS: &str = "poll_interval_ms";

pub const RECOGNIZED_KEYS: &[&str] = &[BACKOFF_BASE, MAX_RETRIES, DEFAULT_TIMEOUT, POLL_INTERVAL_MS];

/// Default values for every recognized key, used to seed a fresh store and
/// as the fallback when `config_get` finds no row.
pub fn default_value(key: &str) -> Option<&'static str> {
    match key {
        BACKOFF_BASE => Some("2"),
        MAX_RETRIES => Some("3"),
        DEFAULT_TIMEOUT => Some("30"),
        POLL_INTERVAL_MS => Some("500"),
        _ => None,
    }
}

/// Validate a proposed value for a recognized key. Returns `UnknownConfig`
/// for keys outside `RECOGNIZED_KEYS`, `InvalidSpec` for a recognized key
/// whose value fails its own range check.
pub fn validate(key: &str, value: &str) -> Result<()> {
    match key {
        BACKOFF_BASE => {
            let n: i64 = value
                .parse()
                .map_err(|_| QctlError::InvalidSpec(format!("{key} must be an integer")))?;
            if n < 2 {
                return Err(QctlError::InvalidSpec(format!("{key} must be >= 2")));
            }
            Ok(())
        }
        MAX_RETRIES => {
            let n: i64 = value
                .parse()
                .map_err(|_| QctlError::InvalidSpec(format!("{key} must be an integer")))?;
            if n < 0 {
                return Err(QctlError::InvalidSpec(format!("{key} must be >= 0")));
            }
            Ok(())
        }
        DEFAULT_TIMEOUT => {
            let n: i64 = value
                .parse()
                .map_err(|_| QctlError::InvalidSpec(format!("{key} must be an integer")))?;
            if n <= 0 {
                return Err(QctlError::InvalidSpec(format!("{key} must be > 0")));
            }
            Ok(())
        }
        POLL_INTERVAL_MS => {
            let n: i64 = value
                .parse()
                .map_err(|_| QctlError::InvalidSpec(format!("{key} must be an integer")))?;
            if n <= 0 {
                return Err(QctlError::InvalidSpec(format!("{key} must be > 0")));
            }
            Ok(())
        }
        other => Err(QctlError::UnknownConfig(other.to_string())),
    }
}

/// A fully-resolved view of the recognized keys, fetched once per operation
/// that needs defaults (enqueue, claim's backoff calculation).
#[derive(Debug, Clone, Copy)]
pub struct ResolvedConfig {
    pub backoff_base: i64,
    pub max_retries: i64,
    pub default_timeout: i64,
    pub poll_interval_ms: i64,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            backoff_base: 2,
            max_retries: 3,
            default_timeout: 30,
            poll_interval_ms: 500,
        }
    }
}
