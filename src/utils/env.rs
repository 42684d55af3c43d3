// src/utils/env.rs

use std::str::FromStr;

use log::{debug, info};

/// Loads environment variables from a .env file if one is present.
/// Missing files are fine; the system environment always wins.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(_) => debug!("No .env file found, using system environment"),
    }
}

/// Reads an environment variable, falling back to a default when unset.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Reads and parses an environment variable, falling back to a default when
/// unset or unparseable.
pub fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
