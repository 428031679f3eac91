//! Configuration module for the EcoNexus client core.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::data::FallbackPolicy;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:54321";
const DEFAULT_STORE_PATH: &str = "./data/econexus.sqlite";
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RESET_REDIRECT: &str = "EcoNexus://reset-password";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted backend (REST, auth and realtime live under it)
    pub backend_url: String,
    /// Public (anon) API key sent with every request
    pub anon_key: String,
    /// Path to the SQLite file backing the local key-value store
    pub store_path: PathBuf,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
    /// Whether failed reads are replaced with synthesized data
    pub fallback: FallbackPolicy,
    /// How long the startup reachability probe may take
    pub probe_timeout: Duration,
    /// Deep link the password reset email points back to
    pub reset_redirect: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let backend_url = env::var("ECONEXUS_BACKEND_URL")
            .unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let anon_key = env::var("ECONEXUS_ANON_KEY").unwrap_or_default();

        let store_path = env::var("ECONEXUS_STORE_PATH")
            .unwrap_or_else(|_| DEFAULT_STORE_PATH.to_string())
            .into();

        let log_level = env::var("ECONEXUS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_json = env::var("ECONEXUS_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let fallback = match env::var("ECONEXUS_FALLBACK") {
            Ok(raw) => FallbackPolicy::parse(&raw).unwrap_or_else(|| {
                tracing::warn!("Unknown ECONEXUS_FALLBACK value {:?}, using synthesize", raw);
                FallbackPolicy::Synthesize
            }),
            Err(_) => FallbackPolicy::Synthesize,
        };

        let probe_timeout_ms = match env::var("ECONEXUS_PROBE_TIMEOUT_MS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid ECONEXUS_PROBE_TIMEOUT_MS {:?}, using default", raw);
                DEFAULT_PROBE_TIMEOUT_MS
            }),
            Err(_) => DEFAULT_PROBE_TIMEOUT_MS,
        };

        let reset_redirect = env::var("ECONEXUS_RESET_REDIRECT")
            .unwrap_or_else(|_| DEFAULT_RESET_REDIRECT.to_string());

        Self {
            backend_url,
            anon_key,
            store_path,
            log_level,
            log_json,
            fallback,
            probe_timeout: Duration::from_millis(probe_timeout_ms),
            reset_redirect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("ECONEXUS_BACKEND_URL");
        env::remove_var("ECONEXUS_ANON_KEY");
        env::remove_var("ECONEXUS_STORE_PATH");
        env::remove_var("ECONEXUS_LOG_LEVEL");
        env::remove_var("ECONEXUS_LOG_FORMAT");
        env::remove_var("ECONEXUS_FALLBACK");
        env::remove_var("ECONEXUS_PROBE_TIMEOUT_MS");
        env::remove_var("ECONEXUS_RESET_REDIRECT");

        let config = Config::from_env();

        assert_eq!(config.backend_url, "http://127.0.0.1:54321");
        assert!(config.anon_key.is_empty());
        assert_eq!(config.store_path, PathBuf::from("./data/econexus.sqlite"));
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert_eq!(config.fallback, FallbackPolicy::Synthesize);
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.reset_redirect, "EcoNexus://reset-password");
    }
}
