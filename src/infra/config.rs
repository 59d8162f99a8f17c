//! Centralized configuration (environment variables + defaults).
//!
//! Empty variables count as unset, so `ODOO_URL=` in a `.env` file falls back to the default.

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8070";
pub const DEFAULT_ODOO_URL: &str = "http://localhost:8069";
pub const DEFAULT_ODOO_DB: &str = "aiqso_db";
pub const DEFAULT_ODOO_USERNAME: &str = "admin";
pub const DEFAULT_MERCURY_API_BASE: &str = "https://api.mercury.com/api/v1";
pub const DEFAULT_SYNC_DB: &str = "/tmp/mercury_sync.db";
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 15;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct OdooConfig {
    pub url: String,
    pub db: String,
    pub username: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct MercuryConfig {
    pub api_base: String,
    /// Bearer token. Mercury features are disabled when absent.
    pub api_token: Option<String>,
    /// SQLite path, or `sqlite::memory:`.
    pub sync_db: String,
    pub sync_interval_minutes: u64,
    pub auto_reconcile: bool,
    pub min_confidence: f64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub odoo: OdooConfig,
    pub mercury: MercuryConfig,
    pub slack_webhook_url: Option<String>,
    pub json_logs: bool,
}

impl AppConfig {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let sync_interval_minutes = match get("MERCURY_SYNC_INTERVAL") {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid {
                    var: "MERCURY_SYNC_INTERVAL",
                    expected: "a whole number of minutes",
                    value: v.clone(),
                })?
                .max(1),
            None => DEFAULT_SYNC_INTERVAL_MINUTES,
        };

        let min_confidence = match get("MERCURY_MIN_CONFIDENCE") {
            Some(v) => {
                let parsed = v.trim().parse::<f64>().ok().filter(|c| (0.0..=1.0).contains(c));
                parsed.ok_or(ConfigError::Invalid {
                    var: "MERCURY_MIN_CONFIDENCE",
                    expected: "a number between 0 and 1",
                    value: v.clone(),
                })?
            }
            None => DEFAULT_MIN_CONFIDENCE,
        };

        let auto_reconcile = get("MERCURY_AUTO_RECONCILE")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        Ok(Self {
            bind_addr: get_or("API_BIND_ADDR", DEFAULT_BIND_ADDR),
            odoo: OdooConfig {
                url: get_or("ODOO_URL", DEFAULT_ODOO_URL)
                    .trim_end_matches('/')
                    .to_string(),
                db: get_or("ODOO_DB", DEFAULT_ODOO_DB),
                username: get_or("ODOO_USERNAME", DEFAULT_ODOO_USERNAME),
                api_key: get("ODOO_API_KEY").unwrap_or_default(),
            },
            mercury: MercuryConfig {
                api_base: get_or("MERCURY_API_BASE", DEFAULT_MERCURY_API_BASE)
                    .trim_end_matches('/')
                    .to_string(),
                api_token: get("MERCURY_API_TOKEN"),
                sync_db: get_or("MERCURY_SYNC_DB", DEFAULT_SYNC_DB),
                sync_interval_minutes,
                auto_reconcile,
                min_confidence,
            },
            slack_webhook_url: get("SLACK_WEBHOOK_URL"),
            json_logs: get("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

/// Masks a secret for display, keeping the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}
