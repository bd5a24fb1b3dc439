//! Layered configuration: compiled-in defaults < TOML file < environment variables.
//!
//! Environment variables are the single source of truth at runtime; the TOML file exists so
//! `config show`/`config set` have somewhere durable to persist overrides between runs.

pub mod env;
pub mod file;

use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

pub use env::EnvConfig;
pub use file::FileConfig;

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub http_addr: String,
    pub db_path: PathBuf,
    pub session_ttl_stdio_secs: u64,
    pub session_ttl_http_secs: u64,
    pub log_level: String,
    pub llm_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_api_key: Option<SecretPresent>,
}

/// Marker type whose `Serialize` impl never leaks the secret itself — `config show` must report
/// whether a key is configured without ever printing it.
#[derive(Debug, Clone)]
pub struct SecretPresent;

impl Serialize for SecretPresent {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str("<configured>")
    }
}

impl Config {
    /// Load all layers and validate. Called once at startup.
    pub fn load() -> Self {
        info!("loading configuration");
        let file = FileConfig::load();
        let env = EnvConfig::load();

        let config = Self {
            http_addr: env
                .http_addr
                .or(file.http_addr)
                .unwrap_or_else(|| "127.0.0.1:7942".to_string()),
            db_path: env.db_path.or(file.db_path).unwrap_or_else(default_db_path),
            session_ttl_stdio_secs: env.session_ttl_stdio_secs.unwrap_or(30 * 60),
            session_ttl_http_secs: env.session_ttl_http_secs.unwrap_or(60 * 60),
            log_level: env.log_level.unwrap_or_else(|| "warn".to_string()),
            llm_base_url: env.llm_base_url.or(file.llm_base_url),
            llm_api_key: env.llm_api_key.map(|_| SecretPresent),
        };

        config.validate();
        config
    }

    fn validate(&self) {
        if self.session_ttl_stdio_secs == 0 || self.session_ttl_http_secs == 0 {
            warn!("session TTL configured to zero; sessions will be evicted immediately");
        }
        if let Some(parent) = self.db_path.parent()
            && !parent.exists()
            && std::fs::create_dir_all(parent).is_err()
        {
            warn!(path = %parent.display(), "could not create database directory, falling back to default");
        }
    }

    /// Render with secrets elided, for the `config show` CLI command.
    pub fn redacted_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("forgebase-mcp")
        .join("store.sqlite3")
}
