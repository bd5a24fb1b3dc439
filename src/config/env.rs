//! Environment-based configuration overrides — single source of truth for all env vars.

use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub http_addr: Option<String>,
    pub db_path: Option<PathBuf>,
    pub session_ttl_stdio_secs: Option<u64>,
    pub session_ttl_http_secs: Option<u64>,
    pub log_level: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
}

impl EnvConfig {
    pub fn load() -> Self {
        let config = Self {
            http_addr: read_string("MCP_CORE_HTTP_ADDR"),
            db_path: read_string("MCP_CORE_DB_PATH").map(PathBuf::from),
            session_ttl_stdio_secs: read_u64("MCP_CORE_SESSION_TTL_STDIO_SECS"),
            session_ttl_http_secs: read_u64("MCP_CORE_SESSION_TTL_HTTP_SECS"),
            log_level: read_string("MCP_CORE_LOG_LEVEL"),
            llm_base_url: read_string("MCP_CORE_LLM_BASE_URL"),
            llm_api_key: read_string("MCP_CORE_LLM_API_KEY"),
        };
        config.log_status();
        config
    }

    fn log_status(&self) {
        debug!(
            llm_configured = self.llm_api_key.is_some(),
            http_addr_overridden = self.http_addr.is_some(),
            "environment configuration loaded"
        );
    }
}

/// Whether `MCP_DEBUG` is set truthily — logged per request/response by the router.
pub fn mcp_debug_enabled() -> bool {
    parse_bool_env("MCP_DEBUG").unwrap_or(false)
}

fn read_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_u64(name: &str) -> Option<u64> {
    match std::env::var(name) {
        Ok(v) => v.parse().ok().or_else(|| {
            warn!(name, value = %v, "could not parse integer env var, ignoring");
            None
        }),
        Err(_) => None,
    }
}

pub fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?.to_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_bool_env_is_none() {
        assert_eq!(parse_bool_env("FORGEBASE_MCP_TEST_UNSET_VAR"), None);
    }
}
