//! File-based configuration from `~/.config/forgebase-mcp/config.toml` (or `$MCP_CORE_CONFIG_PATH`).

use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Default)]
struct RawFileConfig {
    #[serde(default)]
    http_addr: Option<String>,
    #[serde(default)]
    db_path: Option<PathBuf>,
    #[serde(default)]
    llm_base_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    pub http_addr: Option<String>,
    pub db_path: Option<PathBuf>,
    pub llm_base_url: Option<String>,
}

impl FileConfig {
    pub fn load() -> Self {
        let path = Self::path();
        let Ok(content) = std::fs::read_to_string(&path) else {
            debug!(path = %path.display(), "no config file found, using defaults");
            return Self::default();
        };

        match toml::from_str::<RawFileConfig>(&content) {
            Ok(raw) => Self {
                http_addr: raw.http_addr,
                db_path: raw.db_path,
                llm_base_url: raw.llm_base_url,
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse config file, ignoring");
                Self::default()
            }
        }
    }

    pub fn path() -> PathBuf {
        if let Ok(p) = std::env::var("MCP_CORE_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("forgebase-mcp")
            .join("config.toml")
    }

    /// Persist a single key=value pair, used by `config set`. Unknown keys are an error.
    pub fn set(key: &str, value: &str) -> anyhow::Result<()> {
        let path = Self::path();
        let mut raw: toml::Value = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or(toml::Value::Table(Default::default()));

        let table = raw
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("config file is not a table"))?;

        match key {
            "http_addr" | "db_path" | "llm_base_url" => {
                table.insert(key.to_string(), toml::Value::String(value.to_string()));
            }
            other => anyhow::bail!("unknown config key `{other}`"),
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(&raw)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_config() {
        let raw: RawFileConfig = toml::from_str("http_addr = \"0.0.0.0:9000\"").unwrap();
        assert_eq!(raw.http_addr.as_deref(), Some("0.0.0.0:9000"));
        assert!(raw.db_path.is_none());
    }
}
