//! `config show` / `config set` — inspect or persist the TOML overrides layer.

use anyhow::Result;

use crate::config::{Config, FileConfig};

pub fn run_show() -> Result<()> {
    let config = Config::load();
    println!("{}", serde_json::to_string_pretty(&config.redacted_json())?);
    Ok(())
}

pub fn run_set(key: &str, value: &str) -> Result<()> {
    FileConfig::set(key, value)?;
    println!("set {key} = {value}");
    Ok(())
}
