//! Command-line surface: stdio transport mode, the default HTTP server, and small maintenance
//! subcommands for configuration and the database.

pub mod config;
pub mod db;
pub mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "forgebase-mcp")]
#[command(about = "MCP server core for a developer-tooling platform")]
#[command(version)]
pub struct Cli {
    /// Enter stdio transport mode and block on stdin. Overrides any subcommand.
    #[arg(long)]
    pub mcp_stdio: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP/SSE transport (default).
    Serve,

    /// Inspect or override the layered configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Database maintenance.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the fully-resolved configuration, secrets elided.
    Show,
    /// Persist a single key to the TOML config file.
    Set { key: String, value: String },
}

#[derive(Subcommand)]
pub enum DbAction {
    /// Apply pending schema migrations and exit.
    Migrate,
    /// Reclaim space in the SQLite file and exit.
    Vacuum,
}

/// Picks the default log filter for a command, mirroring how the stdio transport must stay
/// quiet on stderr-adjacent terminals while maintenance commands can be chatty.
pub fn default_log_directive(cli: &Cli) -> &'static str {
    if cli.mcp_stdio {
        return "warn";
    }
    match &cli.command {
        None | Some(Commands::Serve) => "warn",
        Some(Commands::Config { .. }) => "warn",
        Some(Commands::Db { .. }) => "info",
    }
}
