use anyhow::Result;
use clap::Parser;

use forgebase_mcp::cli::{Cli, Commands, ConfigAction, DbAction, default_log_directive, config as cli_config, db as cli_db, serve as cli_serve};
use forgebase_mcp::config::Config;
use forgebase_mcp::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Only ever read from the user's home directory, never the current directory — a checked
    // out project must not be able to smuggle its own API keys into the process environment.
    if let Some(home) = dirs::home_dir()
        && let Err(e) = dotenvy::from_path(home.join(".config/forgebase-mcp/.env"))
    {
        tracing::debug!(error = %e, "no global .env file loaded");
    }

    let cli = Cli::parse();
    logging::init(default_log_directive(&cli));

    if cli.mcp_stdio {
        let config = Config::load();
        return cli_serve::run_stdio(&config).await;
    }

    match cli.command {
        None | Some(Commands::Serve) => {
            let config = Config::load();
            cli_serve::run_http(&config).await
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => cli_config::run_show(),
            ConfigAction::Set { key, value } => cli_config::run_set(&key, &value),
        },
        Some(Commands::Db { action }) => {
            let config = Config::load();
            match action {
                DbAction::Migrate => cli_db::run_migrate(&config).await,
                DbAction::Vacuum => cli_db::run_vacuum(&config).await,
            }
        }
    }
}
