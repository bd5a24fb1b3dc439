//! `db migrate` / `db vacuum` — administrative subcommands that touch the store directly without
//! bringing up any transport.

use anyhow::Result;

use crate::config::Config;
use crate::store::pool::Pool;

pub async fn run_migrate(config: &Config) -> Result<()> {
    let pool = Pool::open(&config.db_path)?;
    pool.migrate().await?;
    println!("migrations applied");
    Ok(())
}

pub async fn run_vacuum(config: &Config) -> Result<()> {
    let pool = Pool::open(&config.db_path)?;
    pool.vacuum().await?;
    println!("database vacuumed");
    Ok(())
}
