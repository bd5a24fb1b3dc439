//! Async SQLite pool wrapper.
//!
//! Two ways to reach a connection:
//!
//! - [`Pool::run`] — takes a closure returning `crate::error::Result<T>`; use this from tool
//!   handlers so store failures convert cleanly into [`crate::error::CoreError`].
//! - [`Pool::interact`] — takes a closure returning `anyhow::Result<T>`; use this for migrations
//!   and other internal plumbing that isn't on the tool-invocation path.
//!
//! Both run the closure on the pool's blocking thread; `rusqlite::Connection` is not `Send`
//! across `.await` points, so it must never be held across an await.

use crate::error::{CoreError, Result};
use deadpool_sqlite::{Config, Pool as DeadPool, Runtime};
use rusqlite::Connection;
use std::path::Path;

#[derive(Clone)]
pub struct Pool {
    inner: DeadPool,
}

impl Pool {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let cfg = Config::new(path);
        let inner = cfg.create_pool(Runtime::Tokio1)?;
        Ok(Self { inner })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        // deadpool-sqlite pools a path; reuse a shared-cache in-memory URI so every
        // connection in the pool sees the same database, matching test expectations.
        let cfg = Config::new("file:forgebase-mcp-test?mode=memory&cache=shared");
        let inner = cfg.create_pool(Runtime::Tokio1)?;
        Ok(Self { inner })
    }

    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.inner.get().await.map_err(CoreError::Pool)?;
        conn.interact(move |c| f(c)).await.map_err(CoreError::from)?
    }

    pub async fn interact<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let conn = self.inner.get().await?;
        conn.interact(move |c| f(c)).await.map_err(|e| anyhow::anyhow!(e.to_string()))?
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        self.interact(|conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (name TEXT PRIMARY KEY)",
            )?;
            for (name, sql) in crate::store::schema::MIGRATIONS {
                let applied: bool = conn
                    .query_row(
                        "SELECT 1 FROM schema_migrations WHERE name = ?1",
                        [name],
                        |_| Ok(true),
                    )
                    .unwrap_or(false);
                if applied {
                    continue;
                }
                conn.execute_batch(sql)?;
                conn.execute("INSERT INTO schema_migrations(name) VALUES (?1)", [name])?;
                tracing::info!(migration = *name, "applied migration");
            }
            Ok(())
        })
        .await
    }

    pub async fn vacuum(&self) -> anyhow::Result<()> {
        self.interact(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(())
        })
        .await
    }
}
