//! Builds the full dependency graph once and hands it to whichever transport the caller picked.

use std::sync::Arc;

use anyhow::Result;

use crate::capabilities::{Clock, HttpLlmClient, IdGenerator, LlmClient, MonotonicIdGenerator, SystemClock};
use crate::config::Config;
use crate::config::env::EnvConfig;
use crate::external::ExternalMcpManager;
use crate::queue::QueueEngine;
use crate::resources::ResourceProvider;
use crate::rpc::Router;
use crate::session::{self, SessionManager};
use crate::store::pool::Pool;
use crate::store::{SqliteStore, Store};
use crate::tools::ToolRegistry;
use crate::tools::invoker::ToolInvoker;

/// Opens the store, applies pending migrations, and assembles a [`Router`] plus the session
/// sweeper task. Shared by both transports so `serve` and `--mcp-stdio` see identical wiring.
pub async fn build_router(config: &Config) -> Result<Arc<Router>> {
    let pool = Pool::open(&config.db_path)?;
    pool.migrate().await?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(MonotonicIdGenerator::new());
    let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(
        config.llm_base_url.clone().unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        EnvConfig::load().llm_api_key,
    ));
    let external = Arc::new(ExternalMcpManager::new());
    let queue = Arc::new(QueueEngine::new(store.clone(), clock.clone()));
    let resources = Arc::new(ResourceProvider::new(store.clone(), llm.clone(), external.clone()));
    let registry = Arc::new(ToolRegistry::builtin());
    let invoker = Arc::new(ToolInvoker::new(registry.clone(), store.clone(), external.clone()));
    let sessions = Arc::new(SessionManager::new(
        clock.clone(),
        config.session_ttl_stdio_secs as i64,
        config.session_ttl_http_secs as i64,
    ));
    session::spawn_sweeper(sessions.clone());

    Ok(Arc::new(Router::new(registry, invoker, sessions, resources, store, external, queue, llm, clock, ids)))
}

pub async fn run_stdio(config: &Config) -> Result<()> {
    let router = build_router(config).await?;
    crate::rpc::transport_stdio::run(router).await
}

pub async fn run_http(config: &Config) -> Result<()> {
    let router = build_router(config).await?;
    let app = crate::rpc::transport_http::build(router);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!(addr = %config.http_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
