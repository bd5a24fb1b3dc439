//! Generates a `.mcp.json` stanza that points a client at this server, for the two transports it
//! supports.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{opt_str, require_str, unknown_action};
use super::{Tool, ToolContext};
use crate::error::Result;

const ACTIONS: &[&str] = &["generate_stdio", "generate_http"];

pub struct McpConfigGeneratorTool;

#[async_trait]
impl Tool for McpConfigGeneratorTool {
    fn name(&self) -> &'static str {
        "mcp_config_generator"
    }

    fn description(&self) -> &'static str {
        "Generate a .mcp.json entry for connecting a client to this server over stdio or HTTP."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "serverName": { "type": "string" },
                "binaryPath": { "type": "string" },
                "url": { "type": "string" },
            },
            "required": ["action"],
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        let server_name = opt_str(&args, "serverName").unwrap_or("forgebase-mcp");

        match action {
            "generate_stdio" => {
                let binary_path = opt_str(&args, "binaryPath").unwrap_or("forgebase-mcp");
                Ok(json!({
                    "mcpServers": {
                        server_name: { "command": binary_path, "args": ["--mcp-stdio"] }
                    }
                }))
            }
            "generate_http" => {
                let url = require_str(&args, "url", "http://127.0.0.1:7942/mcp")?;
                Ok(json!({
                    "mcpServers": {
                        server_name: { "url": url }
                    }
                }))
            }
            other => Err(unknown_action(self.name(), other, ACTIONS)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::llm::FakeLlmClient;
    use crate::capabilities::{MonotonicIdGenerator, SystemClock};
    use crate::external::ExternalMcpManager;
    use crate::queue::QueueEngine;
    use crate::resources::ResourceProvider;
    use crate::store::{SqliteStore, Store};
    use std::sync::Arc;

    async fn ctx() -> ToolContext {
        let pool = crate::store::sqlite::test_pool().await;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let clock = Arc::new(SystemClock);
        let llm: Arc<dyn crate::capabilities::LlmClient> = Arc::new(FakeLlmClient);
        let external = Arc::new(ExternalMcpManager::new());
        ToolContext {
            queue: Arc::new(QueueEngine::new(store.clone(), clock.clone())),
            resources: Arc::new(ResourceProvider::new(store.clone(), llm.clone(), external.clone())),
            store,
            llm,
            external,
            clock,
            ids: Arc::new(MonotonicIdGenerator::new()),
            session_id: "s".to_string(),
            project_id: None,
        }
    }

    #[tokio::test]
    async fn generate_stdio_uses_default_binary_name() {
        let ctx = ctx().await;
        let result = McpConfigGeneratorTool.call(&ctx, json!({ "action": "generate_stdio" })).await.unwrap();
        assert_eq!(result["mcpServers"]["forgebase-mcp"]["command"], "forgebase-mcp");
    }
}
