//! Checks whether external MCP servers declared for a project are actually reachable, and whether
//! a client-reported protocol version is one this server understands.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{require_i64, require_str, unknown_action};
use super::{Tool, ToolContext};
use crate::error::Result;

const ACTIONS: &[&str] = &["check_external_servers", "check_protocol_version"];
const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

pub struct McpCompatibilityCheckerTool;

#[async_trait]
impl Tool for McpCompatibilityCheckerTool {
    fn name(&self) -> &'static str {
        "mcp_compatibility_checker"
    }

    fn description(&self) -> &'static str {
        "Check reachability of a project's configured external MCP servers, and validate a reported protocol version."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "projectId": { "type": "number" },
                "protocolVersion": { "type": "string" },
            },
            "required": ["action"],
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        match action {
            "check_external_servers" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let project_path = ctx.store.get_project(project_id).await?.map(|p| p.path);
                let tools = ctx.external.list_all_tools(project_id, project_path.as_deref()).await;
                let resources = ctx.external.list_all_resources(project_id, project_path.as_deref()).await;

                let mut per_server: BTreeMap<String, (usize, usize)> = BTreeMap::new();
                for tool in &tools {
                    per_server.entry(tool.server.clone()).or_default().0 += 1;
                }
                for resource in &resources {
                    per_server.entry(resource.server.clone()).or_default().1 += 1;
                }
                let servers: Vec<Value> = per_server
                    .into_iter()
                    .map(|(name, (tool_count, resource_count))| {
                        json!({ "server": name, "toolCount": tool_count, "resourceCount": resource_count, "reachable": true })
                    })
                    .collect();
                Ok(json!({ "servers": servers }))
            }
            "check_protocol_version" => {
                let reported = require_str(&args, "protocolVersion", SUPPORTED_PROTOCOL_VERSION)?;
                Ok(json!({
                    "supported": reported == SUPPORTED_PROTOCOL_VERSION,
                    "serverVersion": SUPPORTED_PROTOCOL_VERSION,
                    "reportedVersion": reported,
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
    async fn matching_protocol_version_is_supported() {
        let ctx = ctx().await;
        let result = McpCompatibilityCheckerTool.call(&ctx, json!({ "action": "check_protocol_version", "protocolVersion": "2024-11-05" })).await.unwrap();
        assert_eq!(result["supported"], true);
    }

    #[tokio::test]
    async fn mismatched_protocol_version_is_unsupported() {
        let ctx = ctx().await;
        let result = McpCompatibilityCheckerTool.call(&ctx, json!({ "action": "check_protocol_version", "protocolVersion": "2023-01-01" })).await.unwrap();
        assert_eq!(result["supported"], false);
    }

    #[tokio::test]
    async fn project_with_no_external_servers_reports_empty_list() {
        let ctx = ctx().await;
        let dir = tempfile::tempdir().unwrap();
        let project = ctx.store.create_project("p", dir.path().to_str().unwrap(), "").await.unwrap();
        let result = McpCompatibilityCheckerTool.call(&ctx, json!({ "action": "check_external_servers", "projectId": project.id })).await.unwrap();
        assert!(result["servers"].as_array().unwrap().is_empty());
    }
}
