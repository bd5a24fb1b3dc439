//! Validates a project's `.mcp.json` well-formedness before the External MCP Client Manager
//! tries to connect to anything it declares.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{opt_i64, unknown_action};
use super::{Tool, ToolContext};
use crate::error::{Code, CoreError, DomainError, Result};

const ACTIONS: &[&str] = &["validate_project_config", "validate_global_config"];

pub struct McpSetupValidatorTool;

fn validate_entries(root: &Value) -> Vec<Value> {
    let mut issues = Vec::new();
    let Some(servers) = root.get("mcpServers").and_then(Value::as_object) else {
        issues.push(json!({ "issue": "missing `mcpServers` object at the top level" }));
        return issues;
    };
    for (name, entry) in servers {
        let has_command = entry.get("command").and_then(Value::as_str).is_some();
        let has_url = entry.get("url").and_then(Value::as_str).is_some();
        if !has_command && !has_url {
            issues.push(json!({ "issue": format!("server `{name}` has neither `command` nor `url`") }));
        }
        if has_command && has_url {
            issues.push(json!({ "issue": format!("server `{name}` has both `command` and `url`; only one transport is used") }));
        }
    }
    issues
}

#[async_trait]
impl Tool for McpSetupValidatorTool {
    fn name(&self) -> &'static str {
        "mcp_setup_validator"
    }

    fn description(&self) -> &'static str {
        "Validate the structure of a project's or the global .mcp.json before connecting to it."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "projectId": { "type": "number" },
            },
            "required": ["action"],
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        let path = match action {
            "validate_project_config" => {
                let project_id = opt_i64(&args, "projectId")
                    .ok_or_else(|| CoreError::Domain(DomainError::missing_field("projectId", "number", "123")))?;
                let project = ctx
                    .store
                    .get_project(project_id)
                    .await?
                    .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::ProjectNotFound, "project", project_id)))?;
                std::path::Path::new(&project.path).join(".mcp.json")
            }
            "validate_global_config" => {
                let home = dirs::home_dir().ok_or_else(|| CoreError::Domain(DomainError::service("no home directory available")))?;
                home.join(".claude/mcp.json")
            }
            other => return Err(unknown_action(self.name(), other, ACTIONS)),
        };

        if !path.exists() {
            return Ok(json!({ "exists": false, "path": path.display().to_string(), "valid": true, "issues": [] }));
        }
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| DomainError::service(format!("failed to read {}: {e}", path.display())))?;
        let parsed: Value = serde_json::from_str(&contents).map_err(|e| DomainError::service(format!("invalid JSON in {}: {e}", path.display())))?;
        let issues = validate_entries(&parsed);
        Ok(json!({ "exists": true, "path": path.display().to_string(), "valid": issues.is_empty(), "issues": issues }))
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
    async fn missing_config_is_reported_as_valid_and_absent() {
        let ctx = ctx().await;
        let dir = tempfile::tempdir().unwrap();
        let project = ctx.store.create_project("p", dir.path().to_str().unwrap(), "").await.unwrap();
        let result = McpSetupValidatorTool.call(&ctx, json!({ "action": "validate_project_config", "projectId": project.id })).await.unwrap();
        assert_eq!(result["exists"], false);
        assert_eq!(result["valid"], true);
    }

    #[tokio::test]
    async fn flags_server_with_no_transport() {
        let ctx = ctx().await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".mcp.json"), r#"{"mcpServers": {"broken": {}}}"#).unwrap();
        let project = ctx.store.create_project("p", dir.path().to_str().unwrap(), "").await.unwrap();
        let result = McpSetupValidatorTool.call(&ctx, json!({ "action": "validate_project_config", "projectId": project.id })).await.unwrap();
        assert_eq!(result["valid"], false);
    }
}
