//! Runs a shell command in a project's working tree and captures its output, bounded by a
//! timeout. No execution history is persisted; each run is a single request/response exchange.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;

use super::args::{opt_i64, require_i64, require_str, unknown_action};
use super::{Tool, ToolContext};
use crate::error::{Code, CoreError, DomainError, Result};

const ACTIONS: &[&str] = &["run", "list_scripts"];
const DEFAULT_TIMEOUT_SECS: i64 = 120;
const MAX_OUTPUT_BYTES: usize = 256 * 1024;

pub struct CommandManagerTool;

fn truncate(mut s: String) -> String {
    if s.len() > MAX_OUTPUT_BYTES {
        s.truncate(MAX_OUTPUT_BYTES);
        s.push_str("\n...(truncated)");
    }
    s
}

#[async_trait]
impl Tool for CommandManagerTool {
    fn name(&self) -> &'static str {
        "command_manager"
    }

    fn description(&self) -> &'static str {
        "Run a shell command in a project's working tree with a bounded timeout, and list package.json scripts."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "projectId": { "type": "number" },
                "command": { "type": "string" },
                "timeoutSecs": { "type": "number" },
            },
            "required": ["action", "projectId"],
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        let project_id = require_i64(&args, "projectId", "123")?;
        let project = ctx
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::ProjectNotFound, "project", project_id)))?;

        match action {
            "run" => {
                let command = require_str(&args, "command", "npm test")?;
                let timeout = Duration::from_secs(opt_i64(&args, "timeoutSecs").unwrap_or(DEFAULT_TIMEOUT_SECS).max(1) as u64);
                let mut parts = command.split_whitespace();
                let program = parts.next().ok_or_else(|| CoreError::Domain(DomainError::new(Code::InvalidParams, "command must not be empty")))?;

                let child = Command::new(program)
                    .args(parts)
                    .current_dir(&project.path)
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(|e| DomainError::service(format!("failed to spawn `{command}`: {e}")))?;

                let output = tokio::time::timeout(timeout, child.wait_with_output())
                    .await
                    .map_err(|_| DomainError::service(format!("`{command}` timed out after {}s", timeout.as_secs())))?
                    .map_err(|e| DomainError::service(format!("failed waiting on `{command}`: {e}")))?;

                Ok(json!({
                    "exitCode": output.status.code(),
                    "stdout": truncate(String::from_utf8_lossy(&output.stdout).into_owned()),
                    "stderr": truncate(String::from_utf8_lossy(&output.stderr).into_owned()),
                }))
            }
            "list_scripts" => {
                let manifest_path = std::path::Path::new(&project.path).join("package.json");
                let scripts = match tokio::fs::read_to_string(&manifest_path).await {
                    Ok(contents) => {
                        let parsed: Value = serde_json::from_str(&contents).unwrap_or_default();
                        parsed.get("scripts").cloned().unwrap_or_else(|| json!({}))
                    }
                    Err(_) => json!({}),
                };
                Ok(json!({ "scripts": scripts }))
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
    async fn run_echoes_stdout() {
        let ctx = ctx().await;
        let dir = tempfile::tempdir().unwrap();
        let project = ctx.store.create_project("p", dir.path().to_str().unwrap(), "").await.unwrap();
        let result = CommandManagerTool.call(&ctx, json!({ "action": "run", "projectId": project.id, "command": "echo hello" })).await.unwrap();
        assert_eq!(result["exitCode"], 0);
        assert!(result["stdout"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn list_scripts_defaults_to_empty_without_manifest() {
        let ctx = ctx().await;
        let dir = tempfile::tempdir().unwrap();
        let project = ctx.store.create_project("p", dir.path().to_str().unwrap(), "").await.unwrap();
        let result = CommandManagerTool.call(&ctx, json!({ "action": "list_scripts", "projectId": project.id })).await.unwrap();
        assert_eq!(result["scripts"], json!({}));
    }
}
