//! Starts and stops a project's local dev server as a background process, so an agent can preview
//! a running site without leaving the protocol surface. One running process per project at a time.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;

use super::args::{opt_str, require_i64, unknown_action};
use super::{Tool, ToolContext};
use crate::error::{Code, CoreError, DomainError, Result};
use crate::store::models::Id;

const ACTIONS: &[&str] = &["start", "stop", "status"];
const DEFAULT_COMMAND: &str = "npm run dev";

pub struct WebsiteDemoRunnerTool {
    running: AsyncMutex<HashMap<Id, Child>>,
}

impl WebsiteDemoRunnerTool {
    pub fn new() -> Self {
        Self { running: AsyncMutex::new(HashMap::new()) }
    }
}

impl Default for WebsiteDemoRunnerTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebsiteDemoRunnerTool {
    fn name(&self) -> &'static str {
        "website_demo_runner"
    }

    fn description(&self) -> &'static str {
        "Start, stop, and check the status of a project's local dev server for live preview."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "projectId": { "type": "number" },
                "command": { "type": "string" },
            },
            "required": ["action", "projectId"],
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        let project_id = require_i64(&args, "projectId", "123")?;

        match action {
            "start" => {
                let mut running = self.running.lock().await;
                if running.contains_key(&project_id) {
                    return Err(CoreError::Domain(DomainError::new(
                        Code::ValidationFailed,
                        format!("a demo server is already running for project {project_id}"),
                    )));
                }
                let project = ctx
                    .store
                    .get_project(project_id)
                    .await?
                    .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::ProjectNotFound, "project", project_id)))?;
                let command = opt_str(&args, "command").unwrap_or(DEFAULT_COMMAND);
                let mut parts = command.split_whitespace();
                let program = parts.next().ok_or_else(|| CoreError::Domain(DomainError::new(Code::InvalidParams, "command must not be empty")))?;
                let child = Command::new(program)
                    .args(parts)
                    .current_dir(&project.path)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|e| DomainError::service(format!("failed to spawn `{command}`: {e}")))?;
                let pid = child.id();
                running.insert(project_id, child);
                Ok(json!({ "started": true, "pid": pid }))
            }
            "stop" => {
                let mut running = self.running.lock().await;
                let Some(mut child) = running.remove(&project_id) else {
                    return Err(CoreError::Domain(DomainError::new(Code::NotFound, format!("no demo server running for project {project_id}"))));
                };
                child.kill().await.map_err(|e| DomainError::service(format!("failed to stop demo server: {e}")))?;
                Ok(json!({ "stopped": true }))
            }
            "status" => {
                let mut running = self.running.lock().await;
                let running_state = match running.get_mut(&project_id) {
                    Some(child) => match child.try_wait() {
                        Ok(None) => "running",
                        Ok(Some(_)) => {
                            running.remove(&project_id);
                            "exited"
                        }
                        Err(_) => "unknown",
                    },
                    None => "stopped",
                };
                Ok(json!({ "status": running_state }))
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
    async fn start_then_stop_reflects_in_status() {
        let ctx = ctx().await;
        let dir = tempfile::tempdir().unwrap();
        let project = ctx.store.create_project("p", dir.path().to_str().unwrap(), "").await.unwrap();
        let tool = WebsiteDemoRunnerTool::new();

        tool.call(&ctx, json!({ "action": "start", "projectId": project.id, "command": "sleep 30" })).await.unwrap();
        let status = tool.call(&ctx, json!({ "action": "status", "projectId": project.id })).await.unwrap();
        assert_eq!(status["status"], "running");

        tool.call(&ctx, json!({ "action": "stop", "projectId": project.id })).await.unwrap();
        let status = tool.call(&ctx, json!({ "action": "status", "projectId": project.id })).await.unwrap();
        assert_eq!(status["status"], "stopped");
    }

    #[tokio::test]
    async fn starting_twice_is_a_validation_error() {
        let ctx = ctx().await;
        let dir = tempfile::tempdir().unwrap();
        let project = ctx.store.create_project("p", dir.path().to_str().unwrap(), "").await.unwrap();
        let tool = WebsiteDemoRunnerTool::new();
        tool.call(&ctx, json!({ "action": "start", "projectId": project.id, "command": "sleep 30" })).await.unwrap();
        let err = tool.call(&ctx, json!({ "action": "start", "projectId": project.id, "command": "sleep 30" })).await.unwrap_err();
        match err {
            CoreError::Domain(d) => assert_eq!(d.code, Code::ValidationFailed),
            other => panic!("{other:?}"),
        }
    }
}
