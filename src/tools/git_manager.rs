//! Read-only git introspection against a project's working tree, via `git2`.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{opt_i64, require_i64, unknown_action};
use super::{Tool, ToolContext};
use crate::error::{Code, CoreError, DomainError, Result};

const ACTIONS: &[&str] = &["status", "log", "current_branch", "diff"];

pub struct GitManagerTool;

fn open_repo(path: &str) -> Result<git2::Repository> {
    git2::Repository::open(path).map_err(|e| CoreError::Domain(DomainError::service(format!("not a git repository: {e}"))))
}

#[async_trait]
impl Tool for GitManagerTool {
    fn name(&self) -> &'static str {
        "git_manager"
    }

    fn description(&self) -> &'static str {
        "Inspect a project's git working tree: status, branch, log, and diffs."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "projectId": { "type": "number" },
                "limit": { "type": "number" },
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
        let path = project.path;

        match action {
            "status" => {
                let repo = open_repo(&path)?;
                let mut statuses = Vec::new();
                for entry in repo.statuses(None).map_err(|e| DomainError::service(e.to_string()))?.iter() {
                    if let Some(file_path) = entry.path() {
                        statuses.push(json!({ "path": file_path, "status": format!("{:?}", entry.status()) }));
                    }
                }
                Ok(json!(statuses))
            }
            "current_branch" => {
                let repo = open_repo(&path)?;
                let head = repo.head().map_err(|e| DomainError::service(e.to_string()))?;
                Ok(json!({ "branch": head.shorthand().unwrap_or("HEAD").to_string() }))
            }
            "log" => {
                let repo = open_repo(&path)?;
                let limit = opt_i64(&args, "limit").unwrap_or(20).max(1) as usize;
                let mut walk = repo.revwalk().map_err(|e| DomainError::service(e.to_string()))?;
                walk.push_head().map_err(|e| DomainError::service(e.to_string()))?;
                let mut entries = Vec::new();
                for oid in walk.take(limit) {
                    let oid = oid.map_err(|e| DomainError::service(e.to_string()))?;
                    let commit = repo.find_commit(oid).map_err(|e| DomainError::service(e.to_string()))?;
                    entries.push(json!({
                        "sha": oid.to_string(),
                        "summary": commit.summary().unwrap_or(""),
                        "author": commit.author().name().unwrap_or("").to_string(),
                        "timestamp": commit.time().seconds(),
                    }));
                }
                Ok(json!(entries))
            }
            "diff" => {
                let repo = open_repo(&path)?;
                let diff = repo.diff_index_to_workdir(None, None).map_err(|e| DomainError::service(e.to_string()))?;
                let mut text = String::new();
                diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
                    text.push_str(&String::from_utf8_lossy(line.content()));
                    true
                })
                .map_err(|e| DomainError::service(e.to_string()))?;
                Ok(json!({ "diff": text }))
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
    async fn non_git_path_reports_service_error() {
        let ctx = ctx().await;
        let dir = tempfile::tempdir().unwrap();
        let project = ctx.store.create_project("p", dir.path().to_str().unwrap(), "").await.unwrap();
        let err = GitManagerTool.call(&ctx, json!({ "action": "status", "projectId": project.id })).await.unwrap_err();
        match err {
            CoreError::Domain(d) => assert_eq!(d.code, Code::ServiceError),
            other => panic!("{other:?}"),
        }
    }
}
