//! Projects and their files: CRUD, browsing, content access, search, and AI-assisted suggestions.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{opt_i64, opt_str, require_array, require_data, require_i64, require_str, unknown_action};
use super::{LLM_TOOL_DEADLINE, Tool, ToolContext};
use crate::error::{Code, CoreError, DomainError, Result};

const ACTIONS: &[&str] = &[
    "list", "get", "create", "update", "delete", "delete_file", "get_summary", "get_summary_advanced",
    "get_summary_metrics", "browse_files", "get_file_content", "get_file_content_partial", "update_file_content",
    "suggest_files", "get_selection_context", "search", "create_file", "get_file_tree", "overview",
];

pub struct ProjectManagerTool;

#[async_trait]
impl Tool for ProjectManagerTool {
    fn name(&self) -> &'static str {
        "project_manager"
    }

    fn description(&self) -> &'static str {
        "Manage projects and their files: create/list/update/delete projects, browse and edit files, get AI summaries and suggestions."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "projectId": { "type": "number" },
                "fileId": { "type": "number" },
                "data": { "type": "object" },
            },
            "required": ["action"],
        })
    }

    fn deadline(&self) -> std::time::Duration {
        // `suggest_files`/`get_summary` call out to the LLM; the rest of the action set is plain
        // CRUD, but the deadline is per-tool, not per-action.
        LLM_TOOL_DEADLINE
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        match action {
            "list" => {
                let projects = ctx.store.list_projects().await?;
                Ok(json!(projects))
            }
            "get" => {
                let id = require_i64(&args, "projectId", "123")?;
                let project = ctx.store.get_project(id).await?.ok_or_else(|| not_found(id))?;
                Ok(json!(project))
            }
            "create" => {
                let data = require_data(&args, r#"{"name": "my-app", "path": "/repos/my-app"}"#)?;
                let name = require_str(data, "name", "my-app")?;
                let path = require_str(data, "path", "/repos/my-app")?;
                let description = opt_str(data, "description").unwrap_or("");
                let project = ctx.store.create_project(name, path, description).await?;
                Ok(json!(project))
            }
            "update" => {
                let id = require_i64(&args, "projectId", "123")?;
                let data = require_data(&args, r#"{"name": "renamed"}"#)?;
                let name = opt_str(data, "name").map(String::from);
                let description = opt_str(data, "description").map(String::from);
                let project = ctx.store.update_project(id, name, description).await?;
                Ok(json!(project))
            }
            "delete" => {
                let id = require_i64(&args, "projectId", "123")?;
                ctx.store.delete_project(id).await?;
                Ok(json!({ "deleted": true, "projectId": id }))
            }
            "create_file" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let data = require_data(&args, r#"{"path": "src/index.ts", "content": "export {}"}"#)?;
                let path = require_str(data, "path", "src/index.ts")?;
                let content = opt_str(data, "content").unwrap_or("");
                let file = ctx.store.create_file(project_id, path, content).await?;
                Ok(json!(file))
            }
            "get_file_content" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let file_id = require_i64(&args, "fileId", "456")?;
                let file = ctx.store.get_file(project_id, file_id).await?.ok_or_else(|| not_found_file(file_id))?;
                Ok(json!({ "content": file.content }))
            }
            "get_file_content_partial" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let file_id = require_i64(&args, "fileId", "456")?;
                let file = ctx.store.get_file(project_id, file_id).await?.ok_or_else(|| not_found_file(file_id))?;
                let start = opt_i64(&args, "startLine").unwrap_or(0).max(0) as usize;
                let end = opt_i64(&args, "endLine").map(|v| v as usize);
                let lines: Vec<&str> = file.content.lines().collect();
                let end = end.unwrap_or(lines.len()).min(lines.len());
                let slice = if start < lines.len() && start < end { lines[start..end].join("\n") } else { String::new() };
                Ok(json!({ "content": slice, "startLine": start, "endLine": end }))
            }
            "update_file_content" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let file_id = require_i64(&args, "fileId", "456")?;
                let data = require_data(&args, r#"{"content": "new content"}"#)?;
                let content = require_str(data, "content", "new content")?;
                let file = ctx.store.update_file_content(project_id, file_id, content).await?;
                Ok(json!(file))
            }
            "delete_file" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let file_id = require_i64(&args, "fileId", "456")?;
                ctx.store.delete_file(project_id, file_id).await?;
                Ok(json!({ "deleted": true, "fileId": file_id }))
            }
            "browse_files" | "get_file_tree" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let files = ctx.store.list_files(project_id).await?;
                Ok(json!(files.into_iter().map(|f| json!({ "id": f.id, "path": f.path, "size": f.size })).collect::<Vec<_>>()))
            }
            "search" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let query = require_str(&args, "query", "TODO").map(str::to_lowercase).or_else(|_| {
                    require_data(&args, r#"{"query": "TODO"}"#).and_then(|d| require_str(d, "query", "TODO")).map(str::to_lowercase)
                })?;
                let files = ctx.store.list_files(project_id).await?;
                let matches: Vec<_> = files
                    .into_iter()
                    .filter(|f| f.content.to_lowercase().contains(&query) || f.path.to_lowercase().contains(&query))
                    .map(|f| json!({ "id": f.id, "path": f.path }))
                    .collect();
                if matches.is_empty() {
                    return Err(CoreError::Domain(DomainError::new(Code::NoSearchResults, format!("no files matched `{query}`"))));
                }
                Ok(json!(matches))
            }
            "suggest_files" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let prompt = opt_str(&args, "prompt").unwrap_or("");
                let limit = opt_i64(&args, "limit").unwrap_or(10).max(1) as usize;
                let suggestions = ctx.llm.suggest_files(project_id, prompt, limit).await?;
                Ok(json!(suggestions))
            }
            "get_selection_context" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let file_ids = require_array(&args, "fileIds", "[1, 2, 3]")?;
                let mut files = Vec::new();
                for id in file_ids {
                    let id = id.as_i64().ok_or_else(|| CoreError::Domain(DomainError::new(Code::InvalidParams, "fileIds must be numbers")))?;
                    if let Some(file) = ctx.store.get_file(project_id, id).await? {
                        files.push(file);
                    }
                }
                Ok(json!({ "files": files }))
            }
            "get_summary" | "get_summary_advanced" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let content = ctx.resources.read(&format!("promptliano://projects/{project_id}/summary"), Some(project_id)).await?;
                Ok(json!({ "summary": content.text }))
            }
            "get_summary_metrics" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let files = ctx.store.list_files(project_id).await?;
                let total_size: i64 = files.iter().map(|f| f.size).sum();
                Ok(json!({ "fileCount": files.len(), "totalSizeBytes": total_size }))
            }
            "overview" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let project = ctx.store.get_project(project_id).await?.ok_or_else(|| not_found(project_id))?;
                let files = ctx.store.list_files(project_id).await?;
                let tickets = ctx.store.list_tickets(project_id).await?;
                Ok(json!({ "project": project, "fileCount": files.len(), "ticketCount": tickets.len() }))
            }
            other => Err(unknown_action(self.name(), other, ACTIONS)),
        }
    }
}

fn not_found(id: i64) -> CoreError {
    CoreError::Domain(DomainError::not_found(Code::ProjectNotFound, "project", id))
}

fn not_found_file(id: i64) -> CoreError {
    CoreError::Domain(DomainError::not_found(Code::FileNotFound, "file", id))
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
    async fn create_requires_name_and_path() {
        let ctx = ctx().await;
        let err = ProjectManagerTool.call(&ctx, json!({ "action": "create", "data": { "name": "only-name" } })).await.unwrap_err();
        match err {
            CoreError::Domain(d) => assert_eq!(d.code, Code::InvalidParams),
            other => panic!("{other:?}"),
        }
    }

    #[tokio::test]
    async fn search_with_no_matches_returns_no_search_results() {
        let ctx = ctx().await;
        let project = ctx.store.create_project("p", "/p", "").await.unwrap();
        let err = ProjectManagerTool
            .call(&ctx, json!({ "action": "search", "projectId": project.id, "query": "nope" }))
            .await
            .unwrap_err();
        match err {
            CoreError::Domain(d) => assert_eq!(d.code, Code::NoSearchResults),
            other => panic!("{other:?}"),
        }
    }
}
