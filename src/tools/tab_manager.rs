//! Tracks which file tabs a project currently has open. This is server-side bookkeeping only;
//! rendering tabs, navbars, and the rest of the client chrome is out of scope here.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex as AsyncMutex;

use super::args::{opt_bool, require_i64, require_str, unknown_action};
use super::{Tool, ToolContext};
use crate::error::{Code, CoreError, DomainError, Result};
use crate::store::models::Id;

const ACTIONS: &[&str] = &["list", "open", "close", "close_all", "set_active"];

#[derive(Clone, serde::Serialize)]
struct OpenTab {
    #[serde(rename = "filePath")]
    file_path: String,
    pinned: bool,
}

#[derive(Default)]
struct ProjectTabs {
    tabs: Vec<OpenTab>,
    active: Option<String>,
}

pub struct TabManagerTool {
    state: AsyncMutex<HashMap<Id, ProjectTabs>>,
}

impl TabManagerTool {
    pub fn new() -> Self {
        Self { state: AsyncMutex::new(HashMap::new()) }
    }
}

impl Default for TabManagerTool {
    fn default() -> Self {
        Self::new()
    }
}

fn project_json(tabs: &ProjectTabs) -> Value {
    json!({ "tabs": tabs.tabs, "active": tabs.active })
}

#[async_trait]
impl Tool for TabManagerTool {
    fn name(&self) -> &'static str {
        "tab_manager"
    }

    fn description(&self) -> &'static str {
        "Track which file tabs are open per project, including which one is active."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "projectId": { "type": "number" },
                "filePath": { "type": "string" },
                "pinned": { "type": "boolean" },
            },
            "required": ["action", "projectId"],
        })
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        let project_id = require_i64(&args, "projectId", "123")?;
        let mut state = self.state.lock().await;
        let entry = state.entry(project_id).or_default();

        match action {
            "list" => Ok(project_json(entry)),
            "open" => {
                let file_path = require_str(&args, "filePath", "src/main.rs")?.to_string();
                let pinned = opt_bool(&args, "pinned").unwrap_or(false);
                if !entry.tabs.iter().any(|t| t.file_path == file_path) {
                    entry.tabs.push(OpenTab { file_path: file_path.clone(), pinned });
                }
                entry.active = Some(file_path);
                Ok(project_json(entry))
            }
            "close" => {
                let file_path = require_str(&args, "filePath", "src/main.rs")?;
                let before = entry.tabs.len();
                entry.tabs.retain(|t| t.file_path != file_path);
                if entry.tabs.len() == before {
                    return Err(CoreError::Domain(DomainError::new(Code::NotFound, format!("tab `{file_path}` is not open"))));
                }
                if entry.active.as_deref() == Some(file_path) {
                    entry.active = entry.tabs.last().map(|t| t.file_path.clone());
                }
                Ok(project_json(entry))
            }
            "close_all" => {
                entry.tabs.clear();
                entry.active = None;
                Ok(project_json(entry))
            }
            "set_active" => {
                let file_path = require_str(&args, "filePath", "src/main.rs")?;
                if !entry.tabs.iter().any(|t| t.file_path == file_path) {
                    return Err(CoreError::Domain(DomainError::new(Code::NotFound, format!("tab `{file_path}` is not open"))));
                }
                entry.active = Some(file_path.to_string());
                Ok(project_json(entry))
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
    async fn opening_twice_does_not_duplicate_the_tab() {
        let ctx = ctx().await;
        let tool = TabManagerTool::new();
        tool.call(&ctx, json!({ "action": "open", "projectId": 1, "filePath": "a.rs" })).await.unwrap();
        let result = tool.call(&ctx, json!({ "action": "open", "projectId": 1, "filePath": "a.rs" })).await.unwrap();
        assert_eq!(result["tabs"].as_array().unwrap().len(), 1);
        assert_eq!(result["active"], "a.rs");
    }

    #[tokio::test]
    async fn closing_the_active_tab_falls_back_to_another_open_tab() {
        let ctx = ctx().await;
        let tool = TabManagerTool::new();
        tool.call(&ctx, json!({ "action": "open", "projectId": 1, "filePath": "a.rs" })).await.unwrap();
        tool.call(&ctx, json!({ "action": "open", "projectId": 1, "filePath": "b.rs" })).await.unwrap();
        let result = tool.call(&ctx, json!({ "action": "close", "projectId": 1, "filePath": "b.rs" })).await.unwrap();
        assert_eq!(result["active"], "a.rs");
        assert_eq!(result["tabs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closing_a_tab_that_is_not_open_is_a_not_found_error() {
        let ctx = ctx().await;
        let tool = TabManagerTool::new();
        let err = tool.call(&ctx, json!({ "action": "close", "projectId": 1, "filePath": "missing.rs" })).await.unwrap_err();
        match err {
            CoreError::Domain(d) => assert_eq!(d.code, Code::NotFound),
            other => panic!("{other:?}"),
        }
    }
}
