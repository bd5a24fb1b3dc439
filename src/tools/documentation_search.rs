//! Searches a project's Markdown documentation files (`*.md`) by substring, independent of the
//! general-purpose `project_manager.search` action which covers all file types.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{opt_i64, require_i64, require_str, unknown_action};
use super::{Tool, ToolContext};
use crate::error::{Code, CoreError, DomainError, Result};

const ACTIONS: &[&str] = &["search", "list_docs"];

pub struct DocumentationSearchTool;

#[async_trait]
impl Tool for DocumentationSearchTool {
    fn name(&self) -> &'static str {
        "documentation_search"
    }

    fn description(&self) -> &'static str {
        "Search and list a project's Markdown documentation files."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "projectId": { "type": "number" },
                "query": { "type": "string" },
                "limit": { "type": "number" },
            },
            "required": ["action", "projectId"],
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        let project_id = require_i64(&args, "projectId", "123")?;
        let files = ctx.store.list_files(project_id).await?;
        let docs: Vec<_> = files.into_iter().filter(|f| f.path.ends_with(".md") || f.path.ends_with(".mdx")).collect();

        match action {
            "list_docs" => Ok(json!(docs.into_iter().map(|f| json!({ "id": f.id, "path": f.path })).collect::<Vec<_>>())),
            "search" => {
                let query = require_str(&args, "query", "authentication")?.to_lowercase();
                let limit = opt_i64(&args, "limit").unwrap_or(20).max(1) as usize;
                let matches: Vec<_> = docs
                    .into_iter()
                    .filter(|f| f.content.to_lowercase().contains(&query))
                    .take(limit)
                    .map(|f| {
                        let snippet = f
                            .content
                            .lines()
                            .find(|line| line.to_lowercase().contains(&query))
                            .unwrap_or("")
                            .trim()
                            .to_string();
                        json!({ "id": f.id, "path": f.path, "snippet": snippet })
                    })
                    .collect();
                if matches.is_empty() {
                    return Err(CoreError::Domain(DomainError::new(Code::NoSearchResults, format!("no documentation matched `{query}`"))));
                }
                Ok(json!(matches))
            }
            other => Err(unknown_action(self.name(), other, ACTIONS)),
        }
    }
}
