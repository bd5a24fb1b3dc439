//! Reusable prompt snippets, optionally scoped to a project.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{opt_i64, opt_str, require_data, require_i64, require_str, unknown_action};
use super::{Tool, ToolContext};
use crate::error::{Code, CoreError, DomainError, Result};

const ACTIONS: &[&str] = &["list", "get", "create", "update", "delete"];

pub struct PromptManagerTool;

#[async_trait]
impl Tool for PromptManagerTool {
    fn name(&self) -> &'static str {
        "prompt_manager"
    }

    fn description(&self) -> &'static str {
        "Create, list, update, and delete reusable prompt snippets, optionally scoped to a project."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "promptId": { "type": "number" },
                "projectId": { "type": "number" },
                "data": { "type": "object" },
            },
            "required": ["action"],
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        match action {
            "list" => {
                let project_id = opt_i64(&args, "projectId");
                let prompts = ctx.store.list_prompts(project_id).await?;
                Ok(json!(prompts))
            }
            "get" => {
                let id = require_i64(&args, "promptId", "123")?;
                let prompt = ctx.store.get_prompt(id).await?.ok_or_else(|| not_found(id))?;
                Ok(json!(prompt))
            }
            "create" => {
                let data = require_data(&args, r#"{"name": "bugfix", "content": "Fix the bug in ..."}"#)?;
                let name = require_str(data, "name", "bugfix")?;
                let content = require_str(data, "content", "Fix the bug in ...")?;
                let project_id = opt_i64(data, "projectId");
                let prompt = ctx.store.create_prompt(name, content, project_id).await?;
                Ok(json!(prompt))
            }
            "update" => {
                let id = require_i64(&args, "promptId", "123")?;
                let data = require_data(&args, r#"{"content": "updated text"}"#)?;
                let name = opt_str(data, "name").map(String::from);
                let content = opt_str(data, "content").map(String::from);
                let prompt = ctx.store.update_prompt(id, name, content).await?;
                Ok(json!(prompt))
            }
            "delete" => {
                let id = require_i64(&args, "promptId", "123")?;
                ctx.store.delete_prompt(id).await?;
                Ok(json!({ "deleted": true, "promptId": id }))
            }
            other => Err(unknown_action(self.name(), other, ACTIONS)),
        }
    }
}

fn not_found(id: i64) -> CoreError {
    CoreError::Domain(DomainError::not_found(Code::PromptNotFound, "prompt", id))
}
