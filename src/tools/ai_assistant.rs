//! Thin wrapper over the injected `LlmClient`: prompt optimization and task suggestion/generation
//! for a ticket. File suggestion lives on `project_manager` since it's keyed by project, not ticket.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{opt_str, require_data, require_i64, require_str, unknown_action};
use super::{LLM_TOOL_DEADLINE, Tool, ToolContext};
use crate::error::Result;

const ACTIONS: &[&str] = &["optimize_prompt", "suggest_tasks", "auto_generate_tasks"];

pub struct AiAssistantTool;

#[async_trait]
impl Tool for AiAssistantTool {
    fn name(&self) -> &'static str {
        "ai_assistant"
    }

    fn description(&self) -> &'static str {
        "AI-assisted helpers: optimize a prompt, and suggest or auto-generate tasks for a ticket."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "projectId": { "type": "number" },
                "ticketId": { "type": "number" },
                "data": { "type": "object" },
            },
            "required": ["action"],
        })
    }

    fn deadline(&self) -> std::time::Duration {
        LLM_TOOL_DEADLINE
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        match action {
            "optimize_prompt" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let data = require_data(&args, r#"{"prompt": "fix the bug"}"#)?;
                let prompt = require_str(data, "prompt", "fix the bug")?;
                let optimized = ctx.llm.optimize_user_input(project_id, prompt).await?;
                Ok(json!({ "optimizedPrompt": optimized }))
            }
            "suggest_tasks" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let context = opt_str(&args, "context");
                let suggestions = ctx.llm.suggest_tasks(ticket_id, context).await?;
                Ok(json!(suggestions))
            }
            "auto_generate_tasks" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let suggestions = ctx.llm.auto_generate_tasks(ticket_id).await?;
                let mut created = Vec::with_capacity(suggestions.len());
                for (index, suggestion) in suggestions.into_iter().enumerate() {
                    created.push(ctx.store.create_task(ticket_id, &suggestion.content, index as i64).await?);
                }
                Ok(json!(created))
            }
            other => Err(unknown_action(self.name(), other, ACTIONS)),
        }
    }
}
