//! Prompt import/export as Markdown files: the first `# Heading` becomes the prompt name, the
//! remaining body becomes its content.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{opt_i64, require_data, require_i64, require_str, unknown_action};
use super::{Tool, ToolContext};
use crate::error::{Code, CoreError, DomainError, Result};

const ACTIONS: &[&str] = &["list", "import_markdown", "export_markdown"];

pub struct MarkdownPromptManagerTool;

fn split_markdown(markdown: &str) -> (String, String) {
    let mut lines = markdown.lines();
    let first = lines.next().unwrap_or("").trim();
    let name = first.strip_prefix("# ").unwrap_or(first).trim().to_string();
    let body = lines.collect::<Vec<_>>().join("\n").trim_start().to_string();
    (if name.is_empty() { "untitled".to_string() } else { name }, body)
}

#[async_trait]
impl Tool for MarkdownPromptManagerTool {
    fn name(&self) -> &'static str {
        "markdown_prompt_manager"
    }

    fn description(&self) -> &'static str {
        "Import and export prompts as Markdown documents."
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
                Ok(json!(
                    prompts.into_iter().map(|p| json!({ "id": p.id, "markdown": format!("# {}\n\n{}", p.name, p.content) })).collect::<Vec<_>>()
                ))
            }
            "import_markdown" => {
                let data = require_data(&args, "{\"markdown\": \"# Title\\n\\nBody text\"}")?;
                let markdown = require_str(data, "markdown", "# Title\n\nBody text")?;
                let (name, content) = split_markdown(markdown);
                let project_id = opt_i64(data, "projectId");
                let prompt = ctx.store.create_prompt(&name, &content, project_id).await?;
                Ok(json!(prompt))
            }
            "export_markdown" => {
                let id = require_i64(&args, "promptId", "123")?;
                let prompt = ctx
                    .store
                    .get_prompt(id)
                    .await?
                    .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::PromptNotFound, "prompt", id)))?;
                Ok(json!({ "markdown": format!("# {}\n\n{}", prompt.name, prompt.content) }))
            }
            other => Err(unknown_action(self.name(), other, ACTIONS)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_heading_from_body() {
        let (name, body) = split_markdown("# My Prompt\n\nLine one\nLine two");
        assert_eq!(name, "My Prompt");
        assert_eq!(body, "Line one\nLine two");
    }
}
