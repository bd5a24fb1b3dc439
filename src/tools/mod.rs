//! The tool dispatch layer: an immutable registry of built-in tools plus the invoker that wraps
//! every call with execution tracking and the two-tier error model.

pub mod invoker;

pub mod agent_manager;
pub mod ai_assistant;
pub mod command_manager;
pub mod documentation_search;
pub mod git_manager;
pub mod markdown_prompt_manager;
pub mod mcp_compatibility_checker;
pub mod mcp_config_generator;
pub mod mcp_setup_validator;
pub mod project_manager;
pub mod prompt_manager;
pub mod queue_manager;
pub mod queue_processor;
pub mod tab_manager;
pub mod task_manager;
pub mod ticket_manager;
pub mod website_demo_runner;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::capabilities::{Clock, IdGenerator, LlmClient};
use crate::error::Result;
use crate::external::ExternalMcpManager;
use crate::queue::QueueEngine;
use crate::resources::ResourceProvider;
use crate::store::Store;
use crate::store::models::Id;

/// Everything a tool handler may need, threaded through on every call. Cheap to clone (all
/// fields are `Arc`s or plain copies).
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn Store>,
    pub queue: Arc<QueueEngine>,
    pub llm: Arc<dyn LlmClient>,
    pub external: Arc<ExternalMcpManager>,
    pub resources: Arc<ResourceProvider>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub session_id: String,
    pub project_id: Option<Id>,
}

/// A single tool's static description plus its handler.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;

    /// Wall-clock budget for one call before the invoker aborts it as `deadline exceeded`.
    /// LLM-bound tools override this; everything else gets the default.
    fn deadline(&self) -> Duration {
        Duration::from_secs(60)
    }

    /// Runs one action. Returns the MCP `content` array payload on success; returns `Err` for a
    /// domain failure, which the invoker converts into `{content, isError: true}`.
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value>;
}

/// Deadline used by tools whose handler may call out to an `LlmClient`.
pub const LLM_TOOL_DEADLINE: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The immutable catalog of built-in tools. Built once at startup.
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
    order: Vec<&'static str>,
}

impl ToolRegistry {
    pub fn builtin() -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(project_manager::ProjectManagerTool),
            Arc::new(prompt_manager::PromptManagerTool),
            Arc::new(markdown_prompt_manager::MarkdownPromptManagerTool),
            Arc::new(ticket_manager::TicketManagerTool),
            Arc::new(task_manager::TaskManagerTool),
            Arc::new(queue_manager::QueueManagerTool),
            Arc::new(queue_processor::QueueProcessorTool),
            Arc::new(agent_manager::AgentManagerTool),
            Arc::new(command_manager::CommandManagerTool),
            Arc::new(ai_assistant::AiAssistantTool),
            Arc::new(git_manager::GitManagerTool),
            Arc::new(documentation_search::DocumentationSearchTool),
            Arc::new(website_demo_runner::WebsiteDemoRunnerTool::new()),
            Arc::new(mcp_config_generator::McpConfigGeneratorTool),
            Arc::new(mcp_compatibility_checker::McpCompatibilityCheckerTool),
            Arc::new(mcp_setup_validator::McpSetupValidatorTool),
            Arc::new(tab_manager::TabManagerTool::new()),
        ];
        let mut registry = Self { tools: HashMap::new(), order: Vec::new() };
        for tool in tools {
            registry.order.push(tool.name());
            registry.tools.insert(tool.name(), tool);
        }
        registry
    }

    #[cfg(test)]
    pub(crate) fn for_tests(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut registry = Self { tools: HashMap::new(), order: Vec::new() };
        for tool in tools {
            registry.order.push(tool.name());
            registry.tools.insert(tool.name(), tool);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> &[&'static str] {
        &self.order
    }

    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .map(|name| {
                let tool = &self.tools[name];
                ToolDescriptor {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    input_schema: tool.input_schema(),
                }
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Wraps a success payload in the MCP `content` shape expected on the wire.
pub fn text_content(value: &Value) -> Value {
    let text = serde_json::to_string(value).unwrap_or_default();
    serde_json::json!({ "content": [{ "type": "text", "text": text }], "isError": false })
}

/// Common batch-operation outcome shape for `batch_create`/`batch_update`/`batch_delete`/`batch_move`.
#[derive(Debug, Default, serde::Serialize)]
pub struct BatchResult {
    #[serde(rename = "successCount")]
    pub success_count: usize,
    #[serde(rename = "failureCount")]
    pub failure_count: usize,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, serde::Serialize)]
pub struct BatchFailure {
    pub item: Value,
    pub error: String,
}

pub const MAX_BATCH_SIZE: usize = 100;

/// Argument extraction helpers shared by every tool handler, so a missing field always produces
/// the same `INVALID_PARAMS` shape: field name, expected type, and a concrete example.
pub mod args {
    use crate::error::{Code, CoreError, DomainError, Result};
    use serde_json::Value;

    fn missing(field: &str, expected_type: &str, example: &str) -> CoreError {
        CoreError::Domain(DomainError::missing_field(field, expected_type, example))
    }

    pub fn require_str<'a>(args: &'a Value, field: &str, example: &str) -> Result<&'a str> {
        args.get(field).and_then(Value::as_str).ok_or_else(|| missing(field, "string", example))
    }

    pub fn require_i64(args: &Value, field: &str, example: &str) -> Result<i64> {
        args.get(field).and_then(Value::as_i64).ok_or_else(|| missing(field, "number", example))
    }

    pub fn opt_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
        args.get(field).and_then(Value::as_str)
    }

    pub fn opt_i64(args: &Value, field: &str) -> Option<i64> {
        args.get(field).and_then(Value::as_i64)
    }

    pub fn opt_f64(args: &Value, field: &str) -> Option<f64> {
        args.get(field).and_then(Value::as_f64)
    }

    pub fn opt_bool(args: &Value, field: &str) -> Option<bool> {
        args.get(field).and_then(Value::as_bool)
    }

    pub fn require_data<'a>(args: &'a Value, example: &str) -> Result<&'a Value> {
        args.get("data").ok_or_else(|| missing("data", "object", example))
    }

    pub fn require_array<'a>(args: &'a Value, field: &str, example: &str) -> Result<&'a Vec<Value>> {
        args.get(field).and_then(Value::as_array).ok_or_else(|| missing(field, "array", example))
    }

    pub fn action_str<'a>(args: &'a Value) -> Result<&'a str> {
        require_str(args, "action", "list")
    }

    pub fn unknown_action(tool: &str, action: &str, valid: &[&str]) -> CoreError {
        CoreError::Domain(DomainError::unknown_action(tool, action, valid))
    }

    pub fn check_batch_size(tool: &str, action: &str, items: &[Value]) -> Result<()> {
        if items.len() > super::MAX_BATCH_SIZE {
            return Err(CoreError::Domain(
                DomainError::new(
                    Code::BatchSizeExceeded,
                    format!("{tool}.{action}: batch size {} exceeds the limit of {}", items.len(), super::MAX_BATCH_SIZE),
                )
                .with_suggestion(format!("split the request into batches of at most {}", super::MAX_BATCH_SIZE)),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_all_builtin_tools() {
        let registry = ToolRegistry::builtin();
        assert_eq!(registry.names().len(), 17);
        assert!(registry.get("project_manager").is_some());
        assert!(registry.get("tab_manager").is_some());
        assert!(registry.get("nonexistent").is_none());
    }
}
