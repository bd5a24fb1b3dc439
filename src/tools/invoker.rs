//! Runs a single tool call end to end: lookup, execution tracking, handler dispatch, and error
//! normalization. Every exit path — success, domain error, or panic — closes the `ToolExecution`
//! record it opened.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::info;

use super::{Tool, ToolContext, ToolRegistry, text_content};
use crate::error::{Code, CoreError, DomainError};
use crate::external::ExternalMcpManager;
use crate::store::Store;
use crate::store::models::ExecutionStatus;

pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    store: Arc<dyn Store>,
    external: Arc<ExternalMcpManager>,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>, store: Arc<dyn Store>, external: Arc<ExternalMcpManager>) -> Self {
        Self { registry, store, external }
    }

    /// Invokes `name` with `args`. Always returns `Ok` at the JSON-RPC level — domain failures
    /// are carried inside the returned value as `{content, isError: true}` — except when the
    /// tool name itself is unrecognized, which is a wire-level `INVALID_PARAMS`.
    pub async fn invoke(&self, ctx: &ToolContext, name: &str, args: Value) -> Result<Value, CoreError> {
        if let Some(external_name) = name.strip_prefix("external_") {
            return Ok(self.invoke_external(ctx, external_name, args).await);
        }

        let Some(tool) = self.registry.get(name) else {
            return Err(CoreError::Domain(DomainError::new(Code::InvalidParams, format!("unknown tool `{name}`"))));
        };

        let input_size = serde_json::to_string(&args).map(|s| s.len()).unwrap_or(0) as i64;
        let started_at = ctx.clock.now_ms();
        let execution_id = self
            .store
            .open_execution(tool.name(), ctx.project_id, &ctx.session_id, input_size, started_at)
            .await?;

        let deadline = tool.deadline();
        let outcome = tokio::time::timeout(deadline, AssertUnwindSafe(tool.call(ctx, args)).catch_unwind()).await;

        let (result, status, error_message, output_size) = match outcome {
            Err(_elapsed) => {
                let domain = DomainError::service("deadline exceeded");
                (domain.to_tool_result(), ExecutionStatus::Error, Some(domain.message.clone()), None)
            }
            Ok(Ok(Ok(payload))) => {
                let content = text_content(&payload);
                let size = serde_json::to_string(&content).map(|s| s.len()).unwrap_or(0) as i64;
                (content, ExecutionStatus::Success, None, Some(size))
            }
            Ok(Ok(Err(err))) => {
                let domain = err.into_domain();
                let content = domain.to_tool_result();
                (content, ExecutionStatus::Error, Some(domain.message.clone()), None)
            }
            Ok(Err(panic)) => {
                let message = panic_message(&panic);
                let domain = DomainError::service(format!("tool handler panicked: {message}"));
                (domain.to_tool_result(), ExecutionStatus::Error, Some(message), None)
            }
        };

        let ended_at = ctx.clock.now_ms();
        self.store
            .close_execution(execution_id, status, output_size, error_message.as_deref(), ended_at)
            .await?;

        info!(
            tool_name = tool.name(),
            session_id = %ctx.session_id,
            project_id = ?ctx.project_id,
            duration_ms = ended_at - started_at,
            status = ?status,
            "tool call completed"
        );

        Ok(result)
    }

    async fn invoke_external(&self, ctx: &ToolContext, tool_name: &str, args: Value) -> Value {
        let Some(project_id) = ctx.project_id else {
            return DomainError::new(Code::InvalidParams, "external tool calls require an active project").to_tool_result();
        };
        let project = match self.store.get_project(project_id).await {
            Ok(Some(p)) => p,
            Ok(None) => return DomainError::not_found(Code::ProjectNotFound, "project", project_id).to_tool_result(),
            Err(e) => return e.into_domain().to_tool_result(),
        };
        let tools = self.external.list_all_tools(project_id, Some(&project.path)).await;
        let Some(matched) = tools.iter().find(|t| t.prefixed_name == format!("external_{tool_name}")) else {
            return DomainError::new(Code::InvalidParams, format!("unknown external tool `external_{tool_name}`")).to_tool_result();
        };
        match self.external.execute_tool(project_id, Some(&project.path), &matched.server, tool_name, args).await {
            Ok(text) => text_content(&Value::String(text)),
            Err(e) => e.into_domain().to_tool_result(),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::llm::FakeLlmClient;
    use crate::capabilities::{MonotonicIdGenerator, SystemClock};
    use crate::queue::QueueEngine;
    use crate::resources::ResourceProvider;
    use crate::store::SqliteStore;
    use serde_json::json;

    async fn context() -> (ToolInvoker, ToolContext) {
        let pool = crate::store::sqlite::test_pool().await;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let clock = Arc::new(SystemClock);
        let queue = Arc::new(QueueEngine::new(store.clone(), clock.clone()));
        let llm: Arc<dyn crate::capabilities::LlmClient> = Arc::new(FakeLlmClient);
        let external = Arc::new(ExternalMcpManager::new());
        let resources = Arc::new(ResourceProvider::new(store.clone(), llm.clone(), external.clone()));
        let registry = Arc::new(ToolRegistry::builtin());
        let invoker = ToolInvoker::new(registry, store.clone(), external.clone());
        let ctx = ToolContext {
            store,
            queue,
            llm,
            external,
            resources,
            clock,
            ids: Arc::new(MonotonicIdGenerator::new()),
            session_id: "test-session".to_string(),
            project_id: None,
        };
        (invoker, ctx)
    }

    #[tokio::test]
    async fn unknown_tool_is_wire_level_error() {
        let (invoker, ctx) = context().await;
        let err = invoker.invoke(&ctx, "nonexistent_tool", json!({})).await.unwrap_err();
        match err {
            CoreError::Domain(d) => assert_eq!(d.code, Code::InvalidParams),
            other => panic!("expected domain error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_required_field_is_tool_level_error_not_wire_level() {
        let (invoker, ctx) = context().await;
        let result = invoker.invoke(&ctx, "project_manager", json!({ "action": "create", "data": {} })).await.unwrap();
        assert_eq!(result["isError"], true);
    }

    #[tokio::test]
    async fn successful_call_records_and_returns_content() {
        let (invoker, ctx) = context().await;
        let result = invoker
            .invoke(&ctx, "project_manager", json!({ "action": "create", "data": { "name": "demo", "path": "/demo" } }))
            .await
            .unwrap();
        assert_eq!(result["isError"], false);
    }

    struct SlowTool;

    #[async_trait::async_trait]
    impl crate::tools::Tool for SlowTool {
        fn name(&self) -> &'static str {
            "slow_tool"
        }
        fn description(&self) -> &'static str {
            "test-only tool that never finishes within its deadline"
        }
        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn deadline(&self) -> std::time::Duration {
            std::time::Duration::from_millis(10)
        }
        async fn call(&self, _ctx: &ToolContext, _args: Value) -> crate::error::Result<Value> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            unreachable!("deadline should have aborted this call first")
        }
    }

    #[tokio::test]
    async fn exceeding_the_deadline_yields_a_service_error_result() {
        let (_, ctx) = context().await;
        let registry = Arc::new(ToolRegistry::for_tests(vec![Arc::new(SlowTool)]));
        let invoker = ToolInvoker::new(registry, ctx.store.clone(), ctx.external.clone());
        let result = invoker.invoke(&ctx, "slow_tool", json!({})).await.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("deadline exceeded"));
    }
}
