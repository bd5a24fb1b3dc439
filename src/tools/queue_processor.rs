//! The agent-facing surface for working a queue: claim the next item, then report completion
//! or failure. Selection policy and the `maxParallelItems` invariant live in the Queue Engine.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{opt_str, require_i64, unknown_action};
use super::{Tool, ToolContext};
use crate::error::Result;
use crate::store::models::ItemType;

const ACTIONS: &[&str] = &["get_next_task", "complete_task", "fail_task", "complete_ticket", "fail_ticket"];

pub struct QueueProcessorTool;

#[async_trait]
impl Tool for QueueProcessorTool {
    fn name(&self) -> &'static str {
        "queue_processor"
    }

    fn description(&self) -> &'static str {
        "Claim the next queued item for an agent, and report completion or failure."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "queueId": { "type": "number" },
                "taskId": { "type": "number" },
                "ticketId": { "type": "number" },
                "agentId": { "type": "string" },
                "data": { "type": "object" },
            },
            "required": ["action"],
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        match action {
            "get_next_task" => {
                let queue_id = require_i64(&args, "queueId", "123")?;
                let agent_id = opt_str(&args, "agentId");
                let next = ctx.queue.get_next_task_from_queue(queue_id, agent_id).await?;
                Ok(json!(next))
            }
            "complete_task" => {
                let task_id = require_i64(&args, "taskId", "123")?;
                ctx.queue.complete_queue_item(ItemType::Task, task_id).await?;
                Ok(json!({ "completed": true, "taskId": task_id }))
            }
            "fail_task" => {
                let task_id = require_i64(&args, "taskId", "123")?;
                let data = args.get("data").cloned().unwrap_or_default();
                let error_message = opt_str(&data, "errorMessage").unwrap_or("unspecified failure");
                ctx.queue.fail_queue_item(ItemType::Task, task_id, error_message).await?;
                Ok(json!({ "failed": true, "taskId": task_id }))
            }
            "complete_ticket" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                ctx.queue.complete_queue_item(ItemType::Ticket, ticket_id).await?;
                Ok(json!({ "completed": true, "ticketId": ticket_id }))
            }
            "fail_ticket" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let data = args.get("data").cloned().unwrap_or_default();
                let error_message = opt_str(&data, "errorMessage").unwrap_or("unspecified failure");
                ctx.queue.fail_queue_item(ItemType::Ticket, ticket_id, error_message).await?;
                Ok(json!({ "failed": true, "ticketId": ticket_id }))
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
    use crate::store::models::Priority;
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
    async fn full_cycle_claim_then_complete() {
        let ctx = ctx().await;
        let project = ctx.store.create_project("p", "/p", "").await.unwrap();
        let ticket = ctx.store.create_ticket(project.id, "t", "", Priority::Normal).await.unwrap();
        let task = ctx.store.create_task(ticket.id, "a", 0).await.unwrap();
        let queue = ctx.queue.create_queue(project.id, "q", "", 1).await.unwrap();
        ctx.queue.enqueue_task(ticket.id, task.id, queue.id, 0).await.unwrap();

        let next = QueueProcessorTool.call(&ctx, json!({ "action": "get_next_task", "queueId": queue.id, "agentId": "agent-1" })).await.unwrap();
        assert_eq!(next["type"], "task");

        let result = QueueProcessorTool.call(&ctx, json!({ "action": "complete_task", "taskId": task.id })).await.unwrap();
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn failing_an_item_not_in_progress_is_a_domain_error() {
        let ctx = ctx().await;
        let project = ctx.store.create_project("p", "/p", "").await.unwrap();
        let ticket = ctx.store.create_ticket(project.id, "t", "", Priority::Normal).await.unwrap();
        let task = ctx.store.create_task(ticket.id, "a", 0).await.unwrap();
        let err = QueueProcessorTool.call(&ctx, json!({ "action": "fail_task", "taskId": task.id })).await.unwrap_err();
        assert!(format!("{err:?}").contains("ValidationFailed"));
    }
}
