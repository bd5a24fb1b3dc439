//! Queue lifecycle and attachment: create/list/update/delete queues, and attach/detach tickets
//! and tasks to them. Selection and claiming live in `queue_processor`.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{opt_bool, opt_i64, opt_str, require_data, require_i64, unknown_action};
use super::{Tool, ToolContext};
use crate::error::Result;
use crate::store::QueuePatch;
use crate::store::models::QueueRunStatus;

const ACTIONS: &[&str] = &[
    "list", "get", "create", "update", "delete", "enqueue_ticket", "enqueue_task", "enqueue_ticket_with_all_tasks",
    "dequeue_ticket", "dequeue_task", "get_stats", "get_queues_with_stats",
];

pub struct QueueManagerTool;

#[async_trait]
impl Tool for QueueManagerTool {
    fn name(&self) -> &'static str {
        "queue_manager"
    }

    fn description(&self) -> &'static str {
        "Create and configure queues, and attach or detach tickets/tasks to them."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "projectId": { "type": "number" },
                "queueId": { "type": "number" },
                "ticketId": { "type": "number" },
                "taskId": { "type": "number" },
                "data": { "type": "object" },
            },
            "required": ["action"],
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        match action {
            "list" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                Ok(json!(ctx.queue.list_queues_by_project(project_id).await?))
            }
            "get" => {
                let queue_id = require_i64(&args, "queueId", "123")?;
                Ok(json!(ctx.queue.get_queue_by_id(queue_id).await?))
            }
            "create" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let data = require_data(&args, r#"{"name": "review queue", "maxParallelItems": 3}"#)?;
                let name = super::args::require_str(data, "name", "review queue")?;
                let description = opt_str(data, "description").unwrap_or("");
                let max_parallel_items = data.get("maxParallelItems").and_then(Value::as_i64).unwrap_or(1);
                Ok(json!(ctx.queue.create_queue(project_id, name, description, max_parallel_items).await?))
            }
            "update" => {
                let queue_id = require_i64(&args, "queueId", "123")?;
                let data = require_data(&args, r#"{"maxParallelItems": 5}"#)?;
                let patch = QueuePatch {
                    name: opt_str(data, "name").map(String::from),
                    description: opt_str(data, "description").map(String::from),
                    status: opt_str(data, "status").and_then(|s| if s == "paused" { Some(QueueRunStatus::Paused) } else { Some(QueueRunStatus::Active) }),
                    max_parallel_items: data.get("maxParallelItems").and_then(Value::as_i64),
                };
                Ok(json!(ctx.queue.update_queue(queue_id, patch).await?))
            }
            "delete" => {
                let queue_id = require_i64(&args, "queueId", "123")?;
                ctx.queue.delete_queue(queue_id).await?;
                Ok(json!({ "deleted": true, "queueId": queue_id }))
            }
            "enqueue_ticket" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let queue_id = require_i64(&args, "queueId", "456")?;
                let priority = opt_i64(&args, "priority").unwrap_or(0);
                let with_tasks = opt_bool(&args, "includeTasks").unwrap_or(false);
                if with_tasks {
                    ctx.queue.enqueue_ticket_with_all_tasks(queue_id, ticket_id, priority).await?;
                } else {
                    ctx.queue.enqueue_ticket(ticket_id, queue_id, priority).await?;
                }
                Ok(json!({ "enqueued": true, "ticketId": ticket_id, "queueId": queue_id }))
            }
            "enqueue_ticket_with_all_tasks" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let queue_id = require_i64(&args, "queueId", "456")?;
                let priority = opt_i64(&args, "priority").unwrap_or(0);
                ctx.queue.enqueue_ticket_with_all_tasks(queue_id, ticket_id, priority).await?;
                Ok(json!({ "enqueued": true, "ticketId": ticket_id, "queueId": queue_id }))
            }
            "enqueue_task" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let task_id = require_i64(&args, "taskId", "789")?;
                let queue_id = require_i64(&args, "queueId", "456")?;
                let priority = opt_i64(&args, "priority").unwrap_or(0);
                ctx.queue.enqueue_task(ticket_id, task_id, queue_id, priority).await?;
                Ok(json!({ "enqueued": true, "taskId": task_id, "queueId": queue_id }))
            }
            "dequeue_ticket" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                ctx.queue.dequeue_ticket(ticket_id).await?;
                Ok(json!({ "dequeued": true, "ticketId": ticket_id }))
            }
            "dequeue_task" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let task_id = require_i64(&args, "taskId", "789")?;
                ctx.queue.dequeue_task(ticket_id, task_id).await?;
                Ok(json!({ "dequeued": true, "taskId": task_id }))
            }
            "get_stats" => {
                let queue_id = require_i64(&args, "queueId", "123")?;
                Ok(json!(ctx.queue.get_queue_stats(queue_id).await?))
            }
            "get_queues_with_stats" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                Ok(json!(ctx.queue.get_queues_with_stats(project_id).await?))
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
    async fn create_rejects_zero_parallelism() {
        let ctx = ctx().await;
        let project = ctx.store.create_project("p", "/p", "").await.unwrap();
        let err = QueueManagerTool
            .call(&ctx, json!({ "action": "create", "projectId": project.id, "data": { "name": "q", "maxParallelItems": 0 } }))
            .await
            .unwrap_err();
        assert!(format!("{err:?}").contains("ValidationFailed"));
    }

    #[tokio::test]
    async fn enqueue_ticket_with_all_tasks_attaches_tasks() {
        let ctx = ctx().await;
        let project = ctx.store.create_project("p", "/p", "").await.unwrap();
        let ticket = ctx.store.create_ticket(project.id, "t", "", Priority::Normal).await.unwrap();
        ctx.store.create_task(ticket.id, "a", 0).await.unwrap();
        let queue = ctx.queue.create_queue(project.id, "q", "", 2).await.unwrap();
        QueueManagerTool
            .call(&ctx, json!({ "action": "enqueue_ticket", "ticketId": ticket.id, "queueId": queue.id, "includeTasks": true }))
            .await
            .unwrap();
        let stats = ctx.queue.get_queue_stats(queue.id).await.unwrap();
        assert_eq!(stats.queued_items, 2);
    }
}
