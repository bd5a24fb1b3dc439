//! Tasks: the checklist items inside a ticket.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{check_batch_size, opt_bool, opt_f64, opt_str, require_array, require_data, require_i64, require_str, unknown_action};
use super::{BatchFailure, BatchResult, Tool, ToolContext};
use crate::error::{Code, CoreError, DomainError, Result};
use crate::store::TaskPatch;

const ACTIONS: &[&str] = &["list", "get", "create", "update", "delete", "reorder", "batch_create", "batch_update", "batch_delete", "batch_move"];

pub struct TaskManagerTool;

#[async_trait]
impl Tool for TaskManagerTool {
    fn name(&self) -> &'static str {
        "task_manager"
    }

    fn description(&self) -> &'static str {
        "Create, list, update, delete, and reorder tasks within a ticket, with batch variants for bulk operations."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "ticketId": { "type": "number" },
                "taskId": { "type": "number" },
                "data": { "type": "object" },
                "items": { "type": "array" },
            },
            "required": ["action"],
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        match action {
            "list" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                Ok(json!(ctx.store.list_tasks(ticket_id).await?))
            }
            "get" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let task_id = require_i64(&args, "taskId", "456")?;
                let task = ctx.store.get_task(ticket_id, task_id).await?.ok_or_else(|| not_found(task_id))?;
                Ok(json!(task))
            }
            "create" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let data = require_data(&args, r#"{"content": "Write the migration"}"#)?;
                let task = create_one(ctx, ticket_id, data).await?;
                Ok(json!(task))
            }
            "update" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let task_id = require_i64(&args, "taskId", "456")?;
                let data = require_data(&args, r#"{"done": true}"#)?;
                let patch = patch_from(data);
                Ok(json!(ctx.store.update_task(ticket_id, task_id, patch).await?))
            }
            "delete" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let task_id = require_i64(&args, "taskId", "456")?;
                ctx.store.delete_task(ticket_id, task_id).await?;
                Ok(json!({ "deleted": true, "taskId": task_id }))
            }
            "reorder" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let items = require_array(&args, "items", r#"[{"taskId": 1, "orderIndex": 0}]"#)?;
                let mut updated = Vec::with_capacity(items.len());
                for item in items {
                    let task_id = item
                        .get("taskId")
                        .and_then(Value::as_i64)
                        .ok_or_else(|| CoreError::Domain(DomainError::new(Code::InvalidParams, "each item needs taskId")))?;
                    let order_index = item
                        .get("orderIndex")
                        .and_then(Value::as_i64)
                        .ok_or_else(|| CoreError::Domain(DomainError::new(Code::InvalidParams, "each item needs orderIndex")))?;
                    let patch = TaskPatch { order_index: Some(order_index), ..Default::default() };
                    updated.push(ctx.store.update_task(ticket_id, task_id, patch).await?);
                }
                Ok(json!(updated))
            }
            "batch_create" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let items = require_array(&args, "items", r#"[{"content": "a"}]"#)?.clone();
                check_batch_size(self.name(), action, &items)?;
                let mut result = BatchResult::default();
                for item in items {
                    match create_one(ctx, ticket_id, &item).await {
                        Ok(_) => result.success_count += 1,
                        Err(e) => {
                            result.failure_count += 1;
                            result.failed.push(BatchFailure { item, error: e.into_domain().message });
                        }
                    }
                }
                finish_batch(self.name(), action, result)
            }
            "batch_update" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let items = require_array(&args, "items", r#"[{"taskId": 1, "done": true}]"#)?.clone();
                check_batch_size(self.name(), action, &items)?;
                let mut result = BatchResult::default();
                for item in items {
                    let outcome = async {
                        let task_id = item
                            .get("taskId")
                            .and_then(Value::as_i64)
                            .ok_or_else(|| CoreError::Domain(DomainError::new(Code::InvalidParams, "each item needs taskId")))?;
                        ctx.store.update_task(ticket_id, task_id, patch_from(&item)).await
                    }
                    .await;
                    match outcome {
                        Ok(_) => result.success_count += 1,
                        Err(e) => {
                            result.failure_count += 1;
                            result.failed.push(BatchFailure { item, error: e.into_domain().message });
                        }
                    }
                }
                finish_batch(self.name(), action, result)
            }
            "batch_delete" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let items = require_array(&args, "items", "[1, 2, 3]")?.clone();
                check_batch_size(self.name(), action, &items)?;
                let mut result = BatchResult::default();
                for item in items {
                    match item.as_i64() {
                        Some(task_id) => match ctx.store.delete_task(ticket_id, task_id).await {
                            Ok(_) => result.success_count += 1,
                            Err(e) => {
                                result.failure_count += 1;
                                result.failed.push(BatchFailure { item, error: e.into_domain().message });
                            }
                        },
                        None => {
                            result.failure_count += 1;
                            result.failed.push(BatchFailure { item, error: "expected a task id".to_string() });
                        }
                    }
                }
                finish_batch(self.name(), action, result)
            }
            "batch_move" => {
                let items = require_array(&args, "items", r#"[{"taskId": 1, "ticketId": 2}]"#)?.clone();
                check_batch_size(self.name(), action, &items)?;
                let mut result = BatchResult::default();
                for item in items {
                    result.failure_count += 1;
                    result.failed.push(BatchFailure { item, error: "moving tasks across tickets is not supported".to_string() });
                }
                finish_batch(self.name(), action, result)
            }
            other => Err(unknown_action(self.name(), other, ACTIONS)),
        }
    }
}

async fn create_one(ctx: &ToolContext, ticket_id: i64, data: &Value) -> Result<crate::store::models::Task> {
    let content = require_str(data, "content", "Write the migration")?;
    let order_index = data.get("orderIndex").and_then(Value::as_i64).unwrap_or_else(|| ctx.clock.now_ms());
    Ok(ctx.store.create_task(ticket_id, content, order_index).await?)
}

fn patch_from(data: &Value) -> TaskPatch {
    TaskPatch {
        content: opt_str(data, "content").map(String::from),
        description: opt_str(data, "description").map(String::from),
        done: opt_bool(data, "done"),
        order_index: data.get("orderIndex").and_then(Value::as_i64),
        suggested_file_ids: data.get("suggestedFileIds").and_then(Value::as_array).map(|a| a.iter().filter_map(Value::as_i64).collect()),
        estimated_hours: opt_f64(data, "estimatedHours"),
        dependencies: data.get("dependencies").and_then(Value::as_array).map(|a| a.iter().filter_map(Value::as_i64).collect()),
        tags: data.get("tags").and_then(Value::as_array).map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect()),
        agent_id: opt_str(data, "agentId").map(String::from),
    }
}

fn finish_batch(tool: &str, action: &str, result: BatchResult) -> Result<Value> {
    if result.success_count == 0 && result.failure_count > 0 {
        return Err(CoreError::Domain(DomainError::new(Code::BatchOperationFailed, format!("all items in {tool}.{action} failed"))));
    }
    Ok(json!(result))
}

fn not_found(id: i64) -> CoreError {
    CoreError::Domain(DomainError::not_found(Code::TaskNotFound, "task", id))
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

    async fn ctx() -> (ToolContext, i64) {
        let pool = crate::store::sqlite::test_pool().await;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let project = store.create_project("p", "/p", "").await.unwrap();
        let ticket = store.create_ticket(project.id, "t", "", crate::store::models::Priority::Normal).await.unwrap();
        let clock = Arc::new(SystemClock);
        let llm: Arc<dyn crate::capabilities::LlmClient> = Arc::new(FakeLlmClient);
        let external = Arc::new(ExternalMcpManager::new());
        let ctx = ToolContext {
            queue: Arc::new(QueueEngine::new(store.clone(), clock.clone())),
            resources: Arc::new(ResourceProvider::new(store.clone(), llm.clone(), external.clone())),
            store,
            llm,
            external,
            clock,
            ids: Arc::new(MonotonicIdGenerator::new()),
            session_id: "s".to_string(),
            project_id: None,
        };
        (ctx, ticket.id)
    }

    #[tokio::test]
    async fn reorder_applies_new_indices() {
        let (ctx, ticket_id) = ctx().await;
        let a = TaskManagerTool.call(&ctx, json!({ "action": "create", "ticketId": ticket_id, "data": { "content": "a" } })).await.unwrap();
        let b = TaskManagerTool.call(&ctx, json!({ "action": "create", "ticketId": ticket_id, "data": { "content": "b" } })).await.unwrap();
        let result = TaskManagerTool
            .call(
                &ctx,
                json!({
                    "action": "reorder",
                    "ticketId": ticket_id,
                    "items": [
                        { "taskId": a["id"], "orderIndex": 1 },
                        { "taskId": b["id"], "orderIndex": 0 },
                    ],
                }),
            )
            .await
            .unwrap();
        assert_eq!(result[0]["orderIndex"], 1);
        assert_eq!(result[1]["orderIndex"], 0);
    }

    #[tokio::test]
    async fn batch_delete_partial_failure_on_non_numeric_item() {
        let (ctx, ticket_id) = ctx().await;
        let a = TaskManagerTool.call(&ctx, json!({ "action": "create", "ticketId": ticket_id, "data": { "content": "a" } })).await.unwrap();
        let result = TaskManagerTool
            .call(&ctx, json!({ "action": "batch_delete", "ticketId": ticket_id, "items": [a["id"], "not-an-id"] }))
            .await
            .unwrap();
        assert_eq!(result["successCount"], 1);
        assert_eq!(result["failureCount"], 1);
    }
}
