//! Tickets: the top-level unit of planned work, containing tasks.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{check_batch_size, opt_str, require_array, require_data, require_i64, require_str, unknown_action};
use super::{BatchFailure, BatchResult, Tool, ToolContext};
use crate::error::{Code, CoreError, DomainError, Result};
use crate::store::TicketPatch;
use crate::store::models::{Priority, TicketStatus};

const ACTIONS: &[&str] = &["list", "get", "create", "update", "delete", "batch_create", "batch_update", "batch_delete", "batch_move"];

pub struct TicketManagerTool;

fn parse_priority(raw: &str) -> Result<Priority> {
    Priority::from_str(raw).map_err(|_| CoreError::Domain(DomainError::new(Code::InvalidParams, format!("invalid priority `{raw}`"))))
}

fn parse_status(raw: &str) -> Result<TicketStatus> {
    TicketStatus::from_str(raw).map_err(|_| CoreError::Domain(DomainError::new(Code::InvalidParams, format!("invalid status `{raw}`"))))
}

#[async_trait]
impl Tool for TicketManagerTool {
    fn name(&self) -> &'static str {
        "ticket_manager"
    }

    fn description(&self) -> &'static str {
        "Create, list, update, and delete tickets, with batch variants for bulk operations."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ACTIONS },
                "projectId": { "type": "number" },
                "ticketId": { "type": "number" },
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
                let project_id = require_i64(&args, "projectId", "123")?;
                Ok(json!(ctx.store.list_tickets(project_id).await?))
            }
            "get" => {
                let id = require_i64(&args, "ticketId", "123")?;
                Ok(json!(ctx.store.get_ticket(id).await?.ok_or_else(|| not_found(id))?))
            }
            "create" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let data = require_data(&args, r#"{"title": "Fix login bug"}"#)?;
                let ticket = create_one(ctx, project_id, data).await?;
                Ok(json!(ticket))
            }
            "update" => {
                let id = require_i64(&args, "ticketId", "123")?;
                let data = require_data(&args, r#"{"status": "closed"}"#)?;
                let patch = patch_from(data)?;
                Ok(json!(ctx.store.update_ticket(id, patch).await?))
            }
            "delete" => {
                let id = require_i64(&args, "ticketId", "123")?;
                ctx.store.delete_ticket(id).await?;
                Ok(json!({ "deleted": true, "ticketId": id }))
            }
            "batch_create" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let items = require_array(&args, "items", r#"[{"title": "a"}]"#)?.clone();
                check_batch_size(self.name(), action, &items)?;
                let mut result = BatchResult::default();
                for item in items {
                    match create_one(ctx, project_id, &item).await {
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
                let items = require_array(&args, "items", r#"[{"ticketId": 1, "status": "closed"}]"#)?.clone();
                check_batch_size(self.name(), action, &items)?;
                let mut result = BatchResult::default();
                for item in items {
                    let outcome = async {
                        let id = item
                            .get("ticketId")
                            .and_then(Value::as_i64)
                            .ok_or_else(|| CoreError::Domain(DomainError::new(Code::InvalidParams, "each item needs ticketId")))?;
                        let patch = patch_from(&item)?;
                        ctx.store.update_ticket(id, patch).await
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
                let items = require_array(&args, "items", "[1, 2, 3]")?.clone();
                check_batch_size(self.name(), action, &items)?;
                let mut result = BatchResult::default();
                for item in items {
                    match item.as_i64() {
                        Some(id) => match ctx.store.delete_ticket(id).await {
                            Ok(_) => result.success_count += 1,
                            Err(e) => {
                                result.failure_count += 1;
                                result.failed.push(BatchFailure { item, error: e.into_domain().message });
                            }
                        },
                        None => {
                            result.failure_count += 1;
                            result.failed.push(BatchFailure { item, error: "expected a ticket id".to_string() });
                        }
                    }
                }
                finish_batch(self.name(), action, result)
            }
            "batch_move" => {
                let items = require_array(&args, "items", r#"[{"ticketId": 1, "projectId": 2}]"#)?.clone();
                check_batch_size(self.name(), action, &items)?;
                let mut result = BatchResult::default();
                for item in items {
                    result.failure_count += 1;
                    result.failed.push(BatchFailure { item, error: "moving tickets across projects is not supported".to_string() });
                }
                finish_batch(self.name(), action, result)
            }
            other => Err(unknown_action(self.name(), other, ACTIONS)),
        }
    }
}

async fn create_one(ctx: &ToolContext, project_id: i64, data: &Value) -> Result<crate::store::models::Ticket> {
    let title = require_str(data, "title", "Fix login bug")?;
    let overview = opt_str(data, "overview").unwrap_or("");
    let priority = match opt_str(data, "priority") {
        Some(raw) => parse_priority(raw)?,
        None => Priority::Normal,
    };
    Ok(ctx.store.create_ticket(project_id, title, overview, priority).await?)
}

fn patch_from(data: &Value) -> Result<TicketPatch> {
    Ok(TicketPatch {
        title: opt_str(data, "title").map(String::from),
        overview: opt_str(data, "overview").map(String::from),
        status: opt_str(data, "status").map(parse_status).transpose()?,
        priority: opt_str(data, "priority").map(parse_priority).transpose()?,
        suggested_file_ids: data.get("suggestedFileIds").and_then(Value::as_array).map(|a| a.iter().filter_map(Value::as_i64).collect()),
        suggested_agent_ids: data
            .get("suggestedAgentIds")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect()),
        suggested_prompt_ids: data.get("suggestedPromptIds").and_then(Value::as_array).map(|a| a.iter().filter_map(Value::as_i64).collect()),
    })
}

fn finish_batch(tool: &str, action: &str, result: BatchResult) -> Result<Value> {
    if result.success_count == 0 && result.failure_count > 0 {
        return Err(CoreError::Domain(DomainError::new(Code::BatchOperationFailed, format!("all items in {tool}.{action} failed"))));
    }
    Ok(json!(result))
}

fn not_found(id: i64) -> CoreError {
    CoreError::Domain(DomainError::not_found(Code::TicketNotFound, "ticket", id))
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
        (ctx, project.id)
    }

    #[tokio::test]
    async fn batch_create_reports_partial_failure() {
        let (ctx, project_id) = ctx().await;
        let result = TicketManagerTool
            .call(
                &ctx,
                json!({ "action": "batch_create", "projectId": project_id, "items": [{ "title": "good" }, { "notATitle": "bad" }] }),
            )
            .await
            .unwrap();
        assert_eq!(result["successCount"], 1);
        assert_eq!(result["failureCount"], 1);
    }

    #[tokio::test]
    async fn batch_create_all_failing_is_batch_operation_failed() {
        let (ctx, project_id) = ctx().await;
        let err = TicketManagerTool
            .call(&ctx, json!({ "action": "batch_create", "projectId": project_id, "items": [{ "bad": true }] }))
            .await
            .unwrap_err();
        match err {
            CoreError::Domain(d) => assert_eq!(d.code, Code::BatchOperationFailed),
            other => panic!("{other:?}"),
        }
    }

    #[tokio::test]
    async fn batch_over_limit_is_rejected_before_running() {
        let (ctx, project_id) = ctx().await;
        let items: Vec<Value> = (0..101).map(|i| json!({ "title": format!("t{i}") })).collect();
        let err = TicketManagerTool
            .call(&ctx, json!({ "action": "batch_create", "projectId": project_id, "items": items }))
            .await
            .unwrap_err();
        match err {
            CoreError::Domain(d) => assert_eq!(d.code, Code::BatchSizeExceeded),
            other => panic!("{other:?}"),
        }
    }
}
