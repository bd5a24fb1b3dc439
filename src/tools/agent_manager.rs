//! Tracks which external agent identifiers are currently claimed against tasks in a project, and
//! lets a caller suggest agents for a ticket by id (the suggestion itself stays editor-driven:
//! this tool surfaces and records `suggestedAgentIds`, it doesn't run an agent directory).

use async_trait::async_trait;
use serde_json::{Value, json};

use super::args::{require_array, require_data, require_i64, unknown_action};
use super::{Tool, ToolContext};
use crate::error::Result;
use crate::store::TicketPatch;

const ACTIONS: &[&str] = &["list_active", "assign_to_ticket", "get_assignments"];

pub struct AgentManagerTool;

#[async_trait]
impl Tool for AgentManagerTool {
    fn name(&self) -> &'static str {
        "agent_manager"
    }

    fn description(&self) -> &'static str {
        "List agents active on a project's queues and manage agent suggestions on tickets."
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

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let action = super::args::action_str(&args)?;
        match action {
            "list_active" => {
                let project_id = require_i64(&args, "projectId", "123")?;
                let queues = ctx.queue.list_queues_by_project(project_id).await?;
                let mut agents = std::collections::BTreeSet::new();
                for queue in queues {
                    let stats = ctx.queue.get_queue_stats(queue.id).await?;
                    agents.extend(stats.current_agents);
                }
                Ok(json!(agents.into_iter().collect::<Vec<_>>()))
            }
            "assign_to_ticket" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let data = require_data(&args, r#"{"agentIds": ["code-reviewer"]}"#)?;
                let agent_ids = require_array(data, "agentIds", r#"["code-reviewer"]"#)?;
                let agent_ids: Vec<String> = agent_ids.iter().filter_map(|v| v.as_str().map(String::from)).collect();
                let patch = TicketPatch { suggested_agent_ids: Some(agent_ids), ..Default::default() };
                Ok(json!(ctx.store.update_ticket(ticket_id, patch).await?))
            }
            "get_assignments" => {
                let ticket_id = require_i64(&args, "ticketId", "123")?;
                let ticket = ctx.store.get_ticket(ticket_id).await?.ok_or_else(|| {
                    crate::error::CoreError::Domain(crate::error::DomainError::not_found(crate::error::Code::TicketNotFound, "ticket", ticket_id))
                })?;
                Ok(json!({ "agentIds": ticket.suggested_agent_ids }))
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
    async fn assign_then_read_back() {
        let ctx = ctx().await;
        let project = ctx.store.create_project("p", "/p", "").await.unwrap();
        let ticket = ctx.store.create_ticket(project.id, "t", "", Priority::Normal).await.unwrap();
        AgentManagerTool
            .call(&ctx, json!({ "action": "assign_to_ticket", "ticketId": ticket.id, "data": { "agentIds": ["reviewer"] } }))
            .await
            .unwrap();
        let result = AgentManagerTool.call(&ctx, json!({ "action": "get_assignments", "ticketId": ticket.id })).await.unwrap();
        assert_eq!(result["agentIds"], json!(["reviewer"]));
    }
}
