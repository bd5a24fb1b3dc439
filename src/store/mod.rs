//! Durable persistence for projects, files, tickets, tasks, queues, prompts, and tool-execution
//! records. The default implementation is backed by SQLite through [`pool::Pool`].

pub mod models;
pub mod pool;
pub mod schema;
pub(crate) mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use async_trait::async_trait;
use models::*;

/// The persistence seam injected into every tool handler. Handlers never hold a connection
/// across an await boundary; they call through this trait and the implementation manages its
/// own pooling.
#[async_trait]
pub trait Store: Send + Sync {
    // Projects
    async fn create_project(&self, name: &str, path: &str, description: &str) -> Result<Project>;
    async fn get_project(&self, id: Id) -> Result<Option<Project>>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn update_project(
        &self,
        id: Id,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Project>;
    async fn delete_project(&self, id: Id) -> Result<()>;

    // Files
    async fn create_file(&self, project_id: Id, path: &str, content: &str) -> Result<File>;
    async fn get_file(&self, project_id: Id, file_id: Id) -> Result<Option<File>>;
    async fn list_files(&self, project_id: Id) -> Result<Vec<File>>;
    async fn update_file_content(&self, project_id: Id, file_id: Id, content: &str) -> Result<File>;
    async fn delete_file(&self, project_id: Id, file_id: Id) -> Result<()>;

    // Prompts
    async fn create_prompt(&self, name: &str, content: &str, project_id: Option<Id>) -> Result<Prompt>;
    async fn get_prompt(&self, id: Id) -> Result<Option<Prompt>>;
    async fn list_prompts(&self, project_id: Option<Id>) -> Result<Vec<Prompt>>;
    async fn update_prompt(&self, id: Id, name: Option<String>, content: Option<String>) -> Result<Prompt>;
    async fn delete_prompt(&self, id: Id) -> Result<()>;

    // Tickets
    async fn create_ticket(
        &self,
        project_id: Id,
        title: &str,
        overview: &str,
        priority: Priority,
    ) -> Result<Ticket>;
    async fn get_ticket(&self, id: Id) -> Result<Option<Ticket>>;
    async fn list_tickets(&self, project_id: Id) -> Result<Vec<Ticket>>;
    async fn update_ticket(&self, id: Id, patch: TicketPatch) -> Result<Ticket>;
    async fn delete_ticket(&self, id: Id) -> Result<()>;

    // Tasks
    async fn create_task(&self, ticket_id: Id, content: &str, order_index: i64) -> Result<Task>;
    async fn get_task(&self, ticket_id: Id, task_id: Id) -> Result<Option<Task>>;
    async fn list_tasks(&self, ticket_id: Id) -> Result<Vec<Task>>;
    async fn update_task(&self, ticket_id: Id, task_id: Id, patch: TaskPatch) -> Result<Task>;
    async fn delete_task(&self, ticket_id: Id, task_id: Id) -> Result<()>;

    // Queues
    async fn create_queue(
        &self,
        project_id: Id,
        name: &str,
        description: &str,
        max_parallel_items: i64,
    ) -> Result<Queue>;
    async fn get_queue(&self, id: Id) -> Result<Option<Queue>>;
    async fn list_queues(&self, project_id: Id) -> Result<Vec<Queue>>;
    async fn update_queue(&self, id: Id, patch: QueuePatch) -> Result<Queue>;
    async fn delete_queue(&self, id: Id) -> Result<()>;

    /// Queue-state transitions. These are the *only* place queue columns on tickets/tasks are
    /// written (§9 design decision: handlers never poke `queue_status` directly).
    async fn enqueue_item(
        &self,
        item_type: ItemType,
        item_id: Id,
        queue_id: Id,
        priority: i64,
        now_ms: i64,
    ) -> Result<()>;
    async fn dequeue_item(&self, item_type: ItemType, item_id: Id) -> Result<()>;
    async fn detach_queue(&self, queue_id: Id) -> Result<()>;

    /// Returns queued candidates for a queue ordered by the selection policy: smallest
    /// priority, then earliest enqueue time, then smallest id, tasks before tickets at ties.
    async fn queued_candidates(&self, queue_id: Id) -> Result<Vec<QueueCandidate>>;
    async fn in_progress_count(&self, queue_id: Id) -> Result<i64>;
    async fn claim_item(&self, item_type: ItemType, item_id: Id, agent_id: Option<&str>, now_ms: i64) -> Result<bool>;
    async fn complete_item(&self, item_type: ItemType, item_id: Id, now_ms: i64) -> Result<()>;
    async fn fail_item(&self, item_type: ItemType, item_id: Id, error_message: &str, now_ms: i64) -> Result<()>;
    async fn queue_stats(&self, queue_id: Id) -> Result<QueueStats>;

    // Tool executions
    async fn open_execution(
        &self,
        tool_name: &str,
        project_id: Option<Id>,
        session_id: &str,
        input_size: i64,
        started_at: i64,
    ) -> Result<Id>;
    async fn close_execution(
        &self,
        id: Id,
        status: ExecutionStatus,
        output_size: Option<i64>,
        error_message: Option<&str>,
        ended_at: i64,
    ) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct TicketPatch {
    pub title: Option<String>,
    pub overview: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub suggested_file_ids: Option<Vec<Id>>,
    pub suggested_agent_ids: Option<Vec<String>>,
    pub suggested_prompt_ids: Option<Vec<Id>>,
}

#[derive(Debug, Default, Clone)]
pub struct TaskPatch {
    pub content: Option<String>,
    pub description: Option<String>,
    pub done: Option<bool>,
    pub order_index: Option<i64>,
    pub suggested_file_ids: Option<Vec<Id>>,
    pub estimated_hours: Option<f64>,
    pub dependencies: Option<Vec<Id>>,
    pub tags: Option<Vec<String>>,
    pub agent_id: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct QueuePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<QueueRunStatus>,
    pub max_parallel_items: Option<i64>,
}

/// A queued ticket or task as seen by the selection policy, before it is claimed.
#[derive(Debug, Clone)]
pub struct QueueCandidate {
    pub item_type: ItemType,
    pub item_id: Id,
    pub ticket_id: Option<Id>,
    pub priority: i64,
    pub enqueued_at: i64,
}
