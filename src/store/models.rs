//! Entity types persisted by the [`super::Store`].

use serde::{Deserialize, Serialize};

pub type Id = i64;
pub type TimestampMs = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Id,
    pub name: String,
    pub path: String,
    pub description: String,
    pub created: TimestampMs,
    pub updated: TimestampMs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: Id,
    pub project_id: Id,
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size: i64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_status: Option<QueueStatus>,
    pub queue_priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_enqueued_at: Option<TimestampMs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_error_message: Option<String>,
}

impl Default for QueueFields {
    fn default() -> Self {
        Self {
            queue_id: None,
            queue_status: None,
            queue_priority: 0,
            queue_enqueued_at: None,
            queue_error_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Id,
    pub project_id: Id,
    pub title: String,
    pub overview: String,
    pub status: TicketStatus,
    pub priority: Priority,
    #[serde(default)]
    pub suggested_file_ids: Vec<Id>,
    #[serde(default)]
    pub suggested_agent_ids: Vec<String>,
    #[serde(default)]
    pub suggested_prompt_ids: Vec<Id>,
    #[serde(flatten)]
    pub queue: QueueFields,
    pub created: TimestampMs,
    pub updated: TimestampMs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Id,
    pub ticket_id: Id,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub done: bool,
    pub order_index: i64,
    #[serde(default)]
    pub suggested_file_ids: Vec<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub dependencies: Vec<Id>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(flatten)]
    pub queue: QueueFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueRunStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub id: Id,
    pub project_id: Id,
    pub name: String,
    pub description: String,
    pub status: QueueRunStatus,
    pub max_parallel_items: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: Id,
    pub name: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Id>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: Id,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Id>,
    pub session_id: String,
    pub started_at: TimestampMs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<TimestampMs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    pub input_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// An item type distinguishing tickets from tasks at the queue boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Ticket,
    Task,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub total_items: i64,
    pub queued_items: i64,
    pub in_progress_items: i64,
    pub completed_items: i64,
    pub failed_items: i64,
    pub cancelled_items: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_processing_time: Option<f64>,
    pub current_agents: Vec<String>,
}
