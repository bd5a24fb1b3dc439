use super::models::*;
use super::pool::Pool;
use super::{QueueCandidate, QueuePatch, Store, TaskPatch, TicketPatch};
use crate::error::{Code, CoreError, DomainError, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::str::FromStr;

pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn json_vec<T: serde::Serialize>(v: &[T]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

fn parse_vec<T: for<'de> serde::Deserialize<'de> + Default>(s: &str) -> Vec<T> {
    serde_json::from_str(s).unwrap_or_default()
}

fn project_from_row(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        description: row.get(3)?,
        created: row.get(4)?,
        updated: row.get(5)?,
    })
}

fn file_from_row(row: &rusqlite::Row) -> rusqlite::Result<File> {
    Ok(File {
        id: row.get(0)?,
        project_id: row.get(1)?,
        path: row.get(2)?,
        name: row.get(3)?,
        extension: row.get(4)?,
        size: row.get(5)?,
        content: row.get(6)?,
        summary: row.get(7)?,
    })
}

fn ticket_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
    let status_str: String = row.get(4)?;
    let priority_str: String = row.get(5)?;
    let suggested_files: String = row.get(6)?;
    let suggested_agents: String = row.get(7)?;
    let suggested_prompts: String = row.get(8)?;
    let queue_id: Option<Id> = row.get(9)?;
    let queue_status: Option<String> = row.get(10)?;
    let queue_priority: i64 = row.get(11)?;
    let queue_enqueued_at: Option<i64> = row.get(12)?;
    let queue_error_message: Option<String> = row.get(13)?;
    Ok(Ticket {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        overview: row.get(3)?,
        status: TicketStatus::from_str(&status_str).unwrap_or(TicketStatus::Open),
        priority: Priority::from_str(&priority_str).unwrap_or(Priority::Normal),
        suggested_file_ids: parse_vec(&suggested_files),
        suggested_agent_ids: parse_vec(&suggested_agents),
        suggested_prompt_ids: parse_vec(&suggested_prompts),
        queue: QueueFields {
            queue_id,
            queue_status: queue_status.and_then(|s| QueueStatus::from_str(&s).ok()),
            queue_priority,
            queue_enqueued_at,
            queue_error_message,
        },
        created: row.get(14)?,
        updated: row.get(15)?,
    })
}

fn task_from_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let suggested_files: String = row.get(6)?;
    let dependencies: String = row.get(8)?;
    let tags: String = row.get(9)?;
    let queue_id: Option<Id> = row.get(11)?;
    let queue_status: Option<String> = row.get(12)?;
    let queue_priority: i64 = row.get(13)?;
    let queue_enqueued_at: Option<i64> = row.get(14)?;
    let queue_error_message: Option<String> = row.get(15)?;
    Ok(Task {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        content: row.get(2)?,
        description: row.get(3)?,
        done: row.get::<_, i64>(4)? != 0,
        order_index: row.get(5)?,
        suggested_file_ids: parse_vec(&suggested_files),
        estimated_hours: row.get(7)?,
        dependencies: parse_vec(&dependencies),
        tags: parse_vec(&tags),
        agent_id: row.get(10)?,
        queue: QueueFields {
            queue_id,
            queue_status: queue_status.and_then(|s| QueueStatus::from_str(&s).ok()),
            queue_priority,
            queue_enqueued_at,
            queue_error_message,
        },
    })
}

fn queue_from_row(row: &rusqlite::Row) -> rusqlite::Result<Queue> {
    let status_str: String = row.get(4)?;
    Ok(Queue {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        status: QueueRunStatus::from_str(&status_str).unwrap_or(QueueRunStatus::Active),
        max_parallel_items: row.get(5)?,
    })
}

fn prompt_from_row(row: &rusqlite::Row) -> rusqlite::Result<Prompt> {
    Ok(Prompt {
        id: row.get(0)?,
        name: row.get(1)?,
        content: row.get(2)?,
        project_id: row.get(3)?,
    })
}

const TICKET_COLUMNS: &str = "id, project_id, title, overview, status, priority, suggested_file_ids, suggested_agent_ids, suggested_prompt_ids, queue_id, queue_status, queue_priority, queue_enqueued_at, queue_error_message, created, updated";
const TASK_COLUMNS: &str = "id, ticket_id, content, description, done, order_index, suggested_file_ids, estimated_hours, dependencies, tags, agent_id, queue_id, queue_status, queue_priority, queue_enqueued_at, queue_error_message";

#[async_trait]
impl Store for SqliteStore {
    async fn create_project(&self, name: &str, path: &str, description: &str) -> Result<Project> {
        let name = name.to_string();
        let path = path.to_string();
        let description = description.to_string();
        self.pool
            .run(move |conn| {
                let now = now_ms();
                conn.execute(
                    "INSERT INTO projects (name, path, description, created, updated) VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![name, path, description, now],
                )?;
                let id = conn.last_insert_rowid();
                Ok(Project { id, name, path, description, created: now, updated: now })
            })
            .await
    }

    async fn get_project(&self, id: Id) -> Result<Option<Project>> {
        self.pool
            .run(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, name, path, description, created, updated FROM projects WHERE id = ?1",
                        [id],
                        project_from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.pool
            .run(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, path, description, created, updated FROM projects ORDER BY id",
                )?;
                let rows = stmt.query_map([], project_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    async fn update_project(&self, id: Id, name: Option<String>, description: Option<String>) -> Result<Project> {
        self.pool
            .run(move |conn| {
                let now = now_ms();
                if let Some(name) = &name {
                    conn.execute("UPDATE projects SET name = ?1, updated = ?2 WHERE id = ?3", params![name, now, id])?;
                }
                if let Some(description) = &description {
                    conn.execute("UPDATE projects SET description = ?1, updated = ?2 WHERE id = ?3", params![description, now, id])?;
                }
                conn.query_row(
                    "SELECT id, name, path, description, created, updated FROM projects WHERE id = ?1",
                    [id],
                    project_from_row,
                )
                .optional()?
                .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::ProjectNotFound, "project", id)))
            })
            .await
    }

    async fn delete_project(&self, id: Id) -> Result<()> {
        self.pool
            .run(move |conn| {
                conn.execute("DELETE FROM projects WHERE id = ?1", [id])?;
                Ok(())
            })
            .await
    }

    async fn create_file(&self, project_id: Id, path: &str, content: &str) -> Result<File> {
        let path = path.to_string();
        let content = content.to_string();
        self.pool
            .run(move |conn| {
                let name = path.rsplit('/').next().unwrap_or(&path).to_string();
                let extension = name.rsplit('.').next().filter(|e| *e != name).unwrap_or("").to_string();
                let size = content.len() as i64;
                conn.execute(
                    "INSERT INTO files (project_id, path, name, extension, size, content) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![project_id, path, name, extension, size, content],
                )?;
                let id = conn.last_insert_rowid();
                Ok(File { id, project_id, path, name, extension, size, content, summary: None })
            })
            .await
    }

    async fn get_file(&self, project_id: Id, file_id: Id) -> Result<Option<File>> {
        self.pool
            .run(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, project_id, path, name, extension, size, content, summary FROM files WHERE project_id = ?1 AND id = ?2",
                        params![project_id, file_id],
                        file_from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn list_files(&self, project_id: Id) -> Result<Vec<File>> {
        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, project_id, path, name, extension, size, content, summary FROM files WHERE project_id = ?1 ORDER BY path",
                )?;
                let rows = stmt.query_map([project_id], file_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    async fn update_file_content(&self, project_id: Id, file_id: Id, content: &str) -> Result<File> {
        let content = content.to_string();
        self.pool
            .run(move |conn| {
                let size = content.len() as i64;
                let changed = conn.execute(
                    "UPDATE files SET content = ?1, size = ?2 WHERE project_id = ?3 AND id = ?4",
                    params![content, size, project_id, file_id],
                )?;
                if changed == 0 {
                    return Err(CoreError::Domain(DomainError::not_found(Code::FileNotFound, "file", file_id)));
                }
                conn.query_row(
                    "SELECT id, project_id, path, name, extension, size, content, summary FROM files WHERE project_id = ?1 AND id = ?2",
                    params![project_id, file_id],
                    file_from_row,
                )
                .map_err(CoreError::from)
            })
            .await
    }

    async fn delete_file(&self, project_id: Id, file_id: Id) -> Result<()> {
        self.pool
            .run(move |conn| {
                conn.execute("DELETE FROM files WHERE project_id = ?1 AND id = ?2", params![project_id, file_id])?;
                Ok(())
            })
            .await
    }

    async fn create_prompt(&self, name: &str, content: &str, project_id: Option<Id>) -> Result<Prompt> {
        let name = name.to_string();
        let content = content.to_string();
        self.pool
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO prompts (name, content, project_id) VALUES (?1, ?2, ?3)",
                    params![name, content, project_id],
                )?;
                let id = conn.last_insert_rowid();
                Ok(Prompt { id, name, content, project_id })
            })
            .await
    }

    async fn get_prompt(&self, id: Id) -> Result<Option<Prompt>> {
        self.pool
            .run(move |conn| {
                Ok(conn
                    .query_row("SELECT id, name, content, project_id FROM prompts WHERE id = ?1", [id], prompt_from_row)
                    .optional()?)
            })
            .await
    }

    async fn list_prompts(&self, project_id: Option<Id>) -> Result<Vec<Prompt>> {
        self.pool
            .run(move |conn| {
                let mut stmt = match project_id {
                    Some(_) => conn.prepare("SELECT id, name, content, project_id FROM prompts WHERE project_id = ?1 ORDER BY id")?,
                    None => conn.prepare("SELECT id, name, content, project_id FROM prompts ORDER BY id")?,
                };
                let rows = match project_id {
                    Some(pid) => stmt.query_map([pid], prompt_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?,
                    None => stmt.query_map([], prompt_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?,
                };
                Ok(rows)
            })
            .await
    }

    async fn update_prompt(&self, id: Id, name: Option<String>, content: Option<String>) -> Result<Prompt> {
        self.pool
            .run(move |conn| {
                if let Some(name) = &name {
                    conn.execute("UPDATE prompts SET name = ?1 WHERE id = ?2", params![name, id])?;
                }
                if let Some(content) = &content {
                    conn.execute("UPDATE prompts SET content = ?1 WHERE id = ?2", params![content, id])?;
                }
                conn.query_row("SELECT id, name, content, project_id FROM prompts WHERE id = ?1", [id], prompt_from_row)
                    .optional()?
                    .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::PromptNotFound, "prompt", id)))
            })
            .await
    }

    async fn delete_prompt(&self, id: Id) -> Result<()> {
        self.pool
            .run(move |conn| {
                conn.execute("DELETE FROM prompts WHERE id = ?1", [id])?;
                Ok(())
            })
            .await
    }

    async fn create_ticket(&self, project_id: Id, title: &str, overview: &str, priority: Priority) -> Result<Ticket> {
        let title = title.to_string();
        let overview = overview.to_string();
        self.pool
            .run(move |conn| {
                let now = now_ms();
                let priority_str: &'static str = priority.into();
                conn.execute(
                    "INSERT INTO tickets (project_id, title, overview, status, priority, created, updated) VALUES (?1, ?2, ?3, 'open', ?4, ?5, ?5)",
                    params![project_id, title, overview, priority_str, now],
                )?;
                let id = conn.last_insert_rowid();
                conn.query_row(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"), [id], ticket_from_row)
                    .map_err(CoreError::from)
            })
            .await
    }

    async fn get_ticket(&self, id: Id) -> Result<Option<Ticket>> {
        self.pool
            .run(move |conn| {
                Ok(conn
                    .query_row(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"), [id], ticket_from_row)
                    .optional()?)
            })
            .await
    }

    async fn list_tickets(&self, project_id: Id) -> Result<Vec<Ticket>> {
        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE project_id = ?1 ORDER BY id"))?;
                let rows = stmt.query_map([project_id], ticket_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    async fn update_ticket(&self, id: Id, patch: TicketPatch) -> Result<Ticket> {
        self.pool
            .run(move |conn| {
                let now = now_ms();
                if let Some(title) = &patch.title {
                    conn.execute("UPDATE tickets SET title = ?1, updated = ?2 WHERE id = ?3", params![title, now, id])?;
                }
                if let Some(overview) = &patch.overview {
                    conn.execute("UPDATE tickets SET overview = ?1, updated = ?2 WHERE id = ?3", params![overview, now, id])?;
                }
                if let Some(status) = patch.status {
                    let s: &'static str = status.into();
                    conn.execute("UPDATE tickets SET status = ?1, updated = ?2 WHERE id = ?3", params![s, now, id])?;
                }
                if let Some(priority) = patch.priority {
                    let s: &'static str = priority.into();
                    conn.execute("UPDATE tickets SET priority = ?1, updated = ?2 WHERE id = ?3", params![s, now, id])?;
                }
                if let Some(ids) = &patch.suggested_file_ids {
                    conn.execute("UPDATE tickets SET suggested_file_ids = ?1, updated = ?2 WHERE id = ?3", params![json_vec(ids), now, id])?;
                }
                if let Some(ids) = &patch.suggested_agent_ids {
                    conn.execute("UPDATE tickets SET suggested_agent_ids = ?1, updated = ?2 WHERE id = ?3", params![json_vec(ids), now, id])?;
                }
                if let Some(ids) = &patch.suggested_prompt_ids {
                    conn.execute("UPDATE tickets SET suggested_prompt_ids = ?1, updated = ?2 WHERE id = ?3", params![json_vec(ids), now, id])?;
                }
                conn.query_row(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"), [id], ticket_from_row)
                    .optional()?
                    .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::TicketNotFound, "ticket", id)))
            })
            .await
    }

    async fn delete_ticket(&self, id: Id) -> Result<()> {
        self.pool
            .run(move |conn| {
                conn.execute("DELETE FROM tickets WHERE id = ?1", [id])?;
                Ok(())
            })
            .await
    }

    async fn create_task(&self, ticket_id: Id, content: &str, order_index: i64) -> Result<Task> {
        let content = content.to_string();
        self.pool
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (ticket_id, content, order_index) VALUES (?1, ?2, ?3)",
                    params![ticket_id, content, order_index],
                )?;
                let id = conn.last_insert_rowid();
                conn.query_row(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"), [id], task_from_row)
                    .map_err(CoreError::from)
            })
            .await
    }

    async fn get_task(&self, ticket_id: Id, task_id: Id) -> Result<Option<Task>> {
        self.pool
            .run(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE ticket_id = ?1 AND id = ?2"),
                        params![ticket_id, task_id],
                        task_from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn list_tasks(&self, ticket_id: Id) -> Result<Vec<Task>> {
        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE ticket_id = ?1 ORDER BY order_index"))?;
                let rows = stmt.query_map([ticket_id], task_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    async fn update_task(&self, ticket_id: Id, task_id: Id, patch: TaskPatch) -> Result<Task> {
        self.pool
            .run(move |conn| {
                if let Some(v) = &patch.content {
                    conn.execute("UPDATE tasks SET content = ?1 WHERE ticket_id = ?2 AND id = ?3", params![v, ticket_id, task_id])?;
                }
                if let Some(v) = &patch.description {
                    conn.execute("UPDATE tasks SET description = ?1 WHERE ticket_id = ?2 AND id = ?3", params![v, ticket_id, task_id])?;
                }
                if let Some(v) = patch.done {
                    conn.execute("UPDATE tasks SET done = ?1 WHERE ticket_id = ?2 AND id = ?3", params![v as i64, ticket_id, task_id])?;
                }
                if let Some(v) = patch.order_index {
                    conn.execute("UPDATE tasks SET order_index = ?1 WHERE ticket_id = ?2 AND id = ?3", params![v, ticket_id, task_id])?;
                }
                if let Some(v) = &patch.suggested_file_ids {
                    conn.execute("UPDATE tasks SET suggested_file_ids = ?1 WHERE ticket_id = ?2 AND id = ?3", params![json_vec(v), ticket_id, task_id])?;
                }
                if let Some(v) = patch.estimated_hours {
                    conn.execute("UPDATE tasks SET estimated_hours = ?1 WHERE ticket_id = ?2 AND id = ?3", params![v, ticket_id, task_id])?;
                }
                if let Some(v) = &patch.dependencies {
                    conn.execute("UPDATE tasks SET dependencies = ?1 WHERE ticket_id = ?2 AND id = ?3", params![json_vec(v), ticket_id, task_id])?;
                }
                if let Some(v) = &patch.tags {
                    conn.execute("UPDATE tasks SET tags = ?1 WHERE ticket_id = ?2 AND id = ?3", params![json_vec(v), ticket_id, task_id])?;
                }
                if let Some(v) = &patch.agent_id {
                    conn.execute("UPDATE tasks SET agent_id = ?1 WHERE ticket_id = ?2 AND id = ?3", params![v, ticket_id, task_id])?;
                }
                conn.query_row(
                    &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE ticket_id = ?1 AND id = ?2"),
                    params![ticket_id, task_id],
                    task_from_row,
                )
                .optional()?
                .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::TaskNotFound, "task", task_id)))
            })
            .await
    }

    async fn delete_task(&self, ticket_id: Id, task_id: Id) -> Result<()> {
        self.pool
            .run(move |conn| {
                conn.execute("DELETE FROM tasks WHERE ticket_id = ?1 AND id = ?2", params![ticket_id, task_id])?;
                Ok(())
            })
            .await
    }

    async fn create_queue(&self, project_id: Id, name: &str, description: &str, max_parallel_items: i64) -> Result<Queue> {
        if max_parallel_items < 1 {
            return Err(CoreError::Domain(DomainError::new(
                Code::ValidationFailed,
                "maxParallelItems must be >= 1",
            )));
        }
        let name = name.to_string();
        let description = description.to_string();
        self.pool
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO queues (project_id, name, description, status, max_parallel_items) VALUES (?1, ?2, ?3, 'active', ?4)",
                    params![project_id, name, description, max_parallel_items],
                )?;
                let id = conn.last_insert_rowid();
                Ok(Queue { id, project_id, name, description, status: QueueRunStatus::Active, max_parallel_items })
            })
            .await
    }

    async fn get_queue(&self, id: Id) -> Result<Option<Queue>> {
        self.pool
            .run(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, project_id, name, description, status, max_parallel_items FROM queues WHERE id = ?1",
                        [id],
                        queue_from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn list_queues(&self, project_id: Id) -> Result<Vec<Queue>> {
        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, project_id, name, description, status, max_parallel_items FROM queues WHERE project_id = ?1 ORDER BY id",
                )?;
                let rows = stmt.query_map([project_id], queue_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    async fn update_queue(&self, id: Id, patch: QueuePatch) -> Result<Queue> {
        self.pool
            .run(move |conn| {
                if let Some(v) = &patch.name {
                    conn.execute("UPDATE queues SET name = ?1 WHERE id = ?2", params![v, id])?;
                }
                if let Some(v) = &patch.description {
                    conn.execute("UPDATE queues SET description = ?1 WHERE id = ?2", params![v, id])?;
                }
                if let Some(v) = patch.status {
                    let s: &'static str = v.into();
                    conn.execute("UPDATE queues SET status = ?1 WHERE id = ?2", params![s, id])?;
                }
                if let Some(v) = patch.max_parallel_items {
                    if v < 1 {
                        return Err(CoreError::Domain(DomainError::new(Code::ValidationFailed, "maxParallelItems must be >= 1")));
                    }
                    conn.execute("UPDATE queues SET max_parallel_items = ?1 WHERE id = ?2", params![v, id])?;
                }
                conn.query_row(
                    "SELECT id, project_id, name, description, status, max_parallel_items FROM queues WHERE id = ?1",
                    [id],
                    queue_from_row,
                )
                .optional()?
                .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::QueueNotFound, "queue", id)))
            })
            .await
    }

    async fn delete_queue(&self, id: Id) -> Result<()> {
        self.pool
            .run(move |conn| {
                conn.execute(
                    "UPDATE tickets SET queue_id = NULL, queue_status = 'cancelled', queue_enqueued_at = NULL WHERE queue_id = ?1 AND queue_status != 'in_progress'",
                    [id],
                )?;
                conn.execute(
                    "UPDATE tasks SET queue_id = NULL, queue_status = 'cancelled', queue_enqueued_at = NULL WHERE queue_id = ?1 AND queue_status != 'in_progress'",
                    [id],
                )?;
                conn.execute(
                    "UPDATE tickets SET queue_id = NULL, queue_status = 'cancelled', queue_enqueued_at = NULL WHERE queue_id = ?1",
                    [id],
                )?;
                conn.execute(
                    "UPDATE tasks SET queue_id = NULL, queue_status = 'cancelled', queue_enqueued_at = NULL WHERE queue_id = ?1",
                    [id],
                )?;
                conn.execute("DELETE FROM queues WHERE id = ?1", [id])?;
                Ok(())
            })
            .await
    }

    async fn enqueue_item(&self, item_type: ItemType, item_id: Id, queue_id: Id, priority: i64, now_ms: i64) -> Result<()> {
        self.pool
            .run(move |conn| {
                let table = table_for(item_type);
                let current: Option<Option<i64>> = conn
                    .query_row(&format!("SELECT queue_id FROM {table} WHERE id = ?1"), [item_id], |r| r.get(0))
                    .optional()?;
                match current {
                    None => return Err(CoreError::Domain(DomainError::not_found(item_not_found_code(item_type), item_type_label(item_type), item_id))),
                    Some(Some(_)) => {
                        return Err(CoreError::Domain(DomainError::new(
                            Code::ValidationFailed,
                            format!("{} {item_id} is already attached to a queue", item_type_label(item_type)),
                        )));
                    }
                    Some(None) => {}
                }
                conn.execute(
                    &format!("UPDATE {table} SET queue_id = ?1, queue_status = 'queued', queue_priority = ?2, queue_enqueued_at = ?3 WHERE id = ?4"),
                    params![queue_id, priority, now_ms, item_id],
                )?;
                Ok(())
            })
            .await
    }

    async fn dequeue_item(&self, item_type: ItemType, item_id: Id) -> Result<()> {
        self.pool
            .run(move |conn| {
                let table = table_for(item_type);
                let status: Option<String> = conn
                    .query_row(&format!("SELECT queue_status FROM {table} WHERE id = ?1"), [item_id], |r| r.get(0))
                    .optional()?
                    .flatten();
                if status.as_deref() == Some("in_progress") {
                    return Err(CoreError::Domain(DomainError::new(
                        Code::ValidationFailed,
                        format!("{} {item_id} is in progress and cannot be dequeued", item_type_label(item_type)),
                    )));
                }
                conn.execute(
                    &format!("UPDATE {table} SET queue_id = NULL, queue_status = NULL, queue_priority = 0, queue_enqueued_at = NULL WHERE id = ?1"),
                    [item_id],
                )?;
                Ok(())
            })
            .await
    }

    async fn detach_queue(&self, queue_id: Id) -> Result<()> {
        self.delete_queue(queue_id).await
    }

    async fn queued_candidates(&self, queue_id: Id) -> Result<Vec<QueueCandidate>> {
        self.pool
            .run(move |conn| {
                let mut out = Vec::new();
                {
                    let mut stmt = conn.prepare(
                        "SELECT id, ticket_id, queue_priority, queue_enqueued_at FROM tasks WHERE queue_id = ?1 AND queue_status = 'queued'",
                    )?;
                    let rows = stmt.query_map([queue_id], |r| {
                        Ok(QueueCandidate {
                            item_type: ItemType::Task,
                            item_id: r.get(0)?,
                            ticket_id: Some(r.get(1)?),
                            priority: r.get(2)?,
                            enqueued_at: r.get::<_, Option<i64>>(3)?.unwrap_or(0),
                        })
                    })?;
                    for row in rows {
                        out.push(row?);
                    }
                }
                {
                    let mut stmt = conn.prepare(
                        "SELECT id, queue_priority, queue_enqueued_at FROM tickets WHERE queue_id = ?1 AND queue_status = 'queued'",
                    )?;
                    let rows = stmt.query_map([queue_id], |r| {
                        Ok(QueueCandidate {
                            item_type: ItemType::Ticket,
                            item_id: r.get(0)?,
                            ticket_id: None,
                            priority: r.get(1)?,
                            enqueued_at: r.get::<_, Option<i64>>(2)?.unwrap_or(0),
                        })
                    })?;
                    for row in rows {
                        out.push(row?);
                    }
                }
                Ok(out)
            })
            .await
    }

    async fn in_progress_count(&self, queue_id: Id) -> Result<i64> {
        self.pool
            .run(move |conn| {
                let tasks: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM tasks WHERE queue_id = ?1 AND queue_status = 'in_progress'",
                    [queue_id],
                    |r| r.get(0),
                )?;
                let tickets: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM tickets WHERE queue_id = ?1 AND queue_status = 'in_progress'",
                    [queue_id],
                    |r| r.get(0),
                )?;
                Ok(tasks + tickets)
            })
            .await
    }

    async fn claim_item(&self, item_type: ItemType, item_id: Id, agent_id: Option<&str>, now_ms: i64) -> Result<bool> {
        let agent_id = agent_id.map(|s| s.to_string());
        self.pool
            .run(move |conn| {
                let table = table_for(item_type);
                let changed = conn.execute(
                    &format!("UPDATE {table} SET queue_status = 'in_progress', queue_started_at = ?2 WHERE id = ?1 AND queue_status = 'queued'"),
                    params![item_id, now_ms],
                )?;
                if changed > 0 && item_type == ItemType::Task {
                    if let Some(agent) = &agent_id {
                        conn.execute("UPDATE tasks SET agent_id = ?1 WHERE id = ?2", params![agent, item_id])?;
                    }
                }
                Ok(changed > 0)
            })
            .await
    }

    async fn complete_item(&self, item_type: ItemType, item_id: Id, now_ms: i64) -> Result<()> {
        self.pool
            .run(move |conn| {
                let table = table_for(item_type);
                let changed = conn.execute(
                    &format!("UPDATE {table} SET queue_status = 'completed', queue_ended_at = ?2 WHERE id = ?1 AND queue_status = 'in_progress'"),
                    params![item_id, now_ms],
                )?;
                if changed == 0 {
                    return Err(CoreError::Domain(DomainError::new(
                        Code::ValidationFailed,
                        format!("{} {item_id} is not in progress", item_type_label(item_type)),
                    )));
                }
                Ok(())
            })
            .await
    }

    async fn fail_item(&self, item_type: ItemType, item_id: Id, error_message: &str, now_ms: i64) -> Result<()> {
        let error_message = error_message.to_string();
        self.pool
            .run(move |conn| {
                let table = table_for(item_type);
                let changed = conn.execute(
                    &format!(
                        "UPDATE {table} SET queue_status = 'failed', queue_ended_at = ?2, queue_error_message = ?3 WHERE id = ?1 AND queue_status = 'in_progress'"
                    ),
                    params![item_id, now_ms, error_message],
                )?;
                if changed == 0 {
                    return Err(CoreError::Domain(DomainError::new(
                        Code::ValidationFailed,
                        format!("{} {item_id} is not in progress", item_type_label(item_type)),
                    )));
                }
                Ok(())
            })
            .await
    }

    async fn queue_stats(&self, queue_id: Id) -> Result<QueueStats> {
        self.pool
            .run(move |conn| {
                let name: String = conn
                    .query_row("SELECT name FROM queues WHERE id = ?1", [queue_id], |r| r.get(0))
                    .optional()?
                    .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::QueueNotFound, "queue", queue_id)))?;

                let mut counts = [0i64; 5]; // queued, in_progress, completed, failed, cancelled
                let statuses = ["queued", "in_progress", "completed", "failed", "cancelled"];
                for table in ["tickets", "tasks"] {
                    for (i, status) in statuses.iter().enumerate() {
                        let c: i64 = conn.query_row(
                            &format!("SELECT COUNT(*) FROM {table} WHERE queue_id = ?1 AND queue_status = ?2"),
                            params![queue_id, status],
                            |r| r.get(0),
                        )?;
                        counts[i] += c;
                    }
                }

                let mut agents: Vec<String> = Vec::new();
                {
                    let mut stmt = conn.prepare(
                        "SELECT DISTINCT agent_id FROM tasks WHERE queue_id = ?1 AND queue_status = 'in_progress' AND agent_id IS NOT NULL",
                    )?;
                    let rows = stmt.query_map([queue_id], |r| r.get::<_, String>(0))?;
                    for row in rows {
                        agents.push(row?);
                    }
                }

                let total = counts.iter().sum();

                let mut duration_sum: f64 = 0.0;
                let mut duration_count: i64 = 0;
                for table in ["tickets", "tasks"] {
                    let (sum, count): (Option<f64>, i64) = conn.query_row(
                        &format!(
                            "SELECT SUM(queue_ended_at - queue_started_at), COUNT(*) FROM {table} \
                             WHERE queue_id = ?1 AND queue_status = 'completed' \
                             AND queue_started_at IS NOT NULL AND queue_ended_at IS NOT NULL"
                        ),
                        [queue_id],
                        |r| Ok((r.get(0)?, r.get(1)?)),
                    )?;
                    if let Some(sum) = sum {
                        duration_sum += sum;
                        duration_count += count;
                    }
                }
                let average_processing_time = (duration_count > 0).then(|| duration_sum / duration_count as f64);

                Ok(QueueStats {
                    queue_name: name,
                    total_items: total,
                    queued_items: counts[0],
                    in_progress_items: counts[1],
                    completed_items: counts[2],
                    failed_items: counts[3],
                    cancelled_items: counts[4],
                    average_processing_time,
                    current_agents: agents,
                })
            })
            .await
    }

    async fn open_execution(&self, tool_name: &str, project_id: Option<Id>, session_id: &str, input_size: i64, started_at: i64) -> Result<Id> {
        let tool_name = tool_name.to_string();
        let session_id = session_id.to_string();
        self.pool
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO tool_executions (tool_name, project_id, session_id, started_at, input_size) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![tool_name, project_id, session_id, started_at, input_size],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    async fn close_execution(&self, id: Id, status: ExecutionStatus, output_size: Option<i64>, error_message: Option<&str>, ended_at: i64) -> Result<()> {
        let status_str: &'static str = status.into();
        let error_message = error_message.map(|s| s.to_string());
        self.pool
            .run(move |conn| {
                conn.execute(
                    "UPDATE tool_executions SET status = ?1, output_size = ?2, error_message = ?3, ended_at = ?4 WHERE id = ?5",
                    params![status_str, output_size, error_message, ended_at, id],
                )?;
                Ok(())
            })
            .await
    }
}

fn table_for(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Ticket => "tickets",
        ItemType::Task => "tasks",
    }
}

fn item_type_label(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Ticket => "ticket",
        ItemType::Task => "task",
    }
}

fn item_not_found_code(item_type: ItemType) -> Code {
    match item_type {
        ItemType::Ticket => Code::TicketNotFound,
        ItemType::Task => Code::TaskNotFound,
    }
}

#[cfg(test)]
pub async fn test_pool() -> Pool {
    let pool = Pool::open_in_memory().expect("open in-memory pool");
    pool.migrate().await.expect("migrate");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_project() {
        let pool = test_pool().await;
        let store = SqliteStore::new(pool);
        let project = store.create_project("demo", "/tmp/demo", "a demo project").await.unwrap();
        let fetched = store.get_project(project.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "demo");
    }

    #[tokio::test]
    async fn enqueue_rejects_double_attach() {
        let pool = test_pool().await;
        let store = SqliteStore::new(pool);
        let project = store.create_project("p", "/p", "").await.unwrap();
        let ticket = store.create_ticket(project.id, "t", "", Priority::Normal).await.unwrap();
        let queue = store.create_queue(project.id, "q", "", 1).await.unwrap();
        store.enqueue_item(ItemType::Ticket, ticket.id, queue.id, 0, 1).await.unwrap();
        let err = store.enqueue_item(ItemType::Ticket, ticket.id, queue.id, 0, 2).await;
        assert!(err.is_err());
    }
}
