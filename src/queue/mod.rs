//! Work-item arbitration on top of the durable queue fields on tickets and tasks.
//!
//! Every mutating operation on a given queue runs under that queue's own `tokio::sync::Mutex`,
//! so the `maxParallelItems` invariant holds under real concurrency without serializing unrelated
//! queues against each other. The mutex set is built lazily and never shrinks; queues are rarely
//! created or destroyed relative to claim volume.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::capabilities::Clock;
use crate::error::{Code, CoreError, DomainError, Result};
use crate::store::models::{Id, ItemType, Queue, QueueRunStatus, QueueStats};
use crate::store::{QueuePatch, Store};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextItem {
    Task { item_id: Id, ticket_id: Id },
    Ticket { item_id: Id },
    None { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueWithStats {
    pub queue: Queue,
    pub stats: QueueStats,
}

pub struct QueueEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    locks: std::sync::Mutex<HashMap<Id, Arc<AsyncMutex<()>>>>,
}

impl QueueEngine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, locks: std::sync::Mutex::new(HashMap::new()) }
    }

    fn lock_for(&self, queue_id: Id) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("queue lock map poisoned");
        locks.entry(queue_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    pub async fn create_queue(&self, project_id: Id, name: &str, description: &str, max_parallel_items: i64) -> Result<Queue> {
        self.store.create_queue(project_id, name, description, max_parallel_items).await
    }

    pub async fn list_queues_by_project(&self, project_id: Id) -> Result<Vec<Queue>> {
        self.store.list_queues(project_id).await
    }

    pub async fn get_queue_by_id(&self, id: Id) -> Result<Queue> {
        self.store
            .get_queue(id)
            .await?
            .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::QueueNotFound, "queue", id)))
    }

    pub async fn update_queue(&self, id: Id, patch: QueuePatch) -> Result<Queue> {
        self.store.update_queue(id, patch).await
    }

    pub async fn delete_queue(&self, id: Id) -> Result<()> {
        let guard = self.lock_for(id);
        let _permit = guard.lock().await;
        self.store.delete_queue(id).await
    }

    pub async fn enqueue_ticket(&self, ticket_id: Id, queue_id: Id, priority: i64) -> Result<()> {
        let guard = self.lock_for(queue_id);
        let _permit = guard.lock().await;
        self.store.enqueue_item(ItemType::Ticket, ticket_id, queue_id, priority, self.clock.now_ms()).await
    }

    pub async fn enqueue_task(&self, _ticket_id: Id, task_id: Id, queue_id: Id, priority: i64) -> Result<()> {
        let guard = self.lock_for(queue_id);
        let _permit = guard.lock().await;
        self.store.enqueue_item(ItemType::Task, task_id, queue_id, priority, self.clock.now_ms()).await
    }

    pub async fn enqueue_ticket_with_all_tasks(&self, queue_id: Id, ticket_id: Id, priority: i64) -> Result<()> {
        let guard = self.lock_for(queue_id);
        let _permit = guard.lock().await;
        let now = self.clock.now_ms();
        self.store.enqueue_item(ItemType::Ticket, ticket_id, queue_id, priority, now).await?;
        for task in self.store.list_tasks(ticket_id).await? {
            self.store.enqueue_item(ItemType::Task, task.id, queue_id, priority, now).await?;
        }
        Ok(())
    }

    pub async fn dequeue_ticket(&self, ticket_id: Id) -> Result<()> {
        self.store.dequeue_item(ItemType::Ticket, ticket_id).await
    }

    pub async fn dequeue_task(&self, _ticket_id: Id, task_id: Id) -> Result<()> {
        self.store.dequeue_item(ItemType::Task, task_id).await
    }

    /// Implements the selection policy: smallest priority first, ties broken by earliest enqueue
    /// time then smallest id, tasks preferred over tickets at a full tie.
    pub async fn get_next_task_from_queue(&self, queue_id: Id, agent_id: Option<&str>) -> Result<NextItem> {
        let guard = self.lock_for(queue_id);
        let _permit = guard.lock().await;

        let queue = self.get_queue_by_id(queue_id).await?;
        if queue.status == QueueRunStatus::Paused {
            return Ok(NextItem::None { reason: "queue is paused".to_string() });
        }
        let in_flight = self.store.in_progress_count(queue_id).await?;
        if in_flight >= queue.max_parallel_items {
            return Ok(NextItem::None {
                reason: format!("queue has reached its limit of {} in-progress items", queue.max_parallel_items),
            });
        }

        let mut candidates = self.store.queued_candidates(queue_id).await?;
        if candidates.is_empty() {
            return Ok(NextItem::None { reason: "no queued items".to_string() });
        }
        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.enqueued_at.cmp(&b.enqueued_at))
                .then_with(|| match (a.item_type, b.item_type) {
                    (ItemType::Task, ItemType::Ticket) => std::cmp::Ordering::Less,
                    (ItemType::Ticket, ItemType::Task) => std::cmp::Ordering::Greater,
                    _ => std::cmp::Ordering::Equal,
                })
                .then(a.item_id.cmp(&b.item_id))
        });
        let chosen = candidates.into_iter().next().expect("non-empty checked above");

        let claimed = self.store.claim_item(chosen.item_type, chosen.item_id, agent_id, self.clock.now_ms()).await?;
        if !claimed {
            // Lost a race with an external writer between read and claim; caller retries.
            return Ok(NextItem::None { reason: "item was claimed concurrently, retry".to_string() });
        }
        debug!(queue_id, item_type = ?chosen.item_type, item_id = chosen.item_id, from_status = "queued", to_status = "in_progress", "queue item claimed");

        Ok(match chosen.item_type {
            ItemType::Task => NextItem::Task {
                item_id: chosen.item_id,
                ticket_id: chosen.ticket_id.unwrap_or_default(),
            },
            ItemType::Ticket => NextItem::Ticket { item_id: chosen.item_id },
        })
    }

    pub async fn complete_queue_item(&self, item_type: ItemType, item_id: Id) -> Result<()> {
        debug!(item_type = ?item_type, item_id, from_status = "in_progress", to_status = "completed", "queue item completed");
        self.store.complete_item(item_type, item_id, self.clock.now_ms()).await
    }

    pub async fn fail_queue_item(&self, item_type: ItemType, item_id: Id, error_message: &str) -> Result<()> {
        debug!(item_type = ?item_type, item_id, from_status = "in_progress", to_status = "failed", "queue item failed");
        self.store.fail_item(item_type, item_id, error_message, self.clock.now_ms()).await
    }

    pub async fn get_queue_stats(&self, queue_id: Id) -> Result<QueueStats> {
        self.store.queue_stats(queue_id).await
    }

    pub async fn get_queues_with_stats(&self, project_id: Id) -> Result<Vec<QueueWithStats>> {
        let queues = self.store.list_queues(project_id).await?;
        let mut out = Vec::with_capacity(queues.len());
        for queue in queues {
            let stats = self.store.queue_stats(queue.id).await?;
            out.push(QueueWithStats { queue, stats });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{FakeClock, SystemClock};
    use crate::store::SqliteStore;
    use crate::store::models::Priority;

    async fn engine() -> (QueueEngine, Arc<dyn Store>) {
        let pool = crate::store::sqlite::test_pool().await;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let engine = QueueEngine::new(store.clone(), Arc::new(SystemClock));
        (engine, store)
    }

    async fn engine_with_fake_clock() -> (QueueEngine, Arc<dyn Store>, Arc<FakeClock>) {
        let pool = crate::store::sqlite::test_pool().await;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let clock = Arc::new(FakeClock::new(0));
        let engine = QueueEngine::new(store.clone(), clock.clone());
        (engine, store, clock)
    }

    #[tokio::test]
    async fn priority_then_fifo_ordering() {
        let (engine, store) = engine().await;
        let project = store.create_project("p", "/p", "").await.unwrap();
        let ticket = store.create_ticket(project.id, "t", "", Priority::Normal).await.unwrap();
        let task_a = store.create_task(ticket.id, "a", 0).await.unwrap();
        let task_b = store.create_task(ticket.id, "b", 1).await.unwrap();
        let queue = engine.create_queue(project.id, "q", "", 2).await.unwrap();

        engine.enqueue_task(ticket.id, task_a.id, queue.id, 5).await.unwrap();
        engine.enqueue_task(ticket.id, task_b.id, queue.id, 1).await.unwrap();

        let next = engine.get_next_task_from_queue(queue.id, None).await.unwrap();
        match next {
            NextItem::Task { item_id, .. } => assert_eq!(item_id, task_b.id),
            other => panic!("expected task b, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prefers_task_over_ticket_on_a_full_tie() {
        let (engine, store) = engine().await;
        let project = store.create_project("p", "/p", "").await.unwrap();
        let ticket = store.create_ticket(project.id, "t", "", Priority::Normal).await.unwrap();
        store.create_task(ticket.id, "a", 0).await.unwrap();
        let queue = engine.create_queue(project.id, "q", "", 2).await.unwrap();

        // Same priority, same enqueue timestamp for both the ticket and its task: ticket ids and
        // task ids come from independent AUTOINCREMENT sequences, so a numeric id comparison alone
        // would pick whichever sequence happens to be lower. The task must win regardless.
        engine.enqueue_ticket_with_all_tasks(queue.id, ticket.id, 3).await.unwrap();

        let next = engine.get_next_task_from_queue(queue.id, None).await.unwrap();
        assert!(matches!(next, NextItem::Task { .. }), "expected a task, got {next:?}");
    }

    #[tokio::test]
    async fn respects_max_parallel_items() {
        let (engine, store) = engine().await;
        let project = store.create_project("p", "/p", "").await.unwrap();
        let ticket = store.create_ticket(project.id, "t", "", Priority::Normal).await.unwrap();
        let task_a = store.create_task(ticket.id, "a", 0).await.unwrap();
        let task_b = store.create_task(ticket.id, "b", 1).await.unwrap();
        let queue = engine.create_queue(project.id, "q", "", 1).await.unwrap();

        engine.enqueue_task(ticket.id, task_a.id, queue.id, 0).await.unwrap();
        engine.enqueue_task(ticket.id, task_b.id, queue.id, 0).await.unwrap();

        let first = engine.get_next_task_from_queue(queue.id, None).await.unwrap();
        assert!(matches!(first, NextItem::Task { .. }));

        let second = engine.get_next_task_from_queue(queue.id, None).await.unwrap();
        assert!(matches!(second, NextItem::None { .. }));
    }

    #[tokio::test]
    async fn completing_an_item_frees_a_slot() {
        let (engine, store) = engine().await;
        let project = store.create_project("p", "/p", "").await.unwrap();
        let ticket = store.create_ticket(project.id, "t", "", Priority::Normal).await.unwrap();
        let task_a = store.create_task(ticket.id, "a", 0).await.unwrap();
        let task_b = store.create_task(ticket.id, "b", 1).await.unwrap();
        let queue = engine.create_queue(project.id, "q", "", 1).await.unwrap();
        engine.enqueue_task(ticket.id, task_a.id, queue.id, 0).await.unwrap();
        engine.enqueue_task(ticket.id, task_b.id, queue.id, 0).await.unwrap();

        let first = engine.get_next_task_from_queue(queue.id, None).await.unwrap();
        let first_id = match first {
            NextItem::Task { item_id, .. } => item_id,
            _ => panic!("expected a task"),
        };
        engine.complete_queue_item(ItemType::Task, first_id).await.unwrap();

        let second = engine.get_next_task_from_queue(queue.id, None).await.unwrap();
        assert!(matches!(second, NextItem::Task { .. }));
    }

    #[tokio::test]
    async fn average_processing_time_is_the_mean_of_completed_item_durations() {
        let (engine, store, clock) = engine_with_fake_clock().await;
        let project = store.create_project("p", "/p", "").await.unwrap();
        let ticket = store.create_ticket(project.id, "t", "", Priority::Normal).await.unwrap();
        let task_a = store.create_task(ticket.id, "a", 0).await.unwrap();
        let task_b = store.create_task(ticket.id, "b", 1).await.unwrap();
        let queue = engine.create_queue(project.id, "q", "", 2).await.unwrap();
        engine.enqueue_task(ticket.id, task_a.id, queue.id, 0).await.unwrap();
        engine.enqueue_task(ticket.id, task_b.id, queue.id, 0).await.unwrap();

        engine.get_next_task_from_queue(queue.id, None).await.unwrap();
        clock.advance_ms(1_000);
        engine.complete_queue_item(ItemType::Task, task_a.id).await.unwrap();

        engine.get_next_task_from_queue(queue.id, None).await.unwrap();
        clock.advance_ms(3_000);
        engine.complete_queue_item(ItemType::Task, task_b.id).await.unwrap();

        let stats = engine.get_queue_stats(queue.id).await.unwrap();
        assert_eq!(stats.average_processing_time, Some(2_000.0));
    }

    #[tokio::test]
    async fn failing_an_item_persists_the_error_message() {
        let (engine, store) = engine().await;
        let project = store.create_project("p", "/p", "").await.unwrap();
        let ticket = store.create_ticket(project.id, "t", "", Priority::Normal).await.unwrap();
        let task = store.create_task(ticket.id, "a", 0).await.unwrap();
        let queue = engine.create_queue(project.id, "q", "", 1).await.unwrap();
        engine.enqueue_task(ticket.id, task.id, queue.id, 0).await.unwrap();
        engine.get_next_task_from_queue(queue.id, None).await.unwrap();

        engine.fail_queue_item(ItemType::Task, task.id, "build step exited 1").await.unwrap();

        let stored = store.get_task(ticket.id, task.id).await.unwrap().unwrap();
        assert_eq!(stored.queue.queue_error_message.as_deref(), Some("build step exited 1"));
    }
}
