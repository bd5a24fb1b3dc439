//! Per-connection session state: creation on `initialize`, activity tracking on every bound
//! request, and TTL-based eviction that differs by transport (stdio sessions live shorter than
//! HTTP ones since a stdio client that vanishes leaves no socket to notice).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::capabilities::Clock;
use crate::store::models::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Http,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub transport: TransportKind,
    pub project_id: Option<Id>,
    pub created_at: i64,
    pub last_activity: i64,
    pub capabilities: Value,
    pub client_info: Value,
}

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
    ttl_stdio_secs: i64,
    ttl_http_secs: i64,
}

impl SessionManager {
    pub fn new(clock: Arc<dyn Clock>, ttl_stdio_secs: i64, ttl_http_secs: i64) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), clock, ttl_stdio_secs, ttl_http_secs }
    }

    pub async fn create(&self, transport: TransportKind, capabilities: Value, client_info: Value) -> Session {
        let now = self.clock.now_ms();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            transport,
            project_id: None,
            created_at: now,
            last_activity: now,
            capabilities,
            client_info,
        };
        self.sessions.write().await.insert(session.id.clone(), session.clone());
        session
    }

    pub async fn touch(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        session.last_activity = self.clock.now_ms();
        Some(session.clone())
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn bind_project(&self, id: &str, project_id: Id) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.project_id = Some(project_id);
        }
    }

    pub async fn remove(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn ttl_secs_for(&self, transport: TransportKind) -> i64 {
        match transport {
            TransportKind::Stdio => self.ttl_stdio_secs,
            TransportKind::Http => self.ttl_http_secs,
        }
    }

    /// Removes sessions idle past their transport's TTL. Returns the number evicted.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            let ttl_ms = self.ttl_secs_for(session.transport) * 1000;
            now - session.last_activity < ttl_ms
        });
        before - sessions.len()
    }
}

/// Spawns the 5-minute eviction sweep. The returned handle is aborted on shutdown.
pub fn spawn_sweeper(manager: Arc<SessionManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let evicted = manager.sweep().await;
            if evicted > 0 {
                tracing::debug!(evicted, "swept idle sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::FakeClock;
    use serde_json::json;

    #[tokio::test]
    async fn sweep_evicts_only_past_ttl() {
        let clock = Arc::new(FakeClock::new(0));
        let manager = SessionManager::new(clock.clone(), 10, 100);
        let stdio = manager.create(TransportKind::Stdio, json!({}), json!({})).await;
        let http = manager.create(TransportKind::Http, json!({}), json!({})).await;

        clock.advance_ms(15_000);
        let evicted = manager.sweep().await;
        assert_eq!(evicted, 1);
        assert!(manager.get(&stdio.id).await.is_none());
        assert!(manager.get(&http.id).await.is_some());
    }

    #[tokio::test]
    async fn touch_extends_activity() {
        let clock = Arc::new(FakeClock::new(0));
        let manager = SessionManager::new(clock.clone(), 10, 100);
        let session = manager.create(TransportKind::Stdio, json!({}), json!({})).await;
        clock.advance_ms(5_000);
        manager.touch(&session.id).await;
        clock.advance_ms(8_000);
        assert_eq!(manager.sweep().await, 0);
    }
}
