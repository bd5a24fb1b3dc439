//! AI-assisted operations as a collaborator interface. The protocol surface never talks to an
//! LLM provider directly; tool handlers that need suggestions or summaries go through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::Result;
use crate::store::models::Id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSuggestion {
    pub file_id: Id,
    pub path: String,
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSuggestion {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn suggest_files(&self, project_id: Id, prompt: &str, limit: usize) -> Result<Vec<FileSuggestion>>;
    async fn suggest_tasks(&self, ticket_id: Id, context: Option<&str>) -> Result<Vec<TaskSuggestion>>;
    async fn auto_generate_tasks(&self, ticket_id: Id) -> Result<Vec<TaskSuggestion>>;
    async fn optimize_user_input(&self, project_id: Id, prompt: &str) -> Result<String>;
    async fn compact_summary(&self, project_id: Id, options: Value) -> Result<String>;
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn create_shared_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(10)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// HTTP-backed default implementation. Talks to an OpenAI-compatible chat completion endpoint;
/// configured base URL and key come from [`crate::config::Config`].
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { client: create_shared_client(), base_url: base_url.into(), api_key }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let mut req = self.client.post(format!("{}/chat/completions", self.base_url)).json(&serde_json::json!({
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| crate::error::DomainError::service(format!("LLM request failed: {e}")))?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| crate::error::DomainError::service(format!("LLM response was not JSON: {e}")))?;
        Ok(body["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn suggest_files(&self, _project_id: Id, prompt: &str, limit: usize) -> Result<Vec<FileSuggestion>> {
        let text = self
            .complete(
                "Suggest relevant files as a JSON array of {fileId, path, relevance}.",
                prompt,
            )
            .await?;
        let parsed: Vec<FileSuggestion> = serde_json::from_str(&text).unwrap_or_default();
        Ok(parsed.into_iter().take(limit).collect())
    }

    async fn suggest_tasks(&self, _ticket_id: Id, context: Option<&str>) -> Result<Vec<TaskSuggestion>> {
        let text = self
            .complete(
                "Suggest tasks for this ticket as a JSON array of {content, description, estimatedHours}.",
                context.unwrap_or(""),
            )
            .await?;
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }

    async fn auto_generate_tasks(&self, ticket_id: Id) -> Result<Vec<TaskSuggestion>> {
        self.suggest_tasks(ticket_id, None).await
    }

    async fn optimize_user_input(&self, _project_id: Id, prompt: &str) -> Result<String> {
        self.complete("Rewrite this prompt to be clearer and more specific.", prompt).await
    }

    async fn compact_summary(&self, _project_id: Id, options: Value) -> Result<String> {
        self.complete(
            "Produce a compact project summary given the attached file listing.",
            &options.to_string(),
        )
        .await
    }
}

#[cfg(test)]
pub struct FakeLlmClient;

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn suggest_files(&self, _project_id: Id, _prompt: &str, limit: usize) -> Result<Vec<FileSuggestion>> {
        Ok((0..limit as i64)
            .map(|i| FileSuggestion { file_id: i, path: format!("file_{i}.rs"), relevance: 1.0 })
            .collect())
    }

    async fn suggest_tasks(&self, _ticket_id: Id, _context: Option<&str>) -> Result<Vec<TaskSuggestion>> {
        Ok(vec![TaskSuggestion { content: "fake task".into(), description: None, estimated_hours: None }])
    }

    async fn auto_generate_tasks(&self, ticket_id: Id) -> Result<Vec<TaskSuggestion>> {
        self.suggest_tasks(ticket_id, None).await
    }

    async fn optimize_user_input(&self, _project_id: Id, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }

    async fn compact_summary(&self, _project_id: Id, _options: Value) -> Result<String> {
        Ok("fake summary".to_string())
    }
}
