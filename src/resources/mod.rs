//! URI-addressed content: project listings, file contents, and cached project summaries under
//! `promptliano://`, plus transparent proxying of `external://` resources.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::capabilities::LlmClient;
use crate::error::{Code, CoreError, DomainError, Result};
use crate::external::{self, ExternalMcpManager};
use crate::store::Store;
use crate::store::models::Id;

const SUMMARY_CACHE_TTL: Duration = Duration::from_secs(600);
const MAX_ACTIVE_PROJECT_FILES: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub text: String,
}

fn mime_for(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "json" => "application/json",
        "md" => "text/markdown",
        "js" | "ts" | "jsx" | "tsx" => "text/javascript",
        _ => "text/plain",
    }
}

pub struct ResourceProvider {
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmClient>,
    external: Arc<ExternalMcpManager>,
    // Keyed by `{projectId}:{fingerprint}`, where the fingerprint folds in the fileset, so a
    // `create_file`/`update_file_content`/`delete_file` call invalidates early for free: it
    // changes the fingerprint, which changes the key, which makes the old entry unreachable.
    summary_cache: moka::future::Cache<String, Arc<String>>,
}

impl ResourceProvider {
    pub fn new(store: Arc<dyn Store>, llm: Arc<dyn LlmClient>, external: Arc<ExternalMcpManager>) -> Self {
        let summary_cache = moka::future::Cache::builder().time_to_live(SUMMARY_CACHE_TTL).max_capacity(256).build();
        Self { store, llm, external, summary_cache }
    }

    pub async fn list(&self, active_project_id: Option<Id>) -> Result<Vec<ResourceDescriptor>> {
        let projects = self.store.list_projects().await?;
        let mut out = vec![ResourceDescriptor {
            uri: "promptliano://projects".to_string(),
            name: "All projects".to_string(),
            mime_type: "application/json".to_string(),
        }];
        for project in &projects {
            out.push(ResourceDescriptor {
                uri: format!("promptliano://projects/{}/summary", project.id),
                name: format!("{} summary", project.name),
                mime_type: "text/plain".to_string(),
            });
            out.push(ResourceDescriptor {
                uri: format!("promptliano://projects/{}/files", project.id),
                name: format!("{} files", project.name),
                mime_type: "application/json".to_string(),
            });
        }
        if let Some(project_id) = active_project_id {
            let files = self.store.list_files(project_id).await?;
            for file in files.into_iter().take(MAX_ACTIVE_PROJECT_FILES) {
                out.push(ResourceDescriptor {
                    uri: format!("promptliano://projects/{project_id}/files/{}", file.id),
                    name: file.path,
                    mime_type: mime_for(&file.extension).to_string(),
                });
            }
        }
        Ok(out)
    }

    pub async fn read(&self, uri: &str, active_project_id: Option<Id>) -> Result<ResourceContent> {
        if let Some((server, inner_uri)) = external::parse_external_uri(uri) {
            let project_id = active_project_id
                .ok_or_else(|| DomainError::new(Code::InvalidParams, "external resource reads require an active project"))?;
            let project = self.project_or_not_found(project_id).await?;
            let text = self.external.read_resource(project_id, Some(&project.path), server, inner_uri).await?;
            return Ok(ResourceContent { uri: uri.to_string(), mime_type: "text/plain".to_string(), text });
        }

        let path = uri
            .strip_prefix("promptliano://")
            .ok_or_else(|| DomainError::new(Code::InvalidParams, format!("unsupported resource scheme in `{uri}`")))?;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            ["projects"] => {
                let projects = self.store.list_projects().await?;
                Ok(ResourceContent {
                    uri: uri.to_string(),
                    mime_type: "application/json".to_string(),
                    text: serde_json::to_string(&projects).unwrap_or_default(),
                })
            }
            ["projects", id, "summary"] => {
                let project_id = parse_id(id)?;
                let text = self.summary(project_id).await?;
                Ok(ResourceContent { uri: uri.to_string(), mime_type: "text/plain".to_string(), text })
            }
            ["projects", id, "files"] => {
                let project_id = parse_id(id)?;
                let files = self.store.list_files(project_id).await?;
                Ok(ResourceContent {
                    uri: uri.to_string(),
                    mime_type: "application/json".to_string(),
                    text: serde_json::to_string(&files).unwrap_or_default(),
                })
            }
            ["projects", id, "files", file_id] => {
                let project_id = parse_id(id)?;
                let file_id = parse_id(file_id)?;
                let file = self
                    .store
                    .get_file(project_id, file_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found(Code::FileNotFound, "file", file_id))?;
                Ok(ResourceContent { uri: uri.to_string(), mime_type: mime_for(&file.path).to_string(), text: file.content })
            }
            ["projects", id, "suggest-files"] => {
                let _ = parse_id(id)?;
                Ok(ResourceContent {
                    uri: uri.to_string(),
                    mime_type: "application/json".to_string(),
                    text: json!({
                        "message": "use the suggest_files tool action on project_manager to get ranked file suggestions",
                    })
                    .to_string(),
                })
            }
            _ => Err(CoreError::Domain(DomainError::new(Code::InvalidParams, format!("unrecognized resource path `{path}`")))),
        }
    }

    async fn summary(&self, project_id: Id) -> Result<String> {
        self.project_or_not_found(project_id).await?;
        let options = Value::Null;
        let fingerprint = self.fingerprint(project_id, &options).await?;
        let cache_key = format!("{project_id}:{fingerprint}");
        if let Some(cached) = self.summary_cache.get(&cache_key).await {
            return Ok((*cached).clone());
        }
        let summary = self.llm.compact_summary(project_id, options).await?;
        self.summary_cache.insert(cache_key, Arc::new(summary.clone())).await;
        Ok(summary)
    }

    async fn fingerprint(&self, project_id: Id, options: &Value) -> Result<String> {
        let files = self.store.list_files(project_id).await?;
        let mut pairs: Vec<(String, i64)> = files.into_iter().map(|f| (f.path, f.size)).collect();
        pairs.sort();
        let mut hasher = Sha256::new();
        for (path, size) in &pairs {
            hasher.update(path.as_bytes());
            hasher.update(size.to_le_bytes());
        }
        hasher.update(options.to_string().as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    async fn project_or_not_found(&self, project_id: Id) -> Result<crate::store::models::Project> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or_else(|| CoreError::Domain(DomainError::not_found(Code::ProjectNotFound, "project", project_id)))
    }
}

fn parse_id(raw: &str) -> Result<Id> {
    raw.parse::<Id>()
        .map_err(|_| CoreError::Domain(DomainError::new(Code::InvalidParams, format!("`{raw}` is not a valid id"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::llm::FakeLlmClient;
    use crate::store::SqliteStore;

    async fn provider() -> (ResourceProvider, Arc<dyn Store>) {
        let pool = crate::store::sqlite::test_pool().await;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let provider = ResourceProvider::new(store.clone(), Arc::new(FakeLlmClient), Arc::new(ExternalMcpManager::new()));
        (provider, store)
    }

    #[tokio::test]
    async fn reads_file_content_with_inferred_mime() {
        let (provider, store) = provider().await;
        let project = store.create_project("p", "/p", "").await.unwrap();
        let file = store.create_file(project.id, "src/index.ts", "export {}").await.unwrap();
        let content = provider.read(&format!("promptliano://projects/{}/files/{}", project.id, file.id), None).await.unwrap();
        assert_eq!(content.mime_type, "text/javascript");
        assert_eq!(content.text, "export {}");
    }

    #[tokio::test]
    async fn unknown_path_is_invalid_params() {
        let (provider, _store) = provider().await;
        let err = provider.read("promptliano://bogus", None).await.unwrap_err();
        match err {
            CoreError::Domain(d) => assert_eq!(d.code, Code::InvalidParams),
            other => panic!("expected domain error, got {other:?}"),
        }
    }
}
