//! Outbound connections to external MCP servers declared per-project in `.mcp.json`.
//!
//! Connections are established lazily on first use, one per `(project, server name)` pair, and
//! cached for the life of the process. A per-server connection guard (a `Notify` keyed by server
//! name) ensures concurrent first-use callers coordinate instead of racing to spawn duplicate
//! child processes or HTTP sessions. A failing server is isolated: its tools/resources contribute
//! nothing, and the failure is logged, never surfaced as a top-level error.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use rmcp::model::{CallToolRequestParams, ClientInfo, ReadResourceRequestParams};
use rmcp::service::{Peer, RunningService};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::{RoleClient, serve_client};
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

use crate::error::{CoreError, DomainError};
use crate::store::models::Id;

#[derive(Deserialize, Default)]
struct McpJsonRoot {
    #[serde(rename = "mcpServers", default)]
    mcp_servers: HashMap<String, ServerEntry>,
}

#[derive(Deserialize)]
struct ServerEntry {
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    cwd: Option<String>,
    url: Option<String>,
    bearer_token_env_var: Option<String>,
}

impl ServerEntry {
    fn into_transport(self) -> Option<ServerTransport> {
        if let Some(command) = self.command {
            Some(ServerTransport::Stdio { command, args: self.args, env: self.env, cwd: self.cwd })
        } else {
            self.url.map(|url| ServerTransport::Http { url, bearer_token_env_var: self.bearer_token_env_var })
        }
    }
}

#[derive(Debug, Clone)]
enum ServerTransport {
    Stdio { command: String, args: Vec<String>, env: HashMap<String, String>, cwd: Option<String> },
    Http { url: String, bearer_token_env_var: Option<String> },
}

#[derive(Debug, Clone)]
struct ServerConfig {
    name: String,
    transport: ServerTransport,
}

fn load_configs(project_path: Option<&str>) -> Vec<ServerConfig> {
    let mut configs = Vec::new();
    let mut seen = HashSet::new();
    if let Some(path) = project_path {
        try_load(&Path::new(path).join(".mcp.json"), &mut configs, &mut seen);
    }
    if let Some(home) = dirs::home_dir() {
        try_load(&home.join(".claude/mcp.json"), &mut configs, &mut seen);
    }
    configs
}

fn try_load(path: &Path, configs: &mut Vec<ServerConfig>, seen: &mut HashSet<String>) {
    let Ok(content) = std::fs::read_to_string(path) else { return };
    let Ok(root) = serde_json::from_str::<McpJsonRoot>(&content) else { return };
    for (name, entry) in root.mcp_servers {
        if seen.contains(&name) {
            continue;
        }
        if let Some(transport) = entry.into_transport() {
            seen.insert(name.clone());
            configs.push(ServerConfig { name, transport });
        }
    }
}

struct ConnectedServer {
    peer: Peer<RoleClient>,
    tools: Vec<rmcp::model::Tool>,
    resources: Vec<rmcp::model::Resource>,
    _service: RunningService<RoleClient, ClientInfo>,
}

pub struct ExternalTool {
    pub prefixed_name: String,
    pub server: String,
    pub description: String,
    pub input_schema: Value,
}

pub struct ExternalResource {
    pub prefixed_uri: String,
    pub server: String,
    pub name: String,
}

struct ProjectClients {
    configs: Vec<ServerConfig>,
    clients: RwLock<HashMap<String, ConnectedServer>>,
    connecting: Mutex<HashMap<String, Arc<Notify>>>,
}

impl ProjectClients {
    fn new(project_path: Option<&str>) -> Self {
        let configs = load_configs(project_path);
        if !configs.is_empty() {
            debug!(count = configs.len(), "loaded external MCP server configs");
        }
        Self { configs, clients: RwLock::new(HashMap::new()), connecting: Mutex::new(HashMap::new()) }
    }

    async fn ensure_connected(&self, server_name: &str) -> Result<(), String> {
        if self.clients.read().await.contains_key(server_name) {
            return Ok(());
        }
        {
            let mut connecting = self.connecting.lock().await;
            if let Some(notify) = connecting.get(server_name) {
                let notify = notify.clone();
                drop(connecting);
                let timeout = tokio::time::timeout(std::time::Duration::from_secs(10), notify.notified());
                if timeout.await.is_err() {
                    return Err(format!("timed out waiting for concurrent connection to '{server_name}'"));
                }
                return if self.clients.read().await.contains_key(server_name) {
                    Ok(())
                } else {
                    Err(format!("concurrent connection to '{server_name}' failed"))
                };
            }
            connecting.insert(server_name.to_string(), Arc::new(Notify::new()));
        }

        if self.clients.read().await.contains_key(server_name) {
            self.connecting.lock().await.remove(server_name);
            return Ok(());
        }

        let result = self.do_connect(server_name).await;
        if let Some(notify) = self.connecting.lock().await.remove(server_name) {
            notify.notify_waiters();
        }
        result
    }

    async fn do_connect(&self, server_name: &str) -> Result<(), String> {
        let config = self
            .configs
            .iter()
            .find(|c| c.name == server_name)
            .ok_or_else(|| format!("external MCP server '{server_name}' not configured"))?
            .clone();

        let client_info = ClientInfo {
            meta: None,
            protocol_version: Default::default(),
            capabilities: Default::default(),
            client_info: rmcp::model::Implementation {
                name: "forgebase-mcp".into(),
                title: Some("forgebase-mcp external client".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
        };

        let service = match &config.transport {
            ServerTransport::Stdio { command, args, env, cwd } => {
                warn!(server = %server_name, command = %command, "spawning external MCP server process");
                let mut cmd = Command::new(command);
                cmd.args(args);
                if let Some(cwd) = cwd {
                    cmd.current_dir(cwd);
                }
                for (k, v) in env {
                    cmd.env(k, v);
                }
                cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::null());
                let transport = TokioChildProcess::new(cmd)
                    .map_err(|e| format!("failed to spawn '{server_name}': {e}"))?;
                serve_client(client_info, transport)
                    .await
                    .map_err(|e| format!("failed to initialize client for '{server_name}': {e}"))?
            }
            ServerTransport::Http { url, bearer_token_env_var } => {
                info!(server = %server_name, url = %url, "connecting to external MCP HTTP server");
                let token = bearer_token_env_var.as_ref().and_then(|v| std::env::var(v).ok());
                let mut cfg = StreamableHttpClientTransportConfig::with_uri(url.as_str());
                if let Some(token) = token {
                    cfg = cfg.auth_header(token);
                }
                let transport = StreamableHttpClientTransport::from_config(cfg);
                serve_client(client_info, transport)
                    .await
                    .map_err(|e| format!("failed to initialize HTTP client for '{server_name}': {e}"))?
            }
        };

        let peer = service.peer().clone();
        let tools = peer.list_all_tools().await.map_err(|e| format!("failed to list tools from '{server_name}': {e}"))?;
        let resources =
            peer.list_all_resources().await.map_err(|e| format!("failed to list resources from '{server_name}': {e}")).unwrap_or_default();

        info!(server = %server_name, tool_count = tools.len(), "connected to external MCP server");
        self.clients.write().await.insert(server_name.to_string(), ConnectedServer { peer, tools, resources, _service: service });
        Ok(())
    }

    async fn all_tools(&self) -> Vec<ExternalTool> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for config in &self.configs {
            if let Err(e) = self.ensure_connected(&config.name).await {
                warn!(server = %config.name, error = %e, "external MCP server unavailable");
                continue;
            }
            let clients = self.clients.read().await;
            if let Some(server) = clients.get(&config.name) {
                for tool in &server.tools {
                    if seen.insert(tool.name.to_string()) {
                        out.push(ExternalTool {
                            prefixed_name: format!("external_{}", tool.name),
                            server: config.name.clone(),
                            description: tool.description.as_deref().unwrap_or("").to_string(),
                            input_schema: serde_json::to_value(&tool.input_schema).unwrap_or(Value::Null),
                        });
                    }
                }
            }
        }
        out
    }

    async fn all_resources(&self) -> Vec<ExternalResource> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for config in &self.configs {
            if self.ensure_connected(&config.name).await.is_err() {
                continue;
            }
            let clients = self.clients.read().await;
            if let Some(server) = clients.get(&config.name) {
                for resource in &server.resources {
                    let uri = resource.raw.uri.to_string();
                    if seen.insert(uri.clone()) {
                        out.push(ExternalResource {
                            // Server name embedded so a later read can route back without a
                            // separate lookup table; still opaque to the calling client.
                            prefixed_uri: format!("external://{}::{uri}", config.name),
                            server: config.name.clone(),
                            name: resource.raw.name.to_string(),
                        });
                    }
                }
            }
        }
        out
    }

    async fn execute_tool(&self, server_name: &str, tool_name: &str, args: Value) -> Result<String, String> {
        self.ensure_connected(server_name).await?;
        let clients = self.clients.read().await;
        let server = clients.get(server_name).ok_or_else(|| format!("server '{server_name}' not connected"))?;
        let arguments = match args {
            Value::Object(map) => Some(map),
            _ => None,
        };
        let result = server
            .peer
            .call_tool(CallToolRequestParams { meta: None, name: tool_name.to_string().into(), arguments, task: None })
            .await
            .map_err(|e| format!("external tool call failed: {e}"))?;
        let text: String = result.content.iter().filter_map(|c| c.as_text().map(|t| t.text.to_string())).collect::<Vec<_>>().join("\n");
        Ok(text)
    }

    async fn read_resource(&self, server_name: &str, uri: &str) -> Result<String, String> {
        self.ensure_connected(server_name).await?;
        let clients = self.clients.read().await;
        let server = clients.get(server_name).ok_or_else(|| format!("server '{server_name}' not connected"))?;
        let result = server
            .peer
            .read_resource(ReadResourceRequestParams { uri: uri.to_string(), meta: None })
            .await
            .map_err(|e| format!("external resource read failed: {e}"))?;
        let text = result
            .contents
            .into_iter()
            .filter_map(|c| match c {
                rmcp::model::ResourceContents::TextResourceContents { text, .. } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text)
    }
}

/// Top-level manager; one lazily-built [`ProjectClients`] set per project.
pub struct ExternalMcpManager {
    projects: RwLock<HashMap<Id, Arc<ProjectClients>>>,
}

impl ExternalMcpManager {
    pub fn new() -> Self {
        Self { projects: RwLock::new(HashMap::new()) }
    }

    async fn project_clients(&self, project_id: Id, project_path: Option<&str>) -> Arc<ProjectClients> {
        if let Some(existing) = self.projects.read().await.get(&project_id) {
            return existing.clone();
        }
        let mut projects = self.projects.write().await;
        projects
            .entry(project_id)
            .or_insert_with(|| Arc::new(ProjectClients::new(project_path)))
            .clone()
    }

    pub async fn list_all_tools(&self, project_id: Id, project_path: Option<&str>) -> Vec<ExternalTool> {
        self.project_clients(project_id, project_path).await.all_tools().await
    }

    pub async fn list_all_resources(&self, project_id: Id, project_path: Option<&str>) -> Vec<ExternalResource> {
        self.project_clients(project_id, project_path).await.all_resources().await
    }

    pub async fn execute_tool(
        &self,
        project_id: Id,
        project_path: Option<&str>,
        server_name: &str,
        tool_name: &str,
        args: Value,
    ) -> crate::error::Result<String> {
        let clients = self.project_clients(project_id, project_path).await;
        clients
            .execute_tool(server_name, tool_name, args)
            .await
            .map_err(|e| CoreError::Domain(DomainError::service(e)))
    }

    pub async fn read_resource(
        &self,
        project_id: Id,
        project_path: Option<&str>,
        server_name: &str,
        uri: &str,
    ) -> crate::error::Result<String> {
        let clients = self.project_clients(project_id, project_path).await;
        clients.read_resource(server_name, uri).await.map_err(|e| CoreError::Domain(DomainError::service(e)))
    }
}

impl Default for ExternalMcpManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits an `external://{server}::{uri}` string produced by [`ExternalMcpManager::list_all_resources`]
/// back into its server name and original resource uri.
pub fn parse_external_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("external://")?;
    rest.split_once("::")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stdio_and_http_entries() {
        let json = r#"{
            "mcpServers": {
                "context7": { "command": "npx", "args": ["-y", "@context7/mcp"] },
                "remote": { "url": "https://example.com/mcp", "bearer_token_env_var": "REMOTE_TOKEN" }
            }
        }"#;
        let root: McpJsonRoot = serde_json::from_str(json).unwrap();
        let mut configs = Vec::new();
        let mut seen = HashSet::new();
        for (name, entry) in root.mcp_servers {
            if let Some(transport) = entry.into_transport() {
                seen.insert(name.clone());
                configs.push(ServerConfig { name, transport });
            }
        }
        assert_eq!(configs.len(), 2);
    }
}
