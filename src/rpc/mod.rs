//! JSON-RPC 2.0 message handling: envelope parsing, the request-vs-notification split, and the
//! method dispatch table shared by both transports.

pub mod transport_http;
pub mod transport_stdio;

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::capabilities::{Clock, IdGenerator, LlmClient};
use crate::config::env::mcp_debug_enabled;
use crate::error::{Code, CoreError, DomainError, RpcError, RpcErrorCode};
use crate::external::ExternalMcpManager;
use crate::queue::QueueEngine;
use crate::resources::ResourceProvider;
use crate::session::{Session, SessionManager, TransportKind};
use crate::store::Store;
use crate::store::models::Id;
use crate::tools::invoker::ToolInvoker;
use crate::tools::{ToolContext, ToolRegistry};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "forgebase-mcp";

/// Everything the router needs to serve a request, independent of transport.
pub struct Router {
    registry: Arc<ToolRegistry>,
    invoker: Arc<ToolInvoker>,
    sessions: Arc<SessionManager>,
    resources: Arc<ResourceProvider>,
    store: Arc<dyn Store>,
    external: Arc<ExternalMcpManager>,
    queue: Arc<QueueEngine>,
    llm: Arc<dyn LlmClient>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

/// Result of routing one JSON-RPC message. `response` is `None` for a notification — nothing is
/// ever sent back for those, success or failure.
pub struct DispatchOutcome {
    pub response: Option<Value>,
    pub session: Option<Session>,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ToolRegistry>,
        invoker: Arc<ToolInvoker>,
        sessions: Arc<SessionManager>,
        resources: Arc<ResourceProvider>,
        store: Arc<dyn Store>,
        external: Arc<ExternalMcpManager>,
        queue: Arc<QueueEngine>,
        llm: Arc<dyn LlmClient>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { registry, invoker, sessions, resources, store, external, queue, llm, clock, ids }
    }

    /// Routes one JSON-RPC message (never a batch array — transports unwrap those before calling
    /// in, one call per element, to keep per-message session/project context simple).
    pub async fn dispatch(
        &self,
        raw: Value,
        transport: TransportKind,
        active_project_id: Option<Id>,
        session_id: Option<&str>,
    ) -> DispatchOutcome {
        if mcp_debug_enabled() {
            debug!(message = %raw, "received JSON-RPC message");
        }

        let Some(obj) = raw.as_object() else {
            return DispatchOutcome { response: Some(error_response(Value::Null, RpcError::new(RpcErrorCode::InvalidRequest, "message must be a JSON object"))), session: None };
        };
        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return DispatchOutcome { response: Some(error_response(id, RpcError::new(RpcErrorCode::InvalidRequest, "jsonrpc must be \"2.0\""))), session: None };
        }
        let id = obj.get("id").cloned();
        let method = obj.get("method").and_then(Value::as_str).map(str::to_string);
        let params = obj.get("params").cloned().unwrap_or(Value::Null);

        let Some(method) = method else {
            let outcome = DispatchOutcome {
                response: id.map(|id| error_response(id, RpcError::new(RpcErrorCode::InvalidRequest, "missing `method`"))),
                session: None,
            };
            return outcome;
        };

        match id {
            None => {
                self.handle_notification(&method, params, session_id).await;
                DispatchOutcome { response: None, session: None }
            }
            Some(id) => {
                let (result, session) = self.handle_request(&method, params, transport, active_project_id, session_id).await;
                let response = match result {
                    Ok(value) => success_response(id, value),
                    Err(err) => error_response(id, err),
                };
                if mcp_debug_enabled() {
                    debug!(response = %response, "sending JSON-RPC response");
                }
                DispatchOutcome { response: Some(response), session }
            }
        }
    }

    async fn handle_notification(&self, method: &str, _params: Value, session_id: Option<&str>) {
        match method {
            "initialized" => {
                if let Some(id) = session_id {
                    self.sessions.touch(id).await;
                }
                debug!(session_id, "client completed initialization handshake");
            }
            "notifications/message" => debug!("received client log notification"),
            other => debug!(method = other, "dropping unknown notification"),
        }
    }

    async fn handle_request(
        &self,
        method: &str,
        params: Value,
        transport: TransportKind,
        active_project_id: Option<Id>,
        session_id: Option<&str>,
    ) -> (Result<Value, RpcError>, Option<Session>) {
        if method != "initialize" {
            if let Some(id) = session_id {
                self.sessions.touch(id).await;
            }
        }

        match method {
            "initialize" => {
                let capabilities = params.get("capabilities").cloned().unwrap_or(json!({}));
                let client_info = params.get("clientInfo").cloned().unwrap_or(json!({}));
                let session = self.sessions.create(transport, capabilities, client_info).await;
                info!(session_id = %session.id, transport = ?transport, "session initialized");
                let result = json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {}, "resources": {}, "prompts": {}, "logging": {} },
                    "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
                    "_meta": { "sessionId": session.id.clone() },
                });
                (Ok(result), Some(session))
            }
            "ping" => (Ok(json!({})), None),
            "tools/list" => (self.tools_list(active_project_id).await, None),
            "tools/call" => (self.tools_call(params, session_id, active_project_id).await, None),
            "resources/list" => (self.resources_list(active_project_id).await, None),
            "resources/read" => (self.resources_read(params, active_project_id).await, None),
            "prompts/list" => (self.prompts_list(active_project_id).await, None),
            "prompts/get" => (self.prompts_get(params, active_project_id).await, None),
            "logging/setLevel" => (self.logging_set_level(params), None),
            other => (Err(RpcError::new(RpcErrorCode::MethodNotFound, format!("unknown method `{other}`"))), None),
        }
    }

    async fn tools_list(&self, active_project_id: Option<Id>) -> Result<Value, RpcError> {
        let mut tools: Vec<Value> = self
            .registry
            .list()
            .into_iter()
            .map(|d| json!({ "name": d.name, "description": d.description, "inputSchema": d.input_schema }))
            .collect();

        if let Some(project_id) = active_project_id
            && let Ok(Some(project)) = self.store.get_project(project_id).await
        {
            for external_tool in self.external.list_all_tools(project_id, Some(&project.path)).await {
                tools.push(json!({
                    "name": external_tool.prefixed_name,
                    "description": external_tool.description,
                    "inputSchema": external_tool.input_schema,
                }));
            }
        }
        Ok(json!({ "tools": tools }))
    }

    async fn tools_call(&self, params: Value, session_id: Option<&str>, active_project_id: Option<Id>) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::new(RpcErrorCode::InvalidParams, "missing `name`"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let ctx = self.tool_context(session_id, active_project_id);

        match self.invoker.invoke(&ctx, name, arguments).await {
            Ok(content) => Ok(content),
            Err(CoreError::Domain(domain)) => Ok(domain.to_tool_result()),
            Err(other) => Err(RpcError::new(RpcErrorCode::InternalError, other.to_string())),
        }
    }

    async fn resources_list(&self, active_project_id: Option<Id>) -> Result<Value, RpcError> {
        let descriptors = self.resources.list(active_project_id).await.map_err(to_rpc_error)?;
        Ok(json!({ "resources": descriptors }))
    }

    async fn resources_read(&self, params: Value, active_project_id: Option<Id>) -> Result<Value, RpcError> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::new(RpcErrorCode::InvalidParams, "missing `uri`"))?;
        let content = self.resources.read(uri, active_project_id).await.map_err(to_rpc_error)?;
        Ok(json!({ "contents": [content] }))
    }

    async fn prompts_list(&self, active_project_id: Option<Id>) -> Result<Value, RpcError> {
        let prompts = self.store.list_prompts(active_project_id).await.map_err(to_rpc_error)?;
        let prompts: Vec<Value> = prompts.into_iter().map(|p| json!({ "name": p.name })).collect();
        Ok(json!({ "prompts": prompts }))
    }

    async fn prompts_get(&self, params: Value, active_project_id: Option<Id>) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::new(RpcErrorCode::InvalidParams, "missing `name`"))?;
        let prompts = self.store.list_prompts(active_project_id).await.map_err(to_rpc_error)?;
        let prompt = prompts
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| RpcError::new(RpcErrorCode::InvalidParams, format!("unknown prompt `{name}`")))?;
        Ok(json!({
            "description": prompt.name,
            "messages": [{ "role": "user", "content": { "type": "text", "text": prompt.content } }],
        }))
    }

    fn logging_set_level(&self, params: Value) -> Result<Value, RpcError> {
        let level = params
            .get("level")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::new(RpcErrorCode::InvalidParams, "missing `level`"))?;
        if !["error", "warn", "info", "debug"].contains(&level) {
            return Err(RpcError::new(RpcErrorCode::InvalidParams, format!("unsupported log level `{level}`")));
        }
        warn!(level, "client requested a log level change (not applied: filter is set at process startup)");
        Ok(json!({}))
    }

    fn tool_context(&self, session_id: Option<&str>, project_id: Option<Id>) -> ToolContext {
        ToolContext {
            store: self.store.clone(),
            queue: self.queue.clone(),
            llm: self.llm.clone(),
            external: self.external.clone(),
            resources: self.resources.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
            session_id: session_id.unwrap_or("unbound").to_string(),
            project_id,
        }
    }
}

fn to_rpc_error(err: CoreError) -> RpcError {
    match err {
        CoreError::Domain(DomainError { code: Code::InvalidParams, message, .. }) => RpcError::new(RpcErrorCode::InvalidParams, message),
        other => RpcError::new(RpcErrorCode::InternalError, other.into_domain().message),
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::llm::FakeLlmClient;
    use crate::capabilities::{MonotonicIdGenerator, SystemClock};
    use crate::session::SessionManager;
    use crate::store::SqliteStore;
    use crate::tools::invoker::ToolInvoker;

    async fn router() -> Router {
        let pool = crate::store::sqlite::test_pool().await;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let llm: Arc<dyn LlmClient> = Arc::new(FakeLlmClient);
        let external = Arc::new(ExternalMcpManager::new());
        let queue = Arc::new(QueueEngine::new(store.clone(), clock.clone()));
        let resources = Arc::new(ResourceProvider::new(store.clone(), llm.clone(), external.clone()));
        let registry = Arc::new(ToolRegistry::builtin());
        let invoker = Arc::new(ToolInvoker::new(registry.clone(), store.clone(), external.clone()));
        let sessions = Arc::new(SessionManager::new(clock.clone(), 1800, 3600));
        let ids = Arc::new(MonotonicIdGenerator::new());
        Router::new(registry, invoker, sessions, resources, store, external, queue, llm, clock, ids)
    }

    #[tokio::test]
    async fn initialize_then_list_tools() {
        let router = router().await;
        let init = router
            .dispatch(json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": { "capabilities": {}, "clientInfo": { "name": "t" } } }), TransportKind::Http, None, None)
            .await;
        let response = init.response.unwrap();
        assert!(response["result"]["serverInfo"]["name"].is_string());
        let session_id = response["result"]["_meta"]["sessionId"].as_str().unwrap().to_string();

        let list = router.dispatch(json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }), TransportKind::Http, None, Some(&session_id)).await;
        let response = list.response.unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 17);
        assert!(tools.iter().any(|t| t["name"] == "project_manager"));
    }

    #[tokio::test]
    async fn unknown_method_is_wire_level_error() {
        let router = router().await;
        let outcome = router.dispatch(json!({ "jsonrpc": "2.0", "id": 1, "method": "bogus/method" }), TransportKind::Http, None, None).await;
        let response = outcome.response.unwrap();
        assert_eq!(response["error"]["code"], RpcErrorCode::MethodNotFound.code());
    }

    #[tokio::test]
    async fn notification_produces_no_response() {
        let router = router().await;
        let outcome = router.dispatch(json!({ "jsonrpc": "2.0", "method": "initialized" }), TransportKind::Http, None, None).await;
        assert!(outcome.response.is_none());
    }

    #[tokio::test]
    async fn tool_call_with_missing_field_is_a_successful_rpc_result_with_is_error() {
        let router = router().await;
        let outcome = router
            .dispatch(
                json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": { "name": "project_manager", "arguments": { "action": "create", "data": {} } } }),
                TransportKind::Http,
                None,
                None,
            )
            .await;
        let response = outcome.response.unwrap();
        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], true);
    }
}
