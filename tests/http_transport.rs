//! Drives the HTTP/SSE transport end to end through `tower::ServiceExt::oneshot`, without binding
//! a real socket. Covers what the router's own unit tests can't: header plumbing, batch arrays,
//! and the SSE welcome frame.

use std::sync::Arc;

use forgebase_mcp::capabilities::{Clock, IdGenerator, LlmClient, MonotonicIdGenerator, SystemClock};
use forgebase_mcp::external::ExternalMcpManager;
use forgebase_mcp::queue::QueueEngine;
use forgebase_mcp::resources::ResourceProvider;
use forgebase_mcp::rpc::Router;
use forgebase_mcp::rpc::transport_http;
use forgebase_mcp::session::SessionManager;
use forgebase_mcp::store::pool::Pool;
use forgebase_mcp::store::{SqliteStore, Store};
use forgebase_mcp::tools::ToolRegistry;
use forgebase_mcp::tools::invoker::ToolInvoker;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn app() -> axum::Router {
    let pool = Pool::open_in_memory().expect("open in-memory pool");
    pool.migrate().await.expect("migrate");
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(MonotonicIdGenerator::new());
    // No LLM-backed tool action is exercised by these tests, so an unreachable base URL is fine.
    let llm: Arc<dyn LlmClient> = Arc::new(forgebase_mcp::capabilities::HttpLlmClient::new("http://127.0.0.1:1", None));
    let external = Arc::new(ExternalMcpManager::new());
    let queue = Arc::new(QueueEngine::new(store.clone(), clock.clone()));
    let resources = Arc::new(ResourceProvider::new(store.clone(), llm.clone(), external.clone()));
    let registry = Arc::new(ToolRegistry::builtin());
    let invoker = Arc::new(ToolInvoker::new(registry.clone(), store.clone(), external.clone()));
    let sessions = Arc::new(SessionManager::new(clock.clone(), 1800, 3600));
    let router = Arc::new(Router::new(registry, invoker, sessions, resources, store, external, queue, llm, clock, ids));
    transport_http::build(router)
}

async fn post(app: &axum::Router, body: Value) -> (StatusCode, Option<String>, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let session_header = response.headers().get("mcp-session-id").and_then(|v| v.to_str().ok()).map(str::to_string);
    if status == StatusCode::NO_CONTENT {
        return (status, session_header, Value::Null);
    }
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let parsed = serde_json::from_slice(&bytes).unwrap();
    (status, session_header, parsed)
}

#[tokio::test]
async fn initialize_sets_session_header_and_strips_meta() {
    let app = app().await;
    let (status, session_header, body) = post(
        &app,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": { "capabilities": {}, "clientInfo": { "name": "t" } } }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let session_header = session_header.expect("Mcp-Session-Id header present");
    assert!(body["result"]["serverInfo"]["name"].is_string());
    assert!(body["result"].get("_meta").is_none(), "_meta is stripped from the HTTP body once the header carries the session id");
    assert!(!session_header.is_empty());
}

#[tokio::test]
async fn batch_array_returns_array_of_responses() {
    let app = app().await;
    let (_, _, init_body) = post(&app, json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": { "capabilities": {}, "clientInfo": { "name": "t" } } })).await;
    let session_id = init_body["result"]["_meta"]["sessionId"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .header("mcp-session-id", &session_id)
        .body(Body::from(json!([{ "jsonrpc": "2.0", "id": 2, "method": "ping" }, { "jsonrpc": "2.0", "id": 3, "method": "tools/list" }]).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let responses = body.as_array().expect("batch reply is a JSON array");
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], 2);
    assert_eq!(responses[1]["id"], 3);
}

#[tokio::test]
async fn notification_only_batch_yields_no_content() {
    let app = app().await;
    let (status, _, _) = post(&app, json!({ "jsonrpc": "2.0", "method": "ping" })).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn sse_endpoint_emits_welcome_event() {
    let app = app().await;
    let request = Request::builder().method("GET").uri("/mcp").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    let data_line = text.lines().find(|l| l.starts_with("data:")).expect("a data: line in the SSE stream");
    let welcome: Value = serde_json::from_str(data_line.trim_start_matches("data:").trim()).unwrap();
    assert_eq!(welcome["jsonrpc"], "2.0");
    assert_eq!(welcome["id"], "welcome");
    assert!(welcome["result"]["sessionId"].is_string());
}

#[tokio::test]
async fn malformed_json_body_yields_parse_error() {
    let app = app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not valid json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn project_scoped_path_is_accepted() {
    let app = app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/mcp/projects/7")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
