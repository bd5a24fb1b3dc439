//! HTTP/SSE transport: `POST` carries JSON-RPC calls, `GET` opens an event stream, `OPTIONS` is
//! answered by the CORS layer. Both are mounted at `/mcp` and `/mcp/projects/{projectId}`, the
//! path segment binding the call's active project for the duration of that request.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router as AxumRouter};
use futures::stream::{self, Stream};
use moka::sync::Cache;
use serde_json::Value;
use tokio::sync::Semaphore;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::Router;
use crate::error::{RpcError, RpcErrorCode};
use crate::session::TransportKind;
use crate::store::models::Id;

const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Per-session cap on requests being served at once, independent of transport concurrency —
/// a misbehaving client opening many tabs on one session shouldn't starve the pool.
const MAX_IN_FLIGHT_PER_SESSION: usize = 16;

#[derive(Clone)]
struct AppState {
    router: Arc<Router>,
    in_flight: Cache<String, Arc<Semaphore>>,
}

pub fn build(router: Arc<Router>) -> AxumRouter {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("mcp-session-id")]);

    let state = AppState {
        router,
        in_flight: Cache::builder().time_to_idle(Duration::from_secs(3600)).max_capacity(10_000).build(),
    };

    AxumRouter::new()
        .route("/mcp", get(handle_get).post(handle_post))
        .route("/mcp/projects/{project_id}", get(handle_get_scoped).post(handle_post_scoped))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_post(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    handle_post_inner(state, headers, body, None).await
}

async fn handle_post_scoped(
    State(state): State<AppState>,
    Path(project_id): Path<Id>,
    headers: HeaderMap,
    body: String,
) -> Response {
    handle_post_inner(state, headers, body, Some(project_id)).await
}

async fn handle_post_inner(state: AppState, headers: HeaderMap, body: String, project_id: Option<Id>) -> Response {
    let session_id = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string);
    let router = state.router;

    let body: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            let error = RpcError::new(RpcErrorCode::ParseError, format!("invalid JSON: {e}"));
            return Json(serde_json::json!({ "jsonrpc": "2.0", "id": Value::Null, "error": error })).into_response();
        }
    };

    let _permit = match &session_id {
        Some(sid) => {
            let semaphore = state.in_flight.get_with(sid.clone(), || Arc::new(Semaphore::new(MAX_IN_FLIGHT_PER_SESSION)));
            match semaphore.try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    let error = RpcError::new(RpcErrorCode::InternalError, "too many in-flight requests");
                    return Json(serde_json::json!({ "jsonrpc": "2.0", "id": Value::Null, "error": error })).into_response();
                }
            }
        }
        None => None,
    };

    let messages: Vec<Value> = match &body {
        Value::Array(items) => items.clone(),
        single => vec![single.clone()],
    };

    let mut responses = Vec::new();
    let mut response_session_id = None;
    for message in messages {
        let outcome = router.dispatch(message, TransportKind::Http, project_id, session_id.as_deref()).await;
        if let Some(session) = outcome.session {
            response_session_id = Some(session.id);
        }
        if let Some(mut response) = outcome.response {
            if let Some(obj) = response.as_object_mut()
                && let Some(result) = obj.get_mut("result")
                && let Some(result_obj) = result.as_object_mut()
            {
                result_obj.remove("_meta");
            }
            responses.push(response);
        }
    }

    let body = match responses.len() {
        0 => return StatusCode::NO_CONTENT.into_response(),
        1 => responses.into_iter().next().unwrap(),
        _ => Value::Array(responses),
    };

    let mut response = Json(body).into_response();
    if let Some(session_id) = response_session_id
        && let Ok(value) = HeaderValue::from_str(&session_id)
    {
        response.headers_mut().insert(HeaderName::from_static("mcp-session-id"), value);
    }
    response
}

async fn handle_get(State(_state): State<AppState>, headers: HeaderMap) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    handle_get_inner(headers).await
}

async fn handle_get_scoped(State(_state): State<AppState>, headers: HeaderMap, Path(_project_id): Path<Id>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    handle_get_inner(headers).await
}

async fn handle_get_inner(headers: HeaderMap) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()).unwrap_or("unbound").to_string();
    let welcome = serde_json::json!({
        "jsonrpc": "2.0",
        "id": "welcome",
        "result": { "sessionId": session_id },
    });
    let event = Event::default().data(welcome.to_string());
    Sse::new(stream::once(async move { Ok(event) })).keep_alive(axum::response::sse::KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn semaphore_rejects_the_request_past_the_per_session_cap() {
        let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT_PER_SESSION));
        let mut held = Vec::new();
        for _ in 0..MAX_IN_FLIGHT_PER_SESSION {
            held.push(semaphore.clone().try_acquire_owned().expect("permit available under the cap"));
        }
        assert!(semaphore.clone().try_acquire_owned().is_err(), "the cap-th + 1 request must be rejected");

        held.pop();
        assert!(semaphore.try_acquire_owned().is_ok(), "releasing one permit frees a slot for the next request");
    }
}
