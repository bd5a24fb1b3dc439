//! Two-tier error model.
//!
//! Wire-level [`RpcError`] carries the small set of JSON-RPC 2.0 error codes and is only ever
//! produced by the router itself (bad envelope, unknown method, internal panic). Everything a
//! tool handler raises is a [`DomainError`], which the invoker always turns into a *successful*
//! JSON-RPC result with `isError: true` in its content — never into an `RpcError`.

use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;

/// Domain error codes. These are carried in tool output, not in the JSON-RPC envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    InvalidParams,
    ValidationFailed,
    FileNotFound,
    ProjectNotFound,
    TicketNotFound,
    TaskNotFound,
    QueueNotFound,
    PromptNotFound,
    NoSearchResults,
    SearchFailed,
    BatchSizeExceeded,
    BatchOperationFailed,
    UnknownAction,
    ServiceError,
    NotFound,
    InternalError,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", <&'static str>::from(*self))
    }
}

/// A structured domain error, convertible into MCP tool content with recovery hints.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{code}: {message}")]
pub struct DomainError {
    pub code: Code,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_resources: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub context: Value,
}

impl DomainError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestion: None,
            related_resources: None,
            context: Value::Null,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_related(mut self, related: Vec<String>) -> Self {
        self.related_resources = Some(related);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// A missing-required-field error that names the field, its expected type, and an example.
    pub fn missing_field(field: &str, expected_type: &str, example: &str) -> Self {
        Self::new(
            Code::InvalidParams,
            format!("Missing required field `{field}` (expected {expected_type}, e.g. {example})"),
        )
        .with_context(json!({ "field": field, "expectedType": expected_type, "example": example }))
    }

    pub fn not_found(code: Code, kind: &str, id: impl fmt::Display) -> Self {
        Self::new(code, format!("{kind} {id} not found"))
    }

    pub fn unknown_action(tool: &str, action: &str, valid: &[&str]) -> Self {
        Self::new(
            Code::UnknownAction,
            format!(
                "Unknown action `{action}` for tool `{tool}`. Valid actions: {}",
                valid.join(", ")
            ),
        )
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self::new(Code::ServiceError, message.into())
    }

    /// Render as the `content`/`isError` shape the Tool Invoker returns to clients.
    ///
    /// Idempotent: formatting an already-formatted error message does not add a second
    /// layer of prefixing, since the text is built fresh from the structured fields each time.
    pub fn to_tool_result(&self) -> Value {
        let mut text = format!("[{}] {}", self.code, self.message);
        if let Some(suggestion) = &self.suggestion {
            text.push_str(&format!("\nSuggestion: {suggestion}"));
        }
        if let Some(related) = &self.related_resources {
            let sample: Vec<_> = related.iter().take(5).cloned().collect();
            if !sample.is_empty() {
                text.push_str(&format!("\nAvailable: {}", sample.join(", ")));
            }
        }
        json!({
            "content": [{ "type": "text", "text": text }],
            "isError": true,
        })
    }
}

/// Internal error wrapper: anything that is not already a [`DomainError`] (I/O, store,
/// serialization failures) converts into `SERVICE_ERROR` at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_sqlite::PoolError),
    #[error("interact error: {0}")]
    Interact(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<deadpool_sqlite::InteractError> for CoreError {
    fn from(e: deadpool_sqlite::InteractError) -> Self {
        CoreError::Interact(e.to_string())
    }
}

impl CoreError {
    /// Collapse into a single domain error for the invoker boundary.
    pub fn into_domain(self) -> DomainError {
        match self {
            CoreError::Domain(d) => d,
            other => DomainError::service(other.to_string()).with_context(json!({
                "originalError": other.to_string(),
            })),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// JSON-RPC 2.0 wire-level error codes (standard reserved range, §4.8 of the protocol).
#[derive(Debug, Clone, Copy)]
pub enum RpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl RpcErrorCode {
    pub fn code(self) -> i64 {
        match self {
            RpcErrorCode::ParseError => -32700,
            RpcErrorCode::InvalidRequest => -32600,
            RpcErrorCode::MethodNotFound => -32601,
            RpcErrorCode::InvalidParams => -32602,
            RpcErrorCode::InternalError => -32603,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_field_and_example() {
        let err = DomainError::missing_field("path", "string", "src/index.ts");
        let result = err.to_tool_result();
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("path"));
        assert!(text.contains("src/index.ts"));
        assert_eq!(result["isError"], true);
    }

    #[test]
    fn formatting_is_idempotent() {
        let err = DomainError::service("boom");
        let once = err.to_tool_result();
        let twice = err.to_tool_result();
        assert_eq!(once, twice);
    }

    #[test]
    fn core_error_collapses_to_service_error_code() {
        let err = CoreError::Other(anyhow::anyhow!("disk full"));
        let domain = err.into_domain();
        assert_eq!(domain.code, Code::ServiceError);
        assert!(domain.message.contains("disk full"));
    }
}
