//! Newline-delimited JSON over stdin/stdout. One message per line in, one line out per request
//! (never for notifications). Exits cleanly on EOF.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error};

use super::Router;
use crate::error::{RpcError, RpcErrorCode};
use crate::session::TransportKind;

pub async fn run(router: Arc<Router>) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();
    let mut session_id: Option<String> = None;

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let message: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "malformed JSON-RPC line");
                let error = RpcError::new(RpcErrorCode::ParseError, format!("invalid JSON: {e}"));
                let response = serde_json::json!({ "jsonrpc": "2.0", "id": Value::Null, "error": error });
                let mut line = serde_json::to_string(&response)?;
                line.push('\n');
                stdout.write_all(line.as_bytes()).await?;
                stdout.flush().await?;
                continue;
            }
        };

        let outcome = router.dispatch(message, TransportKind::Stdio, None, session_id.as_deref()).await;
        if let Some(session) = outcome.session {
            session_id = Some(session.id);
        }
        let Some(response) = outcome.response else {
            continue;
        };
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }

    debug!("stdin closed, shutting down stdio transport");
    Ok(())
}
