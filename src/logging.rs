//! Structured logging setup. Always writes to stderr — stdout is reserved for the stdio
//! transport's JSON-RPC frames and must never carry a log line.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `default_directive` is the fallback filter when
/// `MCP_CORE_LOG_LEVEL` / `RUST_LOG` is not set (commands vary their default, e.g. `db migrate`
/// runs at `info` while the stdio server runs at `warn` to stay quiet on the wire).
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_env("MCP_CORE_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
