//! MCP server core for a developer-tooling platform: JSON-RPC router, tool dispatch, task
//! queues, and a resource provider, all injected with collaborator interfaces (clock, id
//! generator, LLM backend, store) so the whole stack is testable without a live network.

pub mod capabilities;
pub mod cli;
pub mod config;
pub mod error;
pub mod external;
pub mod logging;
pub mod queue;
pub mod resources;
pub mod rpc;
pub mod session;
pub mod store;
pub mod tools;
