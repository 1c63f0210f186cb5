//! MCP protocol integration.
//!
//! Frames inbound tool calls and outbound results; all tool semantics live
//! behind the dispatcher.

pub mod service;

pub use service::PgService;
