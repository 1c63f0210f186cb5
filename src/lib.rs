//! PostgreSQL MCP Server Library
//!
//! MCP (Model Context Protocol) tools for AI assistants to introspect and
//! maintain PostgreSQL databases: schema discovery, ad-hoc queries, health
//! statistics, and gated maintenance operations.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod limiter;
pub mod mcp;
pub mod registry;
pub mod sanitize;
pub mod tools;
pub mod transport;

pub use config::{AccessMode, Config};
pub use dispatch::Dispatcher;
pub use error::{ServerError, ServerResult};
pub use mcp::PgService;
