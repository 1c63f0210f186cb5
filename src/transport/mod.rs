//! Transport layer for the MCP server.
//!
//! Only stdio is supported: the server reads JSON-RPC messages from stdin
//! and writes responses to stdout, so diagnostics must go to stderr.

pub mod stdio;

pub use stdio::StdioTransport;
