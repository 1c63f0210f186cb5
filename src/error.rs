//! Error types for the PG MCP Server.
//!
//! This module defines all error kinds using `thiserror`. Every failure a
//! tool invocation can produce is funneled into one of these variants so
//! the dispatcher can log and shape them uniformly.

use thiserror::Error;

/// Maximum number of query-text characters carried inside an execution error.
const QUERY_SNIPPET_LEN: usize = 120;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed or disallowed input caught before touching the database:
    /// bad identifier, disallowed statement kind, dangerous pattern,
    /// bad interval/condition syntax.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Tool arguments failed the declared schema (wrong type, missing
    /// required field, unknown field).
    #[error("Invalid arguments for tool '{tool}': {message}")]
    ArgumentSchema { tool: String, message: String },

    /// The sliding-window rate limit was exceeded.
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Unknown tool name.
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    /// The statement failed at the database: syntax error, constraint
    /// violation, statement-timeout expiry, connection loss mid-query.
    #[error("Query execution failed: {message}")]
    Execution {
        message: String,
        /// Leading snippet of the offending statement, for logs.
        query: String,
        elapsed_ms: u64,
    },

    /// Failure to establish the pool at startup or to acquire a
    /// connection for a request.
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ServerError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an argument-schema error for a specific tool.
    pub fn argument_schema(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArgumentSchema {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a rate-limited error with a retry-after hint in seconds.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Create a tool-not-found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    /// Create an execution error carrying a truncated query snippet.
    pub fn execution(message: impl Into<String>, query: &str, elapsed_ms: u64) -> Self {
        let mut snippet: String = query.chars().take(QUERY_SNIPPET_LEN).collect();
        if query.chars().count() > QUERY_SNIPPET_LEN {
            snippet.push('…');
        }
        Self::Execution {
            message: message.into(),
            query: snippet,
            elapsed_ms,
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Short machine-readable label for this error kind, used in logs and
    /// in the error envelope returned to the client.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::ArgumentSchema { .. } => "argument_schema",
            Self::RateLimited { .. } => "rate_limited",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::Execution { .. } => "execution",
            Self::Connection { .. } => "connection",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Convert sqlx errors into the taxonomy. Pool-acquisition failures are
/// connection errors, distinct from statement failures which the executor
/// wraps itself with query context.
impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => {
                ServerError::connection(format!("Invalid connection configuration: {}", msg))
            }
            sqlx::Error::PoolTimedOut => {
                ServerError::connection("Timed out acquiring a connection from the pool")
            }
            sqlx::Error::PoolClosed => ServerError::connection("Connection pool is closed"),
            sqlx::Error::Io(io_err) => ServerError::connection(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => {
                ServerError::connection(format!("TLS error: {}", tls_err))
            }
            sqlx::Error::Protocol(msg) => {
                ServerError::connection(format!("Protocol error: {}", msg))
            }
            sqlx::Error::Database(db_err) => {
                let message = match db_err.code() {
                    Some(code) => format!("{} (SQLSTATE: {})", db_err.message(), code),
                    None => db_err.message().to_string(),
                };
                ServerError::Execution {
                    message,
                    query: String::new(),
                    elapsed_ms: 0,
                }
            }
            other => ServerError::internal(format!("Database error: {}", other)),
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::internal(format!("JSON serialization failed: {}", err))
    }
}

/// Result type alias used throughout the crate.
pub type ServerResult<T> = Result<T, ServerError>;

/// Convert ServerError to MCP ErrorData for protocol-level failures
/// (argument and lookup errors raised before a handler runs).
impl From<ServerError> for rmcp::ErrorData {
    fn from(err: ServerError) -> Self {
        match &err {
            ServerError::Validation { .. }
            | ServerError::ArgumentSchema { .. }
            | ServerError::ToolNotFound { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), None)
            }
            ServerError::RateLimited { retry_after_secs } => rmcp::ErrorData::invalid_params(
                err.to_string(),
                Some(serde_json::json!({ "retry_after_secs": retry_after_secs })),
            ),
            ServerError::Execution { .. }
            | ServerError::Connection { .. }
            | ServerError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::validation("semicolon in the middle of the statement");
        assert!(err.to_string().contains("Validation failed"));
    }

    #[test]
    fn test_execution_snippet_truncated() {
        let long_query = "SELECT ".to_string() + &"x, ".repeat(200);
        let err = ServerError::execution("syntax error", &long_query, 12);
        if let ServerError::Execution { query, .. } = &err {
            assert!(query.chars().count() <= QUERY_SNIPPET_LEN + 1);
            assert!(query.ends_with('…'));
        } else {
            panic!("expected execution error");
        }
    }

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let err = ServerError::rate_limited(7);
        assert!(err.to_string().contains("7s"));
        assert_eq!(err.kind(), "rate_limited");
    }

    #[test]
    fn test_pool_timeout_maps_to_connection() {
        let err: ServerError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ServerError::Connection { .. }));
    }

    #[test]
    fn test_validation_maps_to_invalid_params() {
        let err = ServerError::validation("bad input");
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_rate_limited_maps_to_invalid_params_with_data() {
        let err = ServerError::rate_limited(3);
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32602);
        let data = mcp_err.data.expect("retry data");
        assert_eq!(data["retry_after_secs"], 3);
    }

    #[test]
    fn test_connection_maps_to_internal_error() {
        let err = ServerError::connection("refused");
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32603);
    }
}
