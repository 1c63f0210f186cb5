//! Query execution engine.
//!
//! The single safe execution primitive every tool handler goes through.
//! Each call sanitizes the statement, acquires a pooled connection with the
//! effective statement timeout applied, streams at most `cap + 1` rows off
//! the wire, clips the surfaced set to the cap, and releases the connection
//! on every exit path (the `PoolConnection` drop returns it to the pool).

use crate::config::AccessMode;
use crate::db::pool::PoolManager;
use crate::db::types::{column_names, row_to_json_map};
use crate::error::{ServerError, ServerResult};
use crate::sanitize::sanitize_query;
use futures_util::StreamExt;
use sqlx::postgres::{PgArguments, PgRow};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A bound query parameter. Identifiers never travel this way; they go
/// through the sanitizer and are interpolated as quoted names.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
}

/// Per-call overrides for the executor's configured defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub timeout: Option<Duration>,
    pub max_rows: Option<u32>,
}

/// Result of one executed statement.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
    /// True when the underlying result had more rows than the cap.
    pub truncated: bool,
    pub elapsed_ms: u64,
}

/// Executes sanitized statements against the pool.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    pool: PoolManager,
    mode: AccessMode,
    default_timeout: Duration,
    default_max_rows: u32,
}

impl QueryExecutor {
    pub fn new(
        pool: PoolManager,
        mode: AccessMode,
        default_timeout: Duration,
        default_max_rows: u32,
    ) -> Self {
        Self {
            pool,
            mode,
            default_timeout,
            default_max_rows,
        }
    }

    pub fn pool(&self) -> &PoolManager {
        &self.pool
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Execute a row-returning statement.
    ///
    /// Fails closed in the sanitizer before any database round-trip; on the
    /// database path the statement timeout is enforced by the session and a
    /// result larger than the row cap is clipped with a warning.
    pub async fn execute_query(
        &self,
        query: &str,
        params: &[QueryParam],
        options: QueryOptions,
    ) -> ServerResult<QueryOutcome> {
        sanitize_query(query, self.mode)?;

        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let cap = options.max_rows.unwrap_or(self.default_max_rows).max(1) as usize;
        let start = Instant::now();

        debug!(
            query = %query,
            params = params.len(),
            cap = cap,
            timeout_ms = timeout.as_millis() as u64,
            "Executing query"
        );

        let mut conn = self.pool.acquire(timeout).await?;

        // Fetch one row past the cap so truncation is detectable without
        // draining an unbounded result.
        let fetch_limit = cap + 1;
        let results: Vec<Result<PgRow, sqlx::Error>> = if params.is_empty() {
            // Simple query protocol; some statements cannot be prepared.
            use sqlx::Executor;
            (&mut *conn).fetch(query).take(fetch_limit).collect().await
        } else {
            let mut q = sqlx::query(query);
            for param in params {
                q = bind_param(q, param);
            }
            q.fetch(&mut *conn).take(fetch_limit).collect().await
        };
        drop(conn);

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let mut rows = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(row) => rows.push(row),
                Err(e) => {
                    let err = wrap_execution_error(e, query, elapsed_ms);
                    warn!(query = %query, elapsed_ms, error = %err, "Query failed");
                    return Err(err);
                }
            }
        }

        let truncated = rows.len() > cap;
        if truncated {
            warn!(cap = cap, "Query result truncated to row cap");
            rows.truncate(cap);
        }

        let columns = rows.first().map(column_names).unwrap_or_default();
        let json_rows: Vec<_> = rows.iter().map(row_to_json_map).collect();

        debug!(rows = json_rows.len(), elapsed_ms, "Query succeeded");

        Ok(QueryOutcome {
            columns,
            row_count: json_rows.len(),
            rows: json_rows,
            truncated,
            elapsed_ms,
        })
    }

    /// Execute a non-row-returning statement (DML, DDL, maintenance) and
    /// return the affected-row count with the elapsed time.
    pub async fn execute_write(
        &self,
        query: &str,
        params: &[QueryParam],
        options: QueryOptions,
    ) -> ServerResult<(u64, u64)> {
        sanitize_query(query, self.mode)?;

        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let start = Instant::now();

        debug!(
            query = %query,
            params = params.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Executing write"
        );

        let mut conn = self.pool.acquire(timeout).await?;
        let result = if params.is_empty() {
            // VACUUM/REINDEX and friends reject the prepared path.
            use sqlx::Executor;
            (&mut *conn).execute(query).await
        } else {
            let mut q = sqlx::query(query);
            for param in params {
                q = bind_param(q, param);
            }
            q.execute(&mut *conn).await
        };
        drop(conn);

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(r) => {
                debug!(rows_affected = r.rows_affected(), elapsed_ms, "Write succeeded");
                Ok((r.rows_affected(), elapsed_ms))
            }
            Err(e) => {
                let err = wrap_execution_error(e, query, elapsed_ms);
                warn!(query = %query, elapsed_ms, error = %err, "Write failed");
                Err(err)
            }
        }
    }
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(sqlx::types::Json(v)),
    }
}

/// Attach query context to statement failures; connection-level failures
/// keep their own kind.
fn wrap_execution_error(e: sqlx::Error, query: &str, elapsed_ms: u64) -> ServerError {
    match ServerError::from(e) {
        ServerError::Execution { message, .. } => {
            ServerError::execution(message, query, elapsed_ms)
        }
        other => other,
    }
}
