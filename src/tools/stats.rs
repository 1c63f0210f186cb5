//! Database statistics tools.
//!
//! Observability queries over the cumulative statistics views: sizes,
//! connections, cache hit ratio, index usage, locks, vacuum progress and
//! (when the extension is installed) slow queries from pg_stat_statements.

use crate::db::{QueryOptions, QueryParam};
use crate::error::ServerResult;
use crate::registry::{ArgSchema, ArgSpec, ArgType, ToolContext, ToolDef};
use crate::sanitize::sanitize_identifier;
use crate::tools::{format_size, parse_args};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};

pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "getDatabaseSize",
            description: "Total size of the current database",
            schema: ArgSchema::empty(),
            handler: get_database_size,
        },
        ToolDef {
            name: "getConnectionStats",
            description: "Pool counters and server-side connection activity",
            schema: ArgSchema::empty(),
            handler: get_connection_stats,
        },
        ToolDef {
            name: "getCacheHitRatio",
            description: "Buffer-cache hit ratio for user tables",
            schema: ArgSchema::empty(),
            handler: get_cache_hit_ratio,
        },
        ToolDef {
            name: "getIndexUsage",
            description: "Per-index scan counts and sizes in a schema",
            schema: ArgSchema::new(vec![ArgSpec::with_default(
                "schema",
                ArgType::String,
                "Schema name",
                json!("public"),
            )]),
            handler: get_index_usage,
        },
        ToolDef {
            name: "getLocks",
            description: "Locks currently held or awaited in the current database",
            schema: ArgSchema::empty(),
            handler: get_locks,
        },
        ToolDef {
            name: "getVacuumStats",
            description: "Dead-tuple counts and vacuum history per table",
            schema: ArgSchema::new(vec![ArgSpec::with_default(
                "schema",
                ArgType::String,
                "Schema name",
                json!("public"),
            )]),
            handler: get_vacuum_stats,
        },
        ToolDef {
            name: "getSlowQueries",
            description: "Slowest statements from pg_stat_statements, if installed",
            schema: ArgSchema::new(vec![ArgSpec::with_default(
                "limit",
                ArgType::Integer,
                "Number of statements",
                json!(10),
            )]),
            handler: get_slow_queries,
        },
    ]
}

#[derive(Debug, Deserialize)]
struct SchemaInput {
    schema: String,
}

fn get_database_size(
    ctx: &ToolContext,
    _args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT current_database() AS database, \
                        pg_database_size(current_database()) AS size_bytes",
                &[],
                QueryOptions::default(),
            )
            .await?;
        let mut row = outcome.rows.into_iter().next().unwrap_or_default();
        if let Some(bytes) = row.get("size_bytes").and_then(Value::as_u64) {
            row.insert("size".to_string(), json!(format_size(bytes)));
        }
        Ok(Value::Object(row))
    })
}

fn get_connection_stats(
    ctx: &ToolContext,
    _args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT count(*) AS total, \
                        count(*) FILTER (WHERE state = 'active') AS active, \
                        count(*) FILTER (WHERE state = 'idle') AS idle, \
                        count(*) FILTER (WHERE wait_event_type = 'Lock') AS waiting \
                 FROM pg_stat_activity \
                 WHERE datname = current_database()",
                &[],
                QueryOptions::default(),
            )
            .await?;
        let server = outcome.rows.into_iter().next().unwrap_or_default();
        Ok(json!({
            "pool": ctx.executor.pool().stats(),
            "server": server,
        }))
    })
}

fn get_cache_hit_ratio(
    ctx: &ToolContext,
    _args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT sum(heap_blks_read) AS blocks_read, \
                        sum(heap_blks_hit) AS blocks_hit, \
                        round(sum(heap_blks_hit)::numeric \
                              / nullif(sum(heap_blks_hit) + sum(heap_blks_read), 0), 4) AS hit_ratio \
                 FROM pg_statio_user_tables",
                &[],
                QueryOptions::default(),
            )
            .await?;
        let row = outcome.rows.into_iter().next().unwrap_or_default();
        Ok(Value::Object(row))
    })
}

fn get_index_usage(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let input: SchemaInput = parse_args("getIndexUsage", args)?;
        sanitize_identifier(&input.schema)?;
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT s.relname AS \"table\", s.indexrelname AS index, s.idx_scan, \
                        s.idx_tup_read, s.idx_tup_fetch, \
                        pg_relation_size(s.indexrelid) AS size_bytes \
                 FROM pg_stat_user_indexes s \
                 WHERE s.schemaname = $1 \
                 ORDER BY s.idx_scan DESC, s.relname",
                &[QueryParam::String(input.schema.clone())],
                QueryOptions::default(),
            )
            .await?;
        Ok(json!({
            "schema": input.schema,
            "count": outcome.row_count,
            "indexes": outcome.rows,
        }))
    })
}

fn get_locks(ctx: &ToolContext, _args: Map<String, Value>) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT l.locktype, l.mode, l.granted, a.pid, a.state, \
                        left(a.query, 200) AS query \
                 FROM pg_locks l \
                 JOIN pg_stat_activity a ON a.pid = l.pid \
                 WHERE a.datname = current_database() \
                 ORDER BY l.granted, a.pid",
                &[],
                QueryOptions::default(),
            )
            .await?;
        Ok(json!({ "locks": outcome.rows, "count": outcome.row_count }))
    })
}

fn get_vacuum_stats(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let input: SchemaInput = parse_args("getVacuumStats", args)?;
        sanitize_identifier(&input.schema)?;
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT relname AS \"table\", n_live_tup, n_dead_tup, \
                        last_vacuum::text, last_autovacuum::text, \
                        vacuum_count, autovacuum_count \
                 FROM pg_stat_user_tables \
                 WHERE schemaname = $1 \
                 ORDER BY n_dead_tup DESC",
                &[QueryParam::String(input.schema.clone())],
                QueryOptions::default(),
            )
            .await?;
        Ok(json!({
            "schema": input.schema,
            "count": outcome.row_count,
            "tables": outcome.rows,
        }))
    })
}

fn get_slow_queries(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        struct Input {
            limit: i64,
        }
        let input: Input = parse_args("getSlowQueries", args)?;
        let limit = input.limit.clamp(1, 100);

        // Availability probe. Only a successful empty probe means the
        // extension is missing; connection and query errors propagate.
        let available = ctx
            .executor
            .execute_query(
                "SELECT 1 AS one FROM pg_extension WHERE extname = 'pg_stat_statements'",
                &[],
                QueryOptions::default(),
            )
            .await?
            .row_count
            > 0;
        if !available {
            return Ok(json!({
                "available": false,
                "message": "pg_stat_statements is not installed",
            }));
        }

        let outcome = ctx
            .executor
            .execute_query(
                &format!(
                    "SELECT left(query, 500) AS query, calls, \
                            round(mean_exec_time::numeric, 2) AS mean_time_ms, \
                            round(total_exec_time::numeric, 2) AS total_time_ms, \
                            rows \
                     FROM pg_stat_statements \
                     ORDER BY mean_exec_time DESC \
                     LIMIT {}",
                    limit
                ),
                &[],
                QueryOptions::default(),
            )
            .await?;
        Ok(json!({
            "available": true,
            "count": outcome.row_count,
            "queries": outcome.rows,
        }))
    })
}
