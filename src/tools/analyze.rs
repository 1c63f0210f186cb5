//! Analysis tools.
//!
//! Heavier diagnostic queries: duplicate detection, bloat estimation,
//! unused indexes and sequence exhaustion. All generated SQL interpolates
//! only sanitized identifiers and schema-validated integers; everything
//! else is bound.

use crate::db::{QueryOptions, QueryParam};
use crate::error::{ServerError, ServerResult};
use crate::registry::{ArgSchema, ArgSpec, ArgType, ToolContext, ToolDef};
use crate::sanitize::{escape_identifier, sanitize_identifier};
use crate::tools::{format_size, parse_args};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};

pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "findDuplicateRows",
            description: "Find duplicate rows grouped by a set of columns",
            schema: ArgSchema::new(vec![
                ArgSpec::required("table", ArgType::String, "Table name"),
                ArgSpec::required("columns", ArgType::Array, "Columns that define a duplicate"),
                ArgSpec::with_default("schema", ArgType::String, "Schema name", json!("public")),
                ArgSpec::with_default("limit", ArgType::Integer, "Max groups returned", json!(100)),
            ]),
            handler: find_duplicate_rows,
        },
        ToolDef {
            name: "analyzeTableBloat",
            description: "Estimate table bloat from dead-tuple statistics",
            schema: ArgSchema::new(vec![
                ArgSpec::with_default("schema", ArgType::String, "Schema name", json!("public")),
                ArgSpec::with_default("limit", ArgType::Integer, "Max tables returned", json!(20)),
            ]),
            handler: analyze_table_bloat,
        },
        ToolDef {
            name: "findUnusedIndexes",
            description: "Find non-unique indexes that have never been scanned",
            schema: ArgSchema::new(vec![
                ArgSpec::with_default("schema", ArgType::String, "Schema name", json!("public")),
                ArgSpec::with_default("limit", ArgType::Integer, "Max indexes returned", json!(20)),
            ]),
            handler: find_unused_indexes,
        },
        ToolDef {
            name: "getSequenceUsage",
            description: "Sequence exhaustion as a percentage of the max value",
            schema: ArgSchema::empty(),
            handler: get_sequence_usage,
        },
    ]
}

fn find_duplicate_rows(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        struct Input {
            table: String,
            columns: Vec<String>,
            schema: String,
            limit: i64,
        }
        let input: Input = parse_args("findDuplicateRows", args)?;
        if input.columns.is_empty() {
            return Err(ServerError::argument_schema(
                "findDuplicateRows",
                "'columns' must name at least one column",
            ));
        }
        sanitize_identifier(&input.table)?;
        sanitize_identifier(&input.schema)?;
        for column in &input.columns {
            sanitize_identifier(column)?;
        }
        let limit = input.limit.clamp(1, 1000);

        let column_list = input
            .columns
            .iter()
            .map(|c| escape_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {cols}, count(*) AS duplicate_count \
             FROM {schema}.{table} \
             GROUP BY {cols} \
             HAVING count(*) > 1 \
             ORDER BY duplicate_count DESC \
             LIMIT {limit}",
            cols = column_list,
            schema = escape_identifier(&input.schema),
            table = escape_identifier(&input.table),
            limit = limit,
        );

        let outcome = ctx
            .executor
            .execute_query(&sql, &[], QueryOptions::default())
            .await?;
        Ok(json!({
            "schema": input.schema,
            "table": input.table,
            "columns": input.columns,
            "duplicate_groups": outcome.rows,
            "count": outcome.row_count,
        }))
    })
}

fn analyze_table_bloat(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        struct Input {
            schema: String,
            limit: i64,
        }
        let input: Input = parse_args("analyzeTableBloat", args)?;
        sanitize_identifier(&input.schema)?;
        let limit = input.limit.clamp(1, 1000);

        let outcome = ctx
            .executor
            .execute_query(
                &format!(
                    "SELECT relname AS \"table\", n_live_tup, n_dead_tup, \
                            round(100.0 * n_dead_tup / nullif(n_live_tup + n_dead_tup, 0), 2) \
                                AS dead_tuple_percent, \
                            pg_total_relation_size(relid) AS total_size_bytes \
                     FROM pg_stat_user_tables \
                     WHERE schemaname = $1 AND n_dead_tup > 0 \
                     ORDER BY n_dead_tup DESC \
                     LIMIT {}",
                    limit
                ),
                &[QueryParam::String(input.schema.clone())],
                QueryOptions::default(),
            )
            .await?;

        let tables: Vec<Value> = outcome
            .rows
            .into_iter()
            .map(|mut row| {
                if let Some(bytes) = row.get("total_size_bytes").and_then(Value::as_u64) {
                    row.insert("total_size".to_string(), json!(format_size(bytes)));
                }
                Value::Object(row)
            })
            .collect();
        Ok(json!({
            "schema": input.schema,
            "count": tables.len(),
            "tables": tables,
        }))
    })
}

fn find_unused_indexes(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        struct Input {
            schema: String,
            limit: i64,
        }
        let input: Input = parse_args("findUnusedIndexes", args)?;
        sanitize_identifier(&input.schema)?;
        let limit = input.limit.clamp(1, 1000);

        let outcome = ctx
            .executor
            .execute_query(
                &format!(
                    "SELECT s.relname AS \"table\", s.indexrelname AS index, \
                            pg_relation_size(s.indexrelid) AS size_bytes \
                     FROM pg_stat_user_indexes s \
                     JOIN pg_index i ON i.indexrelid = s.indexrelid \
                     WHERE s.schemaname = $1 AND s.idx_scan = 0 \
                       AND NOT i.indisunique AND NOT i.indisprimary \
                     ORDER BY pg_relation_size(s.indexrelid) DESC \
                     LIMIT {}",
                    limit
                ),
                &[QueryParam::String(input.schema.clone())],
                QueryOptions::default(),
            )
            .await?;

        let indexes: Vec<Value> = outcome
            .rows
            .into_iter()
            .map(|mut row| {
                if let Some(bytes) = row.get("size_bytes").and_then(Value::as_u64) {
                    row.insert("size".to_string(), json!(format_size(bytes)));
                }
                Value::Object(row)
            })
            .collect();
        Ok(json!({
            "schema": input.schema,
            "count": indexes.len(),
            "indexes": indexes,
        }))
    })
}

fn get_sequence_usage(
    ctx: &ToolContext,
    _args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT schemaname AS schema, sequencename AS sequence, \
                        last_value, max_value, \
                        round(100.0 * last_value / nullif(max_value, 0), 4) AS percent_used \
                 FROM pg_sequences \
                 WHERE last_value IS NOT NULL \
                 ORDER BY percent_used DESC NULLS LAST",
                &[],
                QueryOptions::default(),
            )
            .await?;
        Ok(json!({ "sequences": outcome.rows, "count": outcome.row_count }))
    })
}
