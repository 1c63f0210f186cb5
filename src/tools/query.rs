//! Ad-hoc query tools.
//!
//! `executeQuery` is the raw entry point: the statement still goes through
//! the sanitizer and the active access mode inside the executor, so in
//! read-only mode only SELECT/EXPLAIN/WITH survive. The remaining tools are
//! convenience wrappers that build their SQL from sanitized identifiers.

use crate::db::{QueryOptions, QueryParam};
use crate::error::ServerResult;
use crate::registry::{ArgSchema, ArgSpec, ArgType, ToolContext, ToolDef};
use crate::sanitize::{
    escape_identifier, sanitize_identifier, validate_order_by, validate_where_clause,
};
use crate::tools::{param_from_value, parse_args};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;

pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "executeQuery",
            description: "Execute a SQL statement with optional bound parameters",
            schema: ArgSchema::new(vec![
                ArgSpec::required("query", ArgType::String, "SQL text to execute"),
                ArgSpec::optional("params", ArgType::Array, "Positional bind parameters"),
                ArgSpec::optional("maxRows", ArgType::Integer, "Row cap override"),
                ArgSpec::optional("timeoutMs", ArgType::Integer, "Statement timeout override"),
            ]),
            handler: execute_query,
        },
        ToolDef {
            name: "explainQuery",
            description: "Show the execution plan of a statement",
            schema: ArgSchema::new(vec![
                ArgSpec::required("query", ArgType::String, "SQL text to explain"),
                ArgSpec::with_default(
                    "analyze",
                    ArgType::Boolean,
                    "Actually execute the statement and report timings",
                    json!(false),
                ),
            ]),
            handler: explain_query,
        },
        ToolDef {
            name: "countRows",
            description: "Count rows in a table, optionally filtered",
            schema: ArgSchema::new(vec![
                ArgSpec::required("table", ArgType::String, "Table name"),
                ArgSpec::with_default("schema", ArgType::String, "Schema name", json!("public")),
                ArgSpec::optional("where", ArgType::String, "Filter condition"),
            ]),
            handler: count_rows,
        },
        ToolDef {
            name: "sampleRows",
            description: "Fetch a small sample of rows from a table",
            schema: ArgSchema::new(vec![
                ArgSpec::required("table", ArgType::String, "Table name"),
                ArgSpec::with_default("schema", ArgType::String, "Schema name", json!("public")),
                ArgSpec::with_default("limit", ArgType::Integer, "Number of rows", json!(10)),
                ArgSpec::optional("orderBy", ArgType::String, "Column list to order by"),
            ]),
            handler: sample_rows,
        },
    ]
}

fn execute_query(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Input {
            query: String,
            #[serde(default)]
            params: Vec<Value>,
            max_rows: Option<u32>,
            timeout_ms: Option<u64>,
        }
        let input: Input = parse_args("executeQuery", args)?;
        let params: Vec<QueryParam> = input.params.iter().map(param_from_value).collect();
        let options = QueryOptions {
            timeout: input.timeout_ms.map(Duration::from_millis),
            max_rows: input.max_rows,
        };
        let outcome = ctx.executor.execute_query(&input.query, &params, options).await?;
        Ok(serde_json::to_value(outcome)?)
    })
}

fn explain_query(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        struct Input {
            query: String,
            analyze: bool,
        }
        let input: Input = parse_args("explainQuery", args)?;
        // The inner statement is validated on its own so EXPLAIN cannot be
        // used to smuggle a disallowed statement kind past the mode gate.
        crate::sanitize::sanitize_query(&input.query, ctx.executor.mode())?;

        let sql = if input.analyze {
            format!("EXPLAIN (ANALYZE, FORMAT JSON) {}", input.query)
        } else {
            format!("EXPLAIN (FORMAT JSON) {}", input.query)
        };
        let outcome = ctx
            .executor
            .execute_query(&sql, &[], QueryOptions::default())
            .await?;
        let plan = outcome
            .rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove("QUERY PLAN"))
            .unwrap_or(Value::Null);
        Ok(json!({ "plan": plan, "analyzed": input.analyze, "elapsed_ms": outcome.elapsed_ms }))
    })
}

fn count_rows(ctx: &ToolContext, args: Map<String, Value>) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        struct Input {
            table: String,
            schema: String,
            #[serde(rename = "where")]
            filter: Option<String>,
        }
        let input: Input = parse_args("countRows", args)?;
        sanitize_identifier(&input.table)?;
        sanitize_identifier(&input.schema)?;

        let mut sql = format!(
            "SELECT count(*) AS count FROM {}.{}",
            escape_identifier(&input.schema),
            escape_identifier(&input.table)
        );
        if let Some(filter) = &input.filter {
            let condition = validate_where_clause(filter)?;
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }

        let outcome = ctx
            .executor
            .execute_query(&sql, &[], QueryOptions::default())
            .await?;
        let count = outcome
            .rows
            .first()
            .and_then(|row| row.get("count"))
            .cloned()
            .unwrap_or(json!(0));
        Ok(json!({
            "schema": input.schema,
            "table": input.table,
            "count": count,
        }))
    })
}

fn sample_rows(ctx: &ToolContext, args: Map<String, Value>) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Input {
            table: String,
            schema: String,
            limit: i64,
            order_by: Option<String>,
        }
        let input: Input = parse_args("sampleRows", args)?;
        sanitize_identifier(&input.table)?;
        sanitize_identifier(&input.schema)?;
        let limit = input.limit.clamp(1, 1000);

        let mut sql = format!(
            "SELECT * FROM {}.{}",
            escape_identifier(&input.schema),
            escape_identifier(&input.table)
        );
        if let Some(order_by) = &input.order_by {
            validate_order_by(order_by)?;
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        // Numeric, validated by the schema; never free-form text.
        sql.push_str(&format!(" LIMIT {}", limit));

        let outcome = ctx
            .executor
            .execute_query(&sql, &[], QueryOptions::default())
            .await?;
        Ok(json!({
            "schema": input.schema,
            "table": input.table,
            "columns": outcome.columns,
            "rows": outcome.rows,
            "count": outcome.row_count,
        }))
    })
}
