//! Maintenance tools.
//!
//! VACUUM/ANALYZE/REINDEX wrappers plus guarded write helpers. All of these
//! build statements the sanitizer only admits in read-write mode, so the
//! mode gate applies without any extra checks here. `safeDelete` and
//! `safeUpdate` additionally refuse trivial WHERE clauses that would touch
//! the whole table unless the caller opts in explicitly.

use crate::db::{QueryOptions, QueryParam};
use crate::error::ServerResult;
use crate::registry::{ArgSchema, ArgSpec, ArgType, ToolContext, ToolDef};
use crate::sanitize::{
    escape_identifier, sanitize_identifier, strip_where_keyword, validate_where_clause,
};
use crate::tools::{param_from_value, parse_args};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};

pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "vacuumTable",
            description: "Run VACUUM on a table, optionally FULL and/or ANALYZE",
            schema: ArgSchema::new(vec![
                table_arg(),
                schema_arg(),
                ArgSpec::with_default("full", ArgType::Boolean, "Rewrite the table (FULL)", json!(false)),
                ArgSpec::with_default("analyze", ArgType::Boolean, "Update statistics too", json!(false)),
            ]),
            handler: vacuum_table,
        },
        ToolDef {
            name: "analyzeTable",
            description: "Update planner statistics for a table",
            schema: ArgSchema::new(vec![table_arg(), schema_arg()]),
            handler: analyze_table,
        },
        ToolDef {
            name: "reindexTable",
            description: "Rebuild all indexes of a table",
            schema: ArgSchema::new(vec![table_arg(), schema_arg()]),
            handler: reindex_table,
        },
        ToolDef {
            name: "safeDelete",
            description: "Delete rows matching a condition, refusing whole-table deletes",
            schema: ArgSchema::new(vec![
                table_arg(),
                schema_arg(),
                ArgSpec::required("where", ArgType::String, "Row filter condition"),
                ArgSpec::with_default(
                    "allowEmptyWhere",
                    ArgType::Boolean,
                    "Permit a condition that matches every row",
                    json!(false),
                ),
            ]),
            handler: safe_delete,
        },
        ToolDef {
            name: "safeUpdate",
            description: "Update columns on rows matching a condition, refusing whole-table updates",
            schema: ArgSchema::new(vec![
                table_arg(),
                schema_arg(),
                ArgSpec::required("set", ArgType::Object, "Column to new-value map"),
                ArgSpec::required("where", ArgType::String, "Row filter condition"),
                ArgSpec::with_default(
                    "allowEmptyWhere",
                    ArgType::Boolean,
                    "Permit a condition that matches every row",
                    json!(false),
                ),
            ]),
            handler: safe_update,
        },
    ]
}

fn table_arg() -> ArgSpec {
    ArgSpec::required("table", ArgType::String, "Table name")
}

fn schema_arg() -> ArgSpec {
    ArgSpec::with_default("schema", ArgType::String, "Schema name", json!("public"))
}

/// A condition that matches every row: empty, `true`, or a `x=x` tautology
/// in its common spellings.
fn is_trivial_condition(condition: &str) -> bool {
    let normalized: String = condition
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    matches!(normalized.as_str(), "" | "true" | "1=1" | "'1'='1'")
}

#[derive(Debug, Deserialize)]
struct TableInput {
    table: String,
    schema: String,
}

fn vacuum_table(ctx: &ToolContext, args: Map<String, Value>) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        struct Input {
            table: String,
            schema: String,
            full: bool,
            analyze: bool,
        }
        let input: Input = parse_args("vacuumTable", args)?;
        sanitize_identifier(&input.table)?;
        sanitize_identifier(&input.schema)?;

        let mut options = Vec::new();
        if input.full {
            options.push("FULL");
        }
        if input.analyze {
            options.push("ANALYZE");
        }
        let sql = if options.is_empty() {
            format!(
                "VACUUM {}.{}",
                escape_identifier(&input.schema),
                escape_identifier(&input.table)
            )
        } else {
            format!(
                "VACUUM ({}) {}.{}",
                options.join(", "),
                escape_identifier(&input.schema),
                escape_identifier(&input.table)
            )
        };

        let (_, elapsed_ms) = ctx
            .executor
            .execute_write(&sql, &[], QueryOptions::default())
            .await?;
        Ok(json!({
            "schema": input.schema,
            "table": input.table,
            "full": input.full,
            "analyze": input.analyze,
            "elapsed_ms": elapsed_ms,
        }))
    })
}

fn analyze_table(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let input: TableInput = parse_args("analyzeTable", args)?;
        sanitize_identifier(&input.table)?;
        sanitize_identifier(&input.schema)?;
        let sql = format!(
            "ANALYZE {}.{}",
            escape_identifier(&input.schema),
            escape_identifier(&input.table)
        );
        let (_, elapsed_ms) = ctx
            .executor
            .execute_write(&sql, &[], QueryOptions::default())
            .await?;
        Ok(json!({
            "schema": input.schema,
            "table": input.table,
            "elapsed_ms": elapsed_ms,
        }))
    })
}

fn reindex_table(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let input: TableInput = parse_args("reindexTable", args)?;
        sanitize_identifier(&input.table)?;
        sanitize_identifier(&input.schema)?;
        let sql = format!(
            "REINDEX TABLE {}.{}",
            escape_identifier(&input.schema),
            escape_identifier(&input.table)
        );
        let (_, elapsed_ms) = ctx
            .executor
            .execute_write(&sql, &[], QueryOptions::default())
            .await?;
        Ok(json!({
            "schema": input.schema,
            "table": input.table,
            "elapsed_ms": elapsed_ms,
        }))
    })
}

fn safe_delete(ctx: &ToolContext, args: Map<String, Value>) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Input {
            table: String,
            schema: String,
            #[serde(rename = "where")]
            filter: String,
            allow_empty_where: bool,
        }
        let input: Input = parse_args("safeDelete", args)?;
        sanitize_identifier(&input.table)?;
        sanitize_identifier(&input.schema)?;

        // The blocked response comes before any statement is issued, so the
        // database never sees a refused whole-table delete. Triviality is
        // judged on the bare condition, with or without a typed WHERE.
        let condition = strip_where_keyword(&input.filter);
        if is_trivial_condition(condition) && !input.allow_empty_where {
            return Ok(json!({
                "blocked": true,
                "table": input.table,
                "reason": "the WHERE clause matches every row; pass allowEmptyWhere to confirm",
            }));
        }
        let condition = validate_where_clause(condition)?;

        let sql = format!(
            "DELETE FROM {}.{} WHERE {}",
            escape_identifier(&input.schema),
            escape_identifier(&input.table),
            condition,
        );
        let (rows_deleted, elapsed_ms) = ctx
            .executor
            .execute_write(&sql, &[], QueryOptions::default())
            .await?;
        Ok(json!({
            "blocked": false,
            "schema": input.schema,
            "table": input.table,
            "rows_deleted": rows_deleted,
            "elapsed_ms": elapsed_ms,
        }))
    })
}

fn safe_update(ctx: &ToolContext, args: Map<String, Value>) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Input {
            table: String,
            schema: String,
            set: Map<String, Value>,
            #[serde(rename = "where")]
            filter: String,
            allow_empty_where: bool,
        }
        let input: Input = parse_args("safeUpdate", args)?;
        sanitize_identifier(&input.table)?;
        sanitize_identifier(&input.schema)?;
        if input.set.is_empty() {
            return Err(crate::error::ServerError::argument_schema(
                "safeUpdate",
                "'set' must name at least one column",
            ));
        }

        let condition = strip_where_keyword(&input.filter);
        if is_trivial_condition(condition) && !input.allow_empty_where {
            return Ok(json!({
                "blocked": true,
                "table": input.table,
                "reason": "the WHERE clause matches every row; pass allowEmptyWhere to confirm",
            }));
        }
        let condition = validate_where_clause(condition)?;

        // Column names are sanitized identifiers; values travel as bound
        // parameters.
        let mut assignments = Vec::with_capacity(input.set.len());
        let mut params: Vec<QueryParam> = Vec::with_capacity(input.set.len());
        for (idx, (column, value)) in input.set.iter().enumerate() {
            sanitize_identifier(column)?;
            assignments.push(format!("{} = ${}", escape_identifier(column), idx + 1));
            params.push(param_from_value(value));
        }

        let sql = format!(
            "UPDATE {}.{} SET {} WHERE {}",
            escape_identifier(&input.schema),
            escape_identifier(&input.table),
            assignments.join(", "),
            condition,
        );
        let (rows_updated, elapsed_ms) = ctx
            .executor
            .execute_write(&sql, &params, QueryOptions::default())
            .await?;
        Ok(json!({
            "blocked": false,
            "schema": input.schema,
            "table": input.table,
            "rows_updated": rows_updated,
            "elapsed_ms": elapsed_ms,
        }))
    })
}
