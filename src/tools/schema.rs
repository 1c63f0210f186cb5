//! Schema introspection tools.
//!
//! Catalog queries over `information_schema` and the `pg_catalog` views:
//! schemas, tables, columns, indexes, views, extensions and per-table
//! statistics.

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
            name: "listSchemas",
            description: "List non-system schemas in the current database",
            schema: ArgSchema::empty(),
            handler: list_schemas,
        },
        ToolDef {
            name: "listTables",
            description: "List tables in a schema with size information",
            schema: ArgSchema::new(vec![schema_arg()]),
            handler: list_tables,
        },
        ToolDef {
            name: "describeTable",
            description: "Describe a table's columns, primary key and foreign keys",
            schema: ArgSchema::new(vec![table_arg(), schema_arg()]),
            handler: describe_table,
        },
        ToolDef {
            name: "listIndexes",
            description: "List indexes in a schema, optionally filtered to one table",
            schema: ArgSchema::new(vec![
                schema_arg(),
                ArgSpec::optional("table", ArgType::String, "Restrict to this table"),
            ]),
            handler: list_indexes,
        },
        ToolDef {
            name: "listViews",
            description: "List views in a schema",
            schema: ArgSchema::new(vec![schema_arg()]),
            handler: list_views,
        },
        ToolDef {
            name: "listExtensions",
            description: "List installed PostgreSQL extensions",
            schema: ArgSchema::empty(),
            handler: list_extensions,
        },
        ToolDef {
            name: "getTableStats",
            description: "Scan, tuple and maintenance statistics for one table",
            schema: ArgSchema::new(vec![table_arg(), schema_arg()]),
            handler: get_table_stats,
        },
    ]
}

fn schema_arg() -> ArgSpec {
    ArgSpec::with_default("schema", ArgType::String, "Schema name", json!("public"))
}

fn table_arg() -> ArgSpec {
    ArgSpec::required("table", ArgType::String, "Table name")
}

#[derive(Debug, Deserialize)]
struct SchemaInput {
    schema: String,
}

#[derive(Debug, Deserialize)]
struct TableInput {
    table: String,
    schema: String,
}

fn list_schemas(
    ctx: &ToolContext,
    _args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT schema_name AS name \
                 FROM information_schema.schemata \
                 WHERE schema_name NOT LIKE 'pg\\_%' \
                   AND schema_name <> 'information_schema' \
                 ORDER BY schema_name",
                &[],
                QueryOptions::default(),
            )
            .await?;
        Ok(json!({ "schemas": outcome.rows, "count": outcome.row_count }))
    })
}

fn list_tables(ctx: &ToolContext, args: Map<String, Value>) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let input: SchemaInput = parse_args("listTables", args)?;
        sanitize_identifier(&input.schema)?;
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT c.relname AS name, \
                        pg_total_relation_size(c.oid) AS total_size_bytes, \
                        pg_relation_size(c.oid) AS data_size_bytes, \
                        c.reltuples::bigint AS estimated_rows \
                 FROM pg_class c \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1 AND c.relkind = 'r' \
                 ORDER BY c.relname",
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

fn describe_table(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let input: TableInput = parse_args("describeTable", args)?;
        sanitize_identifier(&input.table)?;
        sanitize_identifier(&input.schema)?;
        let params = [
            QueryParam::String(input.schema.clone()),
            QueryParam::String(input.table.clone()),
        ];

        let columns = ctx
            .executor
            .execute_query(
                "SELECT column_name AS name, data_type, is_nullable = 'YES' AS nullable, \
                        column_default AS \"default\", character_maximum_length AS max_length \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                &params,
                QueryOptions::default(),
            )
            .await?;

        let primary_key = ctx
            .executor
            .execute_query(
                "SELECT a.attname AS \"column\" \
                 FROM pg_index i \
                 JOIN pg_class c ON c.oid = i.indrelid \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(i.indkey) \
                 WHERE n.nspname = $1 AND c.relname = $2 AND i.indisprimary \
                 ORDER BY a.attnum",
                &params,
                QueryOptions::default(),
            )
            .await?;

        let foreign_keys = ctx
            .executor
            .execute_query(
                "SELECT tc.constraint_name AS name, kcu.column_name AS \"column\", \
                        ccu.table_schema AS references_schema, \
                        ccu.table_name AS references_table, \
                        ccu.column_name AS references_column \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON kcu.constraint_name = tc.constraint_name \
                  AND kcu.table_schema = tc.table_schema \
                 JOIN information_schema.constraint_column_usage ccu \
                   ON ccu.constraint_name = tc.constraint_name \
                 WHERE tc.constraint_type = 'FOREIGN KEY' \
                   AND tc.table_schema = $1 AND tc.table_name = $2",
                &params,
                QueryOptions::default(),
            )
            .await?;

        let pk_columns: Vec<Value> = primary_key
            .rows
            .into_iter()
            .filter_map(|mut r| r.remove("column"))
            .collect();

        Ok(json!({
            "schema": input.schema,
            "table": input.table,
            "columns": columns.rows,
            "primary_key": pk_columns,
            "foreign_keys": foreign_keys.rows,
        }))
    })
}

fn list_indexes(ctx: &ToolContext, args: Map<String, Value>) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        #[derive(Debug, Deserialize)]
        struct Input {
            schema: String,
            table: Option<String>,
        }
        let input: Input = parse_args("listIndexes", args)?;
        sanitize_identifier(&input.schema)?;

        let (sql, params) = match &input.table {
            Some(table) => {
                sanitize_identifier(table)?;
                (
                    "SELECT i.indexname AS name, i.tablename AS \"table\", i.indexdef AS definition, \
                            pg_relation_size(format('%I.%I', i.schemaname, i.indexname)::regclass) AS size_bytes \
                     FROM pg_indexes i \
                     WHERE i.schemaname = $1 AND i.tablename = $2 \
                     ORDER BY i.indexname",
                    vec![
                        QueryParam::String(input.schema.clone()),
                        QueryParam::String(table.clone()),
                    ],
                )
            }
            None => (
                "SELECT i.indexname AS name, i.tablename AS \"table\", i.indexdef AS definition, \
                        pg_relation_size(format('%I.%I', i.schemaname, i.indexname)::regclass) AS size_bytes \
                 FROM pg_indexes i \
                 WHERE i.schemaname = $1 \
                 ORDER BY i.tablename, i.indexname",
                vec![QueryParam::String(input.schema.clone())],
            ),
        };

        let outcome = ctx
            .executor
            .execute_query(sql, &params, QueryOptions::default())
            .await?;
        Ok(json!({
            "schema": input.schema,
            "count": outcome.row_count,
            "indexes": outcome.rows,
        }))
    })
}

fn list_views(ctx: &ToolContext, args: Map<String, Value>) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let input: SchemaInput = parse_args("listViews", args)?;
        sanitize_identifier(&input.schema)?;
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT table_name AS name, view_definition AS definition \
                 FROM information_schema.views \
                 WHERE table_schema = $1 \
                 ORDER BY table_name",
                &[QueryParam::String(input.schema.clone())],
                QueryOptions::default(),
            )
            .await?;
        Ok(json!({
            "schema": input.schema,
            "count": outcome.row_count,
            "views": outcome.rows,
        }))
    })
}

fn list_extensions(
    ctx: &ToolContext,
    _args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT extname AS name, extversion AS version \
                 FROM pg_extension ORDER BY extname",
                &[],
                QueryOptions::default(),
            )
            .await?;
        Ok(json!({ "extensions": outcome.rows, "count": outcome.row_count }))
    })
}

fn get_table_stats(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let input: TableInput = parse_args("getTableStats", args)?;
        sanitize_identifier(&input.table)?;
        sanitize_identifier(&input.schema)?;

        let outcome = ctx
            .executor
            .execute_query(
                "SELECT s.seq_scan, s.idx_scan, s.n_live_tup, s.n_dead_tup, \
                        s.n_tup_ins, s.n_tup_upd, s.n_tup_del, \
                        s.last_vacuum::text, s.last_autovacuum::text, \
                        s.last_analyze::text, s.last_autoanalyze::text, \
                        pg_total_relation_size(s.relid) AS total_size_bytes, \
                        pg_indexes_size(s.relid) AS index_size_bytes \
                 FROM pg_stat_user_tables s \
                 WHERE s.schemaname = $1 AND s.relname = $2",
                &[
                    QueryParam::String(input.schema.clone()),
                    QueryParam::String(input.table.clone()),
                ],
                QueryOptions::default(),
            )
            .await?;

        let mut stats = outcome
            .rows
            .into_iter()
            .next()
            .unwrap_or_default();
        if let Some(bytes) = stats.get("total_size_bytes").and_then(Value::as_u64) {
            stats.insert("total_size".to_string(), json!(format_size(bytes)));
        }
        Ok(json!({
            "schema": input.schema,
            "table": input.table,
            "stats": stats,
        }))
    })
}
