//! End-to-end dispatch tests over the full tool registry.
//!
//! These run against a lazy pool pointing at an unreachable address:
//! anything that must fail before the database round-trip (lookup,
//! argument validation, mode gating, safety blocks) is observable without
//! a live server, and anything that does reach for a connection surfaces
//! as a connection error envelope rather than a panic.

use pg_mcp_server::config::{AccessMode, Config};
use pg_mcp_server::db::{PoolManager, QueryExecutor};
use pg_mcp_server::dispatch::Dispatcher;
use pg_mcp_server::limiter::RateLimiter;
use pg_mcp_server::registry::{Registry, ToolContext};
use pg_mcp_server::tools;
use rmcp::model::CallToolResult;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

fn dispatcher(mode: AccessMode) -> Dispatcher {
    let config = Config {
        database_uri: "postgres://nobody@127.0.0.1:1/none".to_string(),
        ..Config::default_config()
    };
    let pool = PoolManager::connect_lazy(&config).expect("lazy pool");
    let executor = QueryExecutor::new(pool, mode, Duration::from_secs(1), 100);
    let registry = Registry::build(tools::all_tables()).expect("registry");
    Dispatcher::new(
        registry,
        ToolContext {
            executor,
            limiter: Arc::new(RateLimiter::disabled()),
        },
    )
}

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn payload(result: &CallToolResult) -> Value {
    let text = result.content[0].as_text().expect("text content");
    serde_json::from_str(&text.text).expect("valid JSON payload")
}

#[tokio::test]
async fn unknown_tool_yields_error_envelope() {
    let d = dispatcher(AccessMode::ReadOnly);
    let result = d.dispatch("noSuchTool", Map::new()).await;
    assert_eq!(result.is_error, Some(true));
    let envelope = payload(&result);
    assert_eq!(envelope["tool"], "noSuchTool");
    assert!(
        envelope["error"]
            .as_str()
            .expect("message")
            .contains("Tool not found")
    );
}

#[tokio::test]
async fn unknown_argument_rejected() {
    let d = dispatcher(AccessMode::ReadOnly);
    let result = d
        .dispatch("listTables", args(json!({"shcema": "public"})))
        .await;
    assert_eq!(result.is_error, Some(true));
    let envelope = payload(&result);
    assert!(
        envelope["error"]
            .as_str()
            .expect("message")
            .contains("shcema")
    );
}

#[tokio::test]
async fn missing_required_argument_rejected() {
    let d = dispatcher(AccessMode::ReadOnly);
    let result = d.dispatch("describeTable", Map::new()).await;
    assert_eq!(result.is_error, Some(true));
    let envelope = payload(&result);
    assert!(envelope["error"].as_str().expect("message").contains("table"));
}

#[tokio::test]
async fn wrong_argument_type_rejected() {
    let d = dispatcher(AccessMode::ReadOnly);
    let result = d
        .dispatch("executeQuery", args(json!({"query": 42})))
        .await;
    assert_eq!(result.is_error, Some(true));
}

#[tokio::test]
async fn write_statement_blocked_in_read_only_mode() {
    let d = dispatcher(AccessMode::ReadOnly);
    let result = d
        .dispatch("executeQuery", args(json!({"query": "DELETE FROM users"})))
        .await;
    assert_eq!(result.is_error, Some(true));
    let envelope = payload(&result);
    assert!(
        envelope["error"]
            .as_str()
            .expect("message")
            .contains("read-only")
    );
}

#[tokio::test]
async fn stacked_statement_blocked_before_execution() {
    let d = dispatcher(AccessMode::ReadWrite);
    let result = d
        .dispatch(
            "executeQuery",
            args(json!({"query": "SELECT 1; DROP TABLE users"})),
        )
        .await;
    assert_eq!(result.is_error, Some(true));
    let envelope = payload(&result);
    assert!(
        envelope["error"]
            .as_str()
            .expect("message")
            .contains("Validation failed")
    );
}

#[tokio::test]
async fn bad_identifier_blocked_before_execution() {
    let d = dispatcher(AccessMode::ReadOnly);
    let result = d
        .dispatch(
            "countRows",
            args(json!({"table": "users; DROP TABLE users"})),
        )
        .await;
    assert_eq!(result.is_error, Some(true));
    let envelope = payload(&result);
    assert!(
        envelope["error"]
            .as_str()
            .expect("message")
            .contains("invalid identifier")
    );
}

#[tokio::test]
async fn safe_delete_blocks_trivial_condition_without_touching_database() {
    let d = dispatcher(AccessMode::ReadWrite);
    for condition in ["true", "TRUE", "1=1", " 1 = 1 ", "'1'='1'", "WHERE true", "where 1=1"] {
        let result = d
            .dispatch(
                "safeDelete",
                args(json!({"table": "orders", "where": condition})),
            )
            .await;
        // The block is a successful response, not an error: the caller is
        // told how to proceed.
        assert_ne!(result.is_error, Some(true), "errored on: {condition}");
        let value = payload(&result);
        assert_eq!(value["blocked"], true, "not blocked: {condition}");
        assert_eq!(value["table"], "orders");
    }
}

#[tokio::test]
async fn slow_queries_probe_propagates_connection_errors() {
    let d = dispatcher(AccessMode::ReadOnly);
    let result = d
        .dispatch("getSlowQueries", args(json!({"limit": 5})))
        .await;
    // An unreachable database is an error, not "extension missing".
    assert_eq!(result.is_error, Some(true));
    let value = payload(&result);
    assert!(
        value["error"]
            .as_str()
            .expect("message")
            .contains("Connection error")
    );
}

#[tokio::test]
async fn count_rows_tolerates_a_typed_where_keyword() {
    let d = dispatcher(AccessMode::ReadOnly);
    let result = d
        .dispatch(
            "countRows",
            args(json!({"table": "orders", "where": "WHERE id = 1"})),
        )
        .await;
    // Past validation: the only failure left is the unreachable database.
    assert_eq!(result.is_error, Some(true));
    let value = payload(&result);
    assert!(
        value["error"]
            .as_str()
            .expect("message")
            .contains("Connection error")
    );
}

#[tokio::test]
async fn safe_update_blocks_trivial_condition() {
    let d = dispatcher(AccessMode::ReadWrite);
    let result = d
        .dispatch(
            "safeUpdate",
            args(json!({
                "table": "orders",
                "set": {"status": "void"},
                "where": "1=1"
            })),
        )
        .await;
    assert_ne!(result.is_error, Some(true));
    let value = payload(&result);
    assert_eq!(value["blocked"], true);
}

#[tokio::test]
async fn unreachable_database_surfaces_connection_error() {
    let d = dispatcher(AccessMode::ReadOnly);
    let result = d
        .dispatch("executeQuery", args(json!({"query": "SELECT 1"})))
        .await;
    assert_eq!(result.is_error, Some(true));
    let envelope = payload(&result);
    assert!(
        envelope["error"]
            .as_str()
            .expect("message")
            .contains("Connection error")
    );
}

#[tokio::test]
async fn no_connections_leak_after_failures() {
    let d = dispatcher(AccessMode::ReadOnly);
    for _ in 0..5 {
        d.dispatch("executeQuery", args(json!({"query": "SELECT 1"})))
            .await;
    }
    assert_eq!(d.context().executor.pool().checked_out(), 0);
}

#[tokio::test]
async fn registry_exposes_all_tool_domains() {
    let d = dispatcher(AccessMode::ReadOnly);
    let names = d.registry().names();
    for expected in [
        "listSchemas",
        "listTables",
        "describeTable",
        "executeQuery",
        "explainQuery",
        "getDatabaseSize",
        "getSlowQueries",
        "findUnusedIndexes",
        "vacuumTable",
        "safeDelete",
        "serverInfo",
    ] {
        assert!(names.contains(&expected), "missing tool: {expected}");
    }
}
