//! Rate limiter behavior, standalone and through the dispatcher.

use pg_mcp_server::config::{AccessMode, Config};
use pg_mcp_server::db::{PoolManager, QueryExecutor};
use pg_mcp_server::dispatch::Dispatcher;
use pg_mcp_server::limiter::RateLimiter;
use pg_mcp_server::registry::{Registry, ToolContext};
use pg_mcp_server::tools;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

fn dispatcher(limiter: RateLimiter) -> Dispatcher {
    let config = Config {
        database_uri: "postgres://nobody@127.0.0.1:1/none".to_string(),
        ..Config::default_config()
    };
    let pool = PoolManager::connect_lazy(&config).expect("lazy pool");
    let executor = QueryExecutor::new(pool, AccessMode::ReadOnly, Duration::from_secs(1), 100);
    let registry = Registry::build(tools::all_tables()).expect("registry");
    Dispatcher::new(
        registry,
        ToolContext {
            executor,
            limiter: Arc::new(limiter),
        },
    )
}

fn query_args() -> Map<String, Value> {
    match json!({"query": "SELECT 1"}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[test]
fn limiter_admits_up_to_max_then_rejects() {
    let limiter = RateLimiter::new(true, 3, Duration::from_secs(60));
    for _ in 0..3 {
        assert!(limiter.check_limit().is_ok());
    }
    assert!(limiter.check_limit().is_err());
    assert_eq!(limiter.stats().current_requests, 3);
}

#[test]
fn disabled_limiter_never_rejects() {
    let limiter = RateLimiter::disabled();
    for _ in 0..1000 {
        assert!(limiter.check_limit().is_ok());
    }
}

#[test]
fn window_expiry_frees_budget() {
    let limiter = RateLimiter::new(true, 2, Duration::from_millis(50));
    assert!(limiter.check_limit().is_ok());
    assert!(limiter.check_limit().is_ok());
    assert!(limiter.check_limit().is_err());
    std::thread::sleep(Duration::from_millis(80));
    assert!(limiter.check_limit().is_ok());
}

#[test]
fn reset_clears_the_window() {
    let limiter = RateLimiter::new(true, 1, Duration::from_secs(60));
    assert!(limiter.check_limit().is_ok());
    assert!(limiter.check_limit().is_err());
    limiter.reset();
    assert!(limiter.check_limit().is_ok());
}

#[tokio::test]
async fn dispatch_consumes_budget_even_when_the_handler_fails() {
    // The rate check runs before the handler, so failed executions still
    // count against the window.
    let d = dispatcher(RateLimiter::new(true, 2, Duration::from_secs(60)));
    for _ in 0..2 {
        let result = d.dispatch("executeQuery", query_args()).await;
        // Connection failure, not a rate failure.
        let text = result.content[0].as_text().expect("text content");
        assert!(text.text.contains("Connection error"), "{}", text.text);
    }
    let result = d.dispatch("executeQuery", query_args()).await;
    assert_eq!(result.is_error, Some(true));
    let text = result.content[0].as_text().expect("text content");
    assert!(text.text.contains("Rate limit exceeded"), "{}", text.text);
}

#[tokio::test]
async fn rejected_lookups_do_not_consume_budget() {
    let d = dispatcher(RateLimiter::new(true, 1, Duration::from_secs(60)));
    for _ in 0..10 {
        d.dispatch("notATool", Map::new()).await;
    }
    assert_eq!(d.limiter().stats().current_requests, 0);
}

#[test]
fn concurrent_callers_never_exceed_the_cap() {
    let limiter = Arc::new(RateLimiter::new(true, 50, Duration::from_secs(60)));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let limiter = limiter.clone();
        handles.push(std::thread::spawn(move || {
            let mut admitted = 0u32;
            for _ in 0..20 {
                if limiter.check_limit().is_ok() {
                    admitted += 1;
                }
            }
            admitted
        }));
    }
    let total: u32 = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .sum();
    assert_eq!(total, 50);
}
