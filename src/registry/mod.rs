//! Static tool registry.
//!
//! The registry is a name → (schema, handler) map built once at startup by
//! merging the per-domain tool tables from [`crate::tools`]. Construction
//! fails fast on a duplicate name; after that the registry is immutable and
//! only does lookups.

pub mod args;

pub use args::{ArgSchema, ArgSpec, ArgType};

use crate::db::QueryExecutor;
use crate::error::{ServerError, ServerResult};
use crate::limiter::RateLimiter;
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared state handed to every tool handler. The limiter lives here so
/// both the dispatcher's admission check and the server-info tool see the
/// same window.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub executor: QueryExecutor,
    pub limiter: Arc<RateLimiter>,
}

/// A tool handler: validated arguments in, JSON-serializable value out.
pub type ToolHandler = for<'a> fn(
    &'a ToolContext,
    serde_json::Map<String, serde_json::Value>,
) -> BoxFuture<'a, ServerResult<serde_json::Value>>;

/// A (name, schema, handler) triple. Immutable once registered.
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: ArgSchema,
    pub handler: ToolHandler,
}

impl std::fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Immutable name → definition map.
#[derive(Debug)]
pub struct Registry {
    tools: BTreeMap<&'static str, ToolDef>,
}

impl Registry {
    /// Merge per-domain tables into one map, failing fast on a name
    /// collision. A collision is a programming error surfaced at startup,
    /// never silently resolved last-writer-wins.
    pub fn build(tables: Vec<Vec<ToolDef>>) -> ServerResult<Self> {
        let mut tools = BTreeMap::new();
        for table in tables {
            for def in table {
                if tools.contains_key(def.name) {
                    return Err(ServerError::internal(format!(
                        "duplicate tool name '{}' in registry",
                        def.name
                    )));
                }
                tools.insert(def.name, def);
            }
        }
        Ok(Self { tools })
    }

    pub fn get(&self, name: &str) -> Option<&ToolDef> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDef> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler(
        _ctx: &ToolContext,
        _args: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'_, ServerResult<serde_json::Value>> {
        Box::pin(async { Ok(serde_json::Value::Null) })
    }

    fn def(name: &'static str) -> ToolDef {
        ToolDef {
            name,
            description: "test tool",
            schema: ArgSchema::empty(),
            handler: noop_handler,
        }
    }

    #[test]
    fn test_build_merges_tables() {
        let registry =
            Registry::build(vec![vec![def("a"), def("b")], vec![def("c")]]).expect("registry");
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["a", "b", "c"]);
        assert!(registry.get("b").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_build_rejects_duplicate_across_tables() {
        let err = Registry::build(vec![vec![def("a")], vec![def("a")]]).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate tool name 'a'"));
    }

    #[test]
    fn test_build_rejects_duplicate_within_table() {
        let err = Registry::build(vec![vec![def("x"), def("x")]]).expect_err("duplicate");
        assert!(err.to_string().contains("'x'"));
    }
}
