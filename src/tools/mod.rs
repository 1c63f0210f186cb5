//! Tool handler domains.
//!
//! Each submodule exposes one domain table of [`ToolDef`] entries; the
//! registry merges them at startup. Handlers follow a two-phase argument
//! contract: the dispatcher validates raw arguments against the declared
//! schema, then each handler deserializes the validated map into its own
//! typed input struct before touching any SQL.

pub mod analyze;
pub mod maintenance;
pub mod query;
pub mod schema;
pub mod server;
pub mod stats;

use crate::db::QueryParam;
use crate::error::{ServerError, ServerResult};
use crate::registry::ToolDef;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// All domain tables, in catalog order.
pub fn all_tables() -> Vec<Vec<ToolDef>> {
    vec![
        schema::tools(),
        query::tools(),
        stats::tools(),
        analyze::tools(),
        maintenance::tools(),
        server::tools(),
    ]
}

/// Deserialize the schema-validated argument map into a typed input struct.
pub(crate) fn parse_args<T: DeserializeOwned>(
    tool: &str,
    args: Map<String, Value>,
) -> ServerResult<T> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| ServerError::argument_schema(tool, e.to_string()))
}

/// Convert a JSON value into a bindable query parameter.
pub(crate) fn param_from_value(value: &Value) -> QueryParam {
    match value {
        Value::Null => QueryParam::Null,
        Value::Bool(b) => QueryParam::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                QueryParam::Int(i)
            } else {
                QueryParam::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => QueryParam::String(s.clone()),
        other => QueryParam::Json(other.clone()),
    }
}

/// Format bytes as a human-readable size (1024-based units).
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::WINDOWS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1 kB");
        assert_eq!(format_size(1048576), "1 MB");
    }

    #[test]
    fn test_param_from_value_variants() {
        assert!(matches!(param_from_value(&Value::Null), QueryParam::Null));
        assert!(matches!(
            param_from_value(&serde_json::json!(3)),
            QueryParam::Int(3)
        ));
        assert!(matches!(
            param_from_value(&serde_json::json!(1.25)),
            QueryParam::Float(_)
        ));
        assert!(matches!(
            param_from_value(&serde_json::json!([1, 2])),
            QueryParam::Json(_)
        ));
    }

    #[test]
    fn test_all_tables_have_unique_names() {
        let registry = crate::registry::Registry::build(all_tables()).expect("no collisions");
        assert!(registry.len() >= 20);
        assert!(registry.get("listTables").is_some());
        assert!(registry.get("safeDelete").is_some());
    }
}
