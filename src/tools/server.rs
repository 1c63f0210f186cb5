//! Server information tool.

use crate::db::QueryOptions;
use crate::error::ServerResult;
use crate::registry::{ArgSchema, ToolContext, ToolDef};
use futures_util::future::BoxFuture;
use serde_json::{Map, Value, json};

pub fn tools() -> Vec<ToolDef> {
    vec![ToolDef {
        name: "serverInfo",
        description: "Server version, access mode, pool status and rate limiter state",
        schema: ArgSchema::empty(),
        handler: server_info,
    }]
}

fn server_info(ctx: &ToolContext, _args: Map<String, Value>) -> BoxFuture<'_, ServerResult<Value>> {
    Box::pin(async move {
        let outcome = ctx
            .executor
            .execute_query(
                "SELECT version() AS server_version, \
                        current_database() AS database, \
                        current_user AS \"user\"",
                &[],
                QueryOptions::default(),
            )
            .await?;
        let server = outcome.rows.into_iter().next().unwrap_or_default();
        Ok(json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "mode": ctx.executor.mode().to_string(),
            "pool": ctx.executor.pool().stats(),
            "rate_limiter": ctx.limiter.stats(),
            "server": server,
        }))
    })
}
