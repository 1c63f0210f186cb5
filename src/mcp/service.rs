//! MCP service implementation using rmcp.
//!
//! `PgService` implements `ServerHandler` by hand: the tool catalog is
//! derived from the registry's declared argument schemas and every call is
//! forwarded to the dispatcher, so the protocol layer carries no tool
//! semantics of its own.

use crate::dispatch::Dispatcher;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct PgService {
    dispatcher: Arc<Dispatcher>,
}

impl PgService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl ServerHandler for PgService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "pg-mcp-server".to_owned(),
                title: Some("PostgreSQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "PostgreSQL introspection and maintenance tools.\n\
                \n\
                ## Workflow\n\
                1. Call `listSchemas` and `listTables` to discover the database layout\n\
                2. Use `describeTable` and the stats tools to inspect objects\n\
                3. `executeQuery` runs ad-hoc SQL, gated by the server's access mode\n\
                \n\
                ## Access Modes\n\
                - **read-only** (default): SELECT, EXPLAIN and WITH statements only\n\
                - **read-write**: additionally DML, DDL and maintenance (VACUUM, ANALYZE, REINDEX)\n\
                \n\
                ## Safety\n\
                - Identifiers are validated; SQL comments and stacked statements are rejected\n\
                - Results are capped at the configured row limit and statements at the timeout\n\
                - `safeDelete`/`safeUpdate` refuse whole-table conditions unless `allowEmptyWhere` is set"
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self
            .dispatcher
            .registry()
            .iter()
            .map(|def| Tool {
                name: def.name.into(),
                title: None,
                description: Some(def.description.into()),
                input_schema: Arc::new(def.schema.to_json_schema()),
                output_schema: None,
                annotations: None,
                icons: None,
                meta: None,
            })
            .collect();
        Ok(ListToolsResult {
            next_cursor: None,
            tools,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request.arguments.unwrap_or_default();
        Ok(self.dispatcher.dispatch(&request.name, arguments).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccessMode, Config};
    use crate::db::{PoolManager, QueryExecutor};
    use crate::limiter::RateLimiter;
    use crate::registry::{Registry, ToolContext};
    use crate::tools;
    use std::time::Duration;

    fn create_test_service() -> PgService {
        let config = Config {
            database_uri: "postgres://nobody@127.0.0.1:1/none".to_string(),
            ..Config::default_config()
        };
        let pool = PoolManager::connect_lazy(&config).expect("lazy pool");
        let executor =
            QueryExecutor::new(pool, AccessMode::ReadOnly, Duration::from_secs(1), 100);
        let registry = Registry::build(tools::all_tables()).expect("registry");
        let dispatcher = Dispatcher::new(
            registry,
            ToolContext {
                executor,
                limiter: Arc::new(RateLimiter::disabled()),
            },
        );
        PgService::new(Arc::new(dispatcher))
    }

    #[tokio::test]
    async fn test_server_info() {
        let service = create_test_service();
        let info = service.get_info();
        assert_eq!(info.server_info.name, "pg-mcp-server");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.is_some());
    }

    #[tokio::test]
    async fn test_catalog_covers_registry() {
        let service = create_test_service();
        let names = service.dispatcher().registry().names();
        assert!(names.contains(&"listTables"));
        assert!(names.contains(&"executeQuery"));
        assert!(names.contains(&"vacuumTable"));
        assert!(names.contains(&"serverInfo"));
    }
}
