//! Tool-call dispatch.
//!
//! The single funnel every tool invocation passes through. Each call walks
//! lookup → argument validation → rate-limit check → handler execution, and
//! every outcome, success or failure, leaves through the same logging and
//! envelope shaping. Failures are reported in full to the caller; nothing
//! is retried here.

use crate::error::ServerError;
use crate::limiter::RateLimiter;
use crate::registry::{Registry, ToolContext};
use rmcp::model::{CallToolResult, Content};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

pub struct Dispatcher {
    registry: Registry,
    context: ToolContext,
}

impl Dispatcher {
    pub fn new(registry: Registry, context: ToolContext) -> Self {
        Self { registry, context }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.context.limiter
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Run one tool invocation end to end.
    ///
    /// Always produces a protocol result: success carries the handler's
    /// JSON value as text, failure carries `{"error": ..., "tool": ...}`
    /// with the error flag set.
    pub async fn dispatch(&self, name: &str, arguments: Map<String, Value>) -> CallToolResult {
        let invocation_id = Uuid::new_v4();
        let start = Instant::now();

        match self.run(name, &arguments).await {
            Ok(value) => {
                info!(
                    invocation_id = %invocation_id,
                    tool = name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Tool invocation succeeded"
                );
                CallToolResult::success(vec![Content::text(value.to_string())])
            }
            Err(err) => {
                error!(
                    invocation_id = %invocation_id,
                    tool = name,
                    kind = err.kind(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    error = %err,
                    "Tool invocation failed"
                );
                let envelope = serde_json::json!({
                    "error": err.to_string(),
                    "tool": name,
                });
                CallToolResult::error(vec![Content::text(envelope.to_string())])
            }
        }
    }

    async fn run(&self, name: &str, arguments: &Map<String, Value>) -> Result<Value, ServerError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ServerError::tool_not_found(name))?;

        let validated = tool.schema.validate(name, arguments)?;

        self.context.limiter.check_limit()?;

        let args_repr = Value::Object(validated.clone());
        info!(tool = name, args = %args_repr, "Invoking tool");

        (tool.handler)(&self.context, validated).await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.registry.len())
            .finish_non_exhaustive()
    }
}
