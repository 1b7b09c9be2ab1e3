//! A handful of illustrative tools. Concrete tool implementations are out of
//! scope for the orchestration core (the registry treats tools as opaque
//! named callables); these exist so the driver and registry have something
//! real to exercise in tests and examples.

use crate::tools::base::{ExecutionContext, Tool, ToolCapabilities, ToolResult};
use async_trait::async_trait;
use serde_json::Value;

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back the given text. Useful for testing the tool-calling loop."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to echo back" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolResult> {
        let text = params
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(ToolResult::new(text.to_string()))
    }

    fn cacheable(&self) -> bool {
        true
    }
}

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Return the current UTC time in RFC 3339 format."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::new(chrono::Utc::now().to_rfc3339()))
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities {
            built_in: true,
            network_outbound: false,
            subagent_access: crate::tools::base::SubagentAccess::Full,
            actions: vec![],
        }
    }
}
