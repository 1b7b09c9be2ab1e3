use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    pub fn from_result(result: anyhow::Result<String>) -> Self {
        match result {
            Ok(content) => Self::new(content),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Context a tool executes under: which conversation produced the call, a
/// short summary of the surrounding task, and free-form metadata.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub session_id: String,
    pub context_summary: String,
    pub metadata: HashMap<String, Value>,
}

/// Whether a subagent's isolated registry view may carry a tool at all, and
/// if so, whether its full action set or only the read-only subset is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubagentAccess {
    #[default]
    Full,
    ReadOnly,
    Denied,
}

#[derive(Debug, Clone, Copy)]
pub struct ActionDescriptor {
    pub name: &'static str,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ToolCapabilities {
    pub built_in: bool,
    pub network_outbound: bool,
    pub subagent_access: SubagentAccess,
    pub actions: Vec<ActionDescriptor>,
}

/// A named, schema-described callable the model may request.
///
/// `name`/`description`/`parameters` feed the model's tool definitions;
/// `execute` runs the call. Invocation is independent of how the tool is
/// discovered — the registry only resolves names to instances.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> anyhow::Result<ToolResult>;

    fn version(&self) -> ToolVersion {
        ToolVersion::default()
    }

    fn to_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters(),
            }
        })
    }

    /// Whether identical-argument calls may be served from a result cache.
    fn cacheable(&self) -> bool {
        false
    }

    fn requires_approval(&self) -> bool {
        false
    }

    fn execution_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn capabilities(&self) -> ToolCapabilities {
        ToolCapabilities {
            built_in: true,
            network_outbound: false,
            subagent_access: SubagentAccess::Full,
            actions: vec![],
        }
    }
}

/// Cross-cutting behavior wrapped around every tool invocation: caching,
/// truncation, logging. `before_execute` may short-circuit with a cached or
/// precomputed result; `after_execute` can rewrite the result in place.
#[async_trait]
pub trait ToolMiddleware: Send + Sync {
    async fn before_execute(
        &self,
        _name: &str,
        _params: &Value,
        _ctx: &ExecutionContext,
        _tool: &dyn Tool,
    ) -> Option<ToolResult> {
        None
    }

    async fn after_execute(
        &self,
        _name: &str,
        _params: &Value,
        _ctx: &ExecutionContext,
        _tool: &dyn Tool,
        _result: &mut ToolResult,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolResult> {
            Ok(ToolResult::new(params.to_string()))
        }
    }

    #[test]
    fn schema_has_function_wrapper() {
        let schema = Echo.to_schema();
        assert_eq!(schema["function"]["name"], "echo");
    }

    #[test]
    fn default_capabilities_allow_subagents() {
        let caps = Echo.capabilities();
        assert_eq!(caps.subagent_access, SubagentAccess::Full);
    }
}
