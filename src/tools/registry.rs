use crate::providers::base::ToolDefinition;
use crate::tools::base::{ExecutionContext, SubagentAccess, Tool, ToolCapabilities, ToolMiddleware, ToolResult};
use anyhow::Result;
use lru::LruCache;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&canonical_value(value)).unwrap_or_default()
}

fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonical_value(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}

const DEFAULT_CACHE_MAX_ENTRIES: usize = 128;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_MAX_RESULT_CHARS: usize = 10_000;

struct CachedResult {
    result: ToolResult,
    cached_at: Instant,
}

/// Name-keyed mapping of tools populated once at driver startup and treated
/// as immutable thereafter within a run.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    middleware: Vec<Arc<dyn ToolMiddleware>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            middleware: vec![
                Arc::new(TruncationMiddleware::new(DEFAULT_MAX_RESULT_CHARS)),
                Arc::new(CacheMiddleware::new(
                    DEFAULT_CACHE_MAX_ENTRIES,
                    DEFAULT_CACHE_TTL_SECS,
                )),
                Arc::new(LoggingMiddleware),
            ],
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if name.is_empty() || name.len() > 256 || name.chars().any(char::is_control) {
            warn!("tool registry: rejecting tool with invalid name '{}'", name);
            return;
        }
        if self.tools.contains_key(&name) {
            warn!("tool registry: overwriting duplicate tool '{}'", name);
        }
        self.tools.insert(name, tool);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Return a view hiding `exclude` without mutating this registry.
    ///
    /// Used by the subagent manager to strip `spawn_subagent` (and any other
    /// main-only tool) from the registry handed to a background worker.
    pub fn subset(self: &Arc<Self>, exclude: &HashSet<String>) -> ToolRegistryView {
        ToolRegistryView {
            parent: self.clone(),
            exclude: exclude.clone(),
            on_call: None,
        }
    }

    /// Execute a tool through the full middleware pipeline:
    /// 1. `before_execute` (any middleware may short-circuit with a result)
    /// 2. spawn in a `tokio::task` with timeout + panic guard
    /// 3. `after_execute` (truncation, caching, logging)
    pub async fn execute(&self, name: &str, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Tool '{}' not found", name))?
            .clone();

        for mw in &self.middleware {
            if let Some(result) = mw.before_execute(name, &params, ctx, tool.as_ref()).await {
                return Ok(result);
            }
        }

        let mut result = self.execute_with_guards(name, tool.clone(), params.clone(), ctx).await?;

        for mw in &self.middleware {
            mw.after_execute(name, &params, ctx, tool.as_ref(), &mut result).await;
        }

        Ok(result)
    }

    async fn execute_with_guards(
        &self,
        name: &str,
        tool: Arc<dyn Tool>,
        params: Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolResult> {
        let tool_name = name.to_string();
        let ctx = ctx.clone();
        let timeout = tool.execution_timeout();
        let timeout_secs = timeout.as_secs();

        let handle = tokio::task::spawn(async move {
            tokio::time::timeout(timeout, tool.execute(params, &ctx)).await
        });

        match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                warn!("Tool '{}' timed out after {}s", tool_name, timeout_secs);
                Ok(ToolResult::error(format!(
                    "Tool '{}' timed out after {}s",
                    tool_name, timeout_secs
                )))
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    let panic_payload = join_err.into_panic();
                    let panic_msg = panic_payload
                        .downcast_ref::<String>()
                        .map(String::as_str)
                        .or_else(|| panic_payload.downcast_ref::<&str>().copied())
                        .unwrap_or("unknown cause");
                    error!("Tool '{}' panicked: {}", tool_name, panic_msg);
                    Ok(ToolResult::error(format!(
                        "Tool '{}' crashed: {}",
                        tool_name, panic_msg
                    )))
                } else {
                    Err(anyhow::anyhow!("Tool '{}' was cancelled", tool_name))
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Names of a tool's declared read-only actions, per its `capabilities()`.
fn read_only_action_names(caps: &ToolCapabilities) -> Vec<&'static str> {
    caps.actions.iter().filter(|a| a.read_only).map(|a| a.name).collect()
}

/// Narrow a tool's `action` enum in its parameters schema to `allowed`.
fn filter_action_enum(schema: &Value, allowed: &[&str]) -> Value {
    let mut filtered = schema.clone();
    if let Some(Value::Array(arr)) = filtered.get_mut("properties").and_then(|p| p.get_mut("action")).and_then(|a| a.get_mut("enum")) {
        arr.retain(|v| v.as_str().is_some_and(|s| allowed.contains(&s)));
    }
    filtered
}

/// Called with `(name, params, result)` after a tool actually executes
/// through a [`ToolRegistryView`]. Used by the subagent manager to feed its
/// per-worker activity log without the registry depending on it directly.
pub type ToolCallHook = Arc<dyn Fn(&str, &Value, &ToolResult) + Send + Sync>;

/// A non-mutating view over a parent registry that hides an excluded set of
/// tool names, plus honors each tool's `SubagentAccess`: `Denied` tools are
/// invisible, `ReadOnly` tools expose (and may only be called with) their
/// read-only actions, `Full` tools pass through unchanged.
pub struct ToolRegistryView {
    parent: Arc<ToolRegistry>,
    exclude: HashSet<String>,
    on_call: Option<ToolCallHook>,
}

impl ToolRegistryView {
    /// Attach a hook invoked after each tool call this view executes.
    pub fn with_tool_call_hook(mut self, hook: ToolCallHook) -> Self {
        self.on_call = Some(hook);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        if self.exclude.contains(name) {
            return None;
        }
        let tool = self.parent.lookup(name)?;
        match tool.capabilities().subagent_access {
            SubagentAccess::Denied => None,
            SubagentAccess::ReadOnly if read_only_action_names(&tool.capabilities()).is_empty() => None,
            SubagentAccess::ReadOnly | SubagentAccess::Full => Some(tool),
        }
    }

    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.parent
            .list_definitions()
            .into_iter()
            .filter(|d| !self.exclude.contains(&d.name))
            .filter_map(|d| {
                let tool = self.parent.lookup(&d.name)?;
                match tool.capabilities().subagent_access {
                    SubagentAccess::Denied => None,
                    SubagentAccess::ReadOnly => {
                        let allowed = read_only_action_names(&tool.capabilities());
                        if allowed.is_empty() {
                            return None;
                        }
                        Some(ToolDefinition {
                            parameters: filter_action_enum(&d.parameters, &allowed),
                            ..d
                        })
                    }
                    SubagentAccess::Full => Some(d),
                }
            })
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.list_definitions().into_iter().map(|d| d.name).collect()
    }

    pub async fn execute(&self, name: &str, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        if self.exclude.contains(name) {
            return Ok(ToolResult::error(format!(
                "Tool '{}' is not available in this context",
                name
            )));
        }
        let Some(tool) = self.parent.lookup(name) else {
            return self.dispatch(name, params, ctx).await;
        };
        match tool.capabilities().subagent_access {
            SubagentAccess::Denied => Ok(ToolResult::error(format!(
                "Tool '{}' is not available in this context",
                name
            ))),
            SubagentAccess::ReadOnly => {
                let allowed = read_only_action_names(&tool.capabilities());
                if allowed.is_empty() {
                    return Ok(ToolResult::error(format!(
                        "Tool '{}' is not available in this context",
                        name
                    )));
                }
                if let Some(action) = params.get("action").and_then(|a| a.as_str())
                    && !allowed.contains(&action)
                {
                    return Ok(ToolResult::error(format!(
                        "action '{}' is not available in this context (read-only access)",
                        action
                    )));
                }
                self.dispatch(name, params, ctx).await
            }
            SubagentAccess::Full => self.dispatch(name, params, ctx).await,
        }
    }

    async fn dispatch(&self, name: &str, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let result = self.parent.execute(name, params.clone(), ctx).await;
        if let (Some(hook), Ok(result)) = (&self.on_call, &result) {
            hook(name, &params, result);
        }
        result
    }
}

// --- Middleware implementations ---

pub struct CacheMiddleware {
    cache: Mutex<LruCache<String, CachedResult>>,
    ttl_secs: u64,
}

impl CacheMiddleware {
    pub fn new(max_entries: usize, ttl_secs: u64) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(max_entries).expect("cache max_entries must be > 0"),
            )),
            ttl_secs,
        }
    }
}

#[async_trait::async_trait]
impl ToolMiddleware for CacheMiddleware {
    async fn before_execute(
        &self,
        name: &str,
        params: &Value,
        _ctx: &ExecutionContext,
        tool: &dyn Tool,
    ) -> Option<ToolResult> {
        if !tool.cacheable() {
            return None;
        }
        let cache_key = format!("{}:{}", name, canonical_json(params));
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(&cache_key) {
            if cached.cached_at.elapsed().as_secs() < self.ttl_secs {
                debug!("Cache hit for tool '{}'", name);
                return Some(cached.result.clone());
            }
            cache.pop(&cache_key);
        }
        None
    }

    async fn after_execute(
        &self,
        name: &str,
        params: &Value,
        _ctx: &ExecutionContext,
        tool: &dyn Tool,
        result: &mut ToolResult,
    ) {
        if !tool.cacheable() || result.is_error {
            return;
        }
        let cache_key = format!("{}:{}", name, canonical_json(params));
        let mut cache = self.cache.lock().await;
        cache.put(
            cache_key,
            CachedResult {
                result: result.clone(),
                cached_at: Instant::now(),
            },
        );
    }
}

pub struct TruncationMiddleware {
    max_chars: usize,
}

impl TruncationMiddleware {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait::async_trait]
impl ToolMiddleware for TruncationMiddleware {
    async fn after_execute(
        &self,
        _name: &str,
        _params: &Value,
        _ctx: &ExecutionContext,
        _tool: &dyn Tool,
        result: &mut ToolResult,
    ) {
        result.content = crate::tools::truncation::truncate_tool_result(&result.content, self.max_chars);
    }
}

pub struct LoggingMiddleware;

#[async_trait::async_trait]
impl ToolMiddleware for LoggingMiddleware {
    async fn before_execute(
        &self,
        name: &str,
        params: &Value,
        _ctx: &ExecutionContext,
        _tool: &dyn Tool,
    ) -> Option<ToolResult> {
        debug!("Executing tool: {} with arguments: {}", name, params);
        None
    }

    async fn after_execute(
        &self,
        name: &str,
        _params: &Value,
        _ctx: &ExecutionContext,
        _tool: &dyn Tool,
        result: &mut ToolResult,
    ) {
        if result.is_error {
            warn!("Tool '{}' returned error: {}", name, result.content);
        } else {
            info!("Tool '{}' completed ({} chars)", name, result.content.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({})
        }
        async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
            Ok(ToolResult::new(params.to_string()))
        }
    }

    struct SpawnStub;

    #[async_trait]
    impl Tool for SpawnStub {
        fn name(&self) -> &str {
            "spawn_subagent"
        }
        fn description(&self) -> &str {
            "spawn"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({})
        }
        async fn execute(&self, _params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
            Ok(ToolResult::new("spawned"))
        }
    }

    #[tokio::test]
    async fn execute_runs_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let ctx = ExecutionContext::default();
        let result = registry.execute("echo", serde_json::json!({"a": 1}), &ctx).await.unwrap();
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn subset_hides_excluded_tool_without_mutating_parent() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(SpawnStub));
        let registry = Arc::new(registry);

        let mut exclude = HashSet::new();
        exclude.insert("spawn_subagent".to_string());
        let view = registry.subset(&exclude);

        assert!(view.lookup("spawn_subagent").is_none());
        assert!(view.lookup("echo").is_some());
        // parent is untouched
        assert!(registry.lookup("spawn_subagent").is_some());
    }

    #[tokio::test]
    async fn subset_execute_rejects_excluded_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SpawnStub));
        let registry = Arc::new(registry);
        let mut exclude = HashSet::new();
        exclude.insert("spawn_subagent".to_string());
        let view = registry.subset(&exclude);
        let ctx = ExecutionContext::default();
        let result = view.execute("spawn_subagent", serde_json::json!({}), &ctx).await.unwrap();
        assert!(result.is_error);
    }

    struct DeniedTool;

    #[async_trait]
    impl Tool for DeniedTool {
        fn name(&self) -> &str {
            "secrets"
        }
        fn description(&self) -> &str {
            "reads secrets"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({})
        }
        async fn execute(&self, _params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
            Ok(ToolResult::new("top secret"))
        }
        fn capabilities(&self) -> ToolCapabilities {
            ToolCapabilities {
                subagent_access: SubagentAccess::Denied,
                ..Default::default()
            }
        }
    }

    struct FileTool;

    #[async_trait]
    impl Tool for FileTool {
        fn name(&self) -> &str {
            "file"
        }
        fn description(&self) -> &str {
            "file ops. Actions: read, write"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({"properties": {"action": {"enum": ["read", "write"]}}})
        }
        async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
            Ok(ToolResult::new(params.to_string()))
        }
        fn capabilities(&self) -> ToolCapabilities {
            ToolCapabilities {
                subagent_access: SubagentAccess::ReadOnly,
                actions: vec![
                    crate::tools::base::ActionDescriptor { name: "read", read_only: true },
                    crate::tools::base::ActionDescriptor { name: "write", read_only: false },
                ],
                ..Default::default()
            }
        }
    }

    #[tokio::test]
    async fn subset_hides_denied_tool_entirely() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(DeniedTool));
        let registry = Arc::new(registry);
        let view = registry.subset(&HashSet::new());

        assert!(view.lookup("secrets").is_none());
        assert!(view.list_definitions().is_empty());
        let ctx = ExecutionContext::default();
        let result = view.execute("secrets", serde_json::json!({}), &ctx).await.unwrap();
        assert!(result.is_error);
        // Parent registry is unaffected.
        assert!(registry.lookup("secrets").is_some());
    }

    #[tokio::test]
    async fn subset_restricts_read_only_tool_to_its_read_only_action() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FileTool));
        let registry = Arc::new(registry);
        let view = registry.subset(&HashSet::new());

        let defs = view.list_definitions();
        let def = defs.iter().find(|d| d.name == "file").unwrap();
        let enum_values = def.parameters["properties"]["action"]["enum"].as_array().unwrap();
        assert_eq!(enum_values.len(), 1);
        assert_eq!(enum_values[0], "read");

        let ctx = ExecutionContext::default();
        let ok = view.execute("file", serde_json::json!({"action": "read"}), &ctx).await.unwrap();
        assert!(!ok.is_error);

        let denied = view.execute("file", serde_json::json!({"action": "write"}), &ctx).await.unwrap();
        assert!(denied.is_error);
    }
}
