use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    /// Opaque reasoning/thinking trace. Passed through untouched on
    /// subsequent calls; never re-tokenized or interpreted, only its length
    /// is charged in token accounting.
    pub reasoning_content: Option<String>,
}

impl LLMResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Message {
    pub id: String,
    pub role: String,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    pub tool_call_id: Option<String>,
    pub is_error: bool,
    pub reasoning_content: Option<String>,
    pub metadata: Option<Value>,
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: "system".into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: "user".into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCallRequest>>) -> Self {
        Self {
            id: new_message_id(),
            role: "assistant".into(),
            content: content.into(),
            tool_calls,
            ..Default::default()
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            id: new_message_id(),
            role: "tool".into(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            is_error,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub model: Option<&'a str>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// One event in the streaming chat-completion protocol. Tagged sum type, per
/// the "tagged message kinds" design note, rather than class-sniffing.
#[derive(Debug, Clone)]
pub enum ChatStreamEvent {
    TextChunk(String),
    ToolCallRequest(ToolCallRequest),
    ToolCallResult { id: String, content: String },
    Final(LLMResponse),
}

/// The core's single outbound capability: a chat-completion model.
///
/// The concrete wire format (HTTP, gRPC, local inference) is out of scope;
/// implementors own that. `chat_stream` must not buffer — it returns a
/// stream whose items are produced as the underlying transport receives
/// them, not collected and replayed.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat(&self, req: ChatRequest<'_>) -> anyhow::Result<LLMResponse>;

    fn default_model(&self) -> &str;

    /// Streaming variant. Default implementation falls back to a single
    /// buffered `chat` call wrapped as a one-item stream — adequate for
    /// providers with no native streaming support, but not the fast path.
    async fn chat_stream<'a>(&'a self, req: ChatRequest<'a>) -> anyhow::Result<BoxStream<'a, ChatStreamEvent>> {
        let response = self.chat(req).await?;
        Ok(stream::once(async move { ChatStreamEvent::Final(response) }).boxed())
    }

    async fn chat_with_retry(
        &self,
        req: ChatRequest<'_>,
        retry_config: Option<RetryConfig>,
    ) -> anyhow::Result<LLMResponse> {
        let config = retry_config.unwrap_or_default();
        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            if attempt > 0 {
                warn!(
                    "Provider retry attempt {}/{} after error: {}",
                    attempt,
                    config.max_retries,
                    last_error
                        .as_ref()
                        .map(|e: &anyhow::Error| e.to_string())
                        .unwrap_or_default()
                );
            }
            debug!("Sending chat request (attempt {})", attempt);
            let chat_req = ChatRequest {
                messages: req.messages.clone(),
                tools: req.tools.clone(),
                model: req.model,
                max_tokens: req.max_tokens,
                temperature: req.temperature,
            };
            match self.chat(chat_req).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let rate_limit_delay = e
                        .downcast_ref::<crate::errors::CoreError>()
                        .and_then(|ox| match ox {
                            crate::errors::CoreError::RateLimit { retry_after } => *retry_after,
                            _ => None,
                        });
                    let is_transient = e
                        .downcast_ref::<crate::errors::CoreError>()
                        .is_none_or(crate::errors::CoreError::is_retryable);
                    warn!("Chat request failed on attempt {}: {}", attempt, e);
                    if !is_transient {
                        return Err(e);
                    }
                    last_error = Some(e);
                    if attempt < config.max_retries {
                        let delay = if let Some(retry_secs) = rate_limit_delay {
                            retry_secs * 1000
                        } else {
                            let base = (config.initial_delay_ms as f64
                                * config.backoff_multiplier.powi(attempt as i32))
                            .min(config.max_delay_ms as f64) as u64;
                            let jitter = (base as f64 * 0.25 * fastrand::f64()) as u64;
                            base + jitter
                        };
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("All retry attempts failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_message_carries_call_id() {
        let msg = Message::tool_result("call-1", "ok", false);
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn response_has_tool_calls() {
        let resp = LLMResponse {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: "1".into(),
                name: "echo".into(),
                arguments: Value::Null,
            }],
            reasoning_content: None,
        };
        assert!(resp.has_tool_calls());
    }
}
