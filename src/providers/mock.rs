//! Deterministic in-memory provider for tests and headless runs without a
//! real model backend.

use crate::providers::base::{ChatRequest, LLMProvider, LLMResponse, ToolCallRequest};
use async_trait::async_trait;
use std::sync::Mutex;

/// One scripted response. `MockProvider` plays these back in order, then
/// repeats the last one for any further call.
pub struct MockProvider {
    responses: Mutex<Vec<LLMResponse>>,
    default_model: String,
}

impl MockProvider {
    pub fn new(responses: Vec<LLMResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            default_model: "mock-model".to_string(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(vec![LLMResponse {
            content: Some(content.into()),
            tool_calls: vec![],
            reasoning_content: None,
        }])
    }

    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::new(vec![LLMResponse {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: "mock-call-1".into(),
                name: name.into(),
                arguments,
            }],
            reasoning_content: None,
        }])
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    async fn chat(&self, _req: ChatRequest<'_>) -> anyhow::Result<LLMResponse> {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            Ok(responses.remove(0))
        } else {
            Ok(responses.first().cloned().unwrap_or_default())
        }
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::base::Message;

    #[tokio::test]
    async fn plays_back_scripted_text() {
        let provider = MockProvider::text("hello there");
        let resp = provider
            .chat(ChatRequest {
                messages: vec![Message::user("hi")],
                tools: None,
                model: None,
                max_tokens: 100,
                temperature: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(resp.content.as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn plays_back_scripted_tool_call() {
        let provider = MockProvider::tool_call("echo", serde_json::json!({"text": "hi"}));
        let resp = provider
            .chat(ChatRequest {
                messages: vec![Message::user("hi")],
                tools: None,
                model: None,
                max_tokens: 100,
                temperature: 0.0,
            })
            .await
            .unwrap();
        assert!(resp.has_tool_calls());
        assert_eq!(resp.tool_calls[0].name, "echo");
    }
}
