//! Context compression (C3): shrinks a message history that has grown past
//! a model's comfortable window by summarizing the old middle and leaving
//! system messages and the recent tail untouched.

use crate::providers::base::{ChatRequest, LLMProvider, Message};
use std::sync::Arc;
use tracing::{debug, warn};

const SUMMARIZER_SYSTEM_PROMPT: &str = "You are summarizing a conversation history for an AI agent. \
Produce a concise prose summary that preserves key decisions, tool calls and their outcomes, and the \
current state of any in-progress task. Do not include preamble, just the summary.";

const COMPACTION_MAX_TOKENS: u32 = 2000;
const COMPACTION_TEMPERATURE: f32 = 0.3;

fn format_for_summary(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("[{}]: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compress `messages` for `model` if, and only if, `should_compress` says
/// the conversation has crossed `threshold` of the model's context window.
/// Returns the input unchanged otherwise. Never fails — a summarizer error
/// falls back to a sentinel message rather than propagating to the caller.
pub async fn maybe_compress(
    messages: &[Message],
    model: &str,
    provider: &dyn LLMProvider,
    threshold: f64,
    keep_recent: usize,
) -> Vec<Message> {
    if !crate::accounting::should_compress(messages, model, threshold) {
        return messages.to_vec();
    }

    let system: Vec<Message> = messages.iter().filter(|m| m.role == "system").cloned().collect();
    let rest: Vec<Message> = messages.iter().filter(|m| m.role != "system").cloned().collect();

    if rest.len() <= keep_recent {
        return messages.to_vec();
    }

    let split_at = rest.len() - keep_recent;
    let old_middle = &rest[..split_at];
    let recent_tail = &rest[split_at..];

    debug!(
        "compaction: summarizing {} of {} non-system messages",
        old_middle.len(),
        rest.len()
    );

    let summary_message = match summarize(provider, model, old_middle).await {
        Ok(summary) => Message {
            role: "system".into(),
            content: format!(
                "[CONVERSATION SUMMARY — {} messages compressed]\n\n{}",
                old_middle.len(),
                summary
            ),
            metadata: Some(serde_json::json!({ "compressed": true })),
            ..Message::system(String::new())
        },
        Err(e) => {
            warn!("compaction: summarizer call failed, using sentinel: {}", e);
            Message::system(format!("[{} messages removed due to context limits]", old_middle.len()))
        }
    };

    let mut result = system;
    result.push(summary_message);
    result.extend(recent_tail.iter().cloned());
    result
}

async fn summarize(provider: &dyn LLMProvider, model: &str, messages: &[Message]) -> anyhow::Result<String> {
    let prompt = vec![Message::system(SUMMARIZER_SYSTEM_PROMPT), Message::user(format_for_summary(messages))];

    let response = provider
        .chat(ChatRequest {
            messages: prompt,
            tools: None,
            model: Some(model),
            max_tokens: COMPACTION_MAX_TOKENS,
            temperature: COMPACTION_TEMPERATURE,
        })
        .await?;

    let summary = response.content.unwrap_or_default();
    if summary.trim().is_empty() {
        anyhow::bail!("summarizer returned an empty response");
    }
    Ok(summary)
}

/// Convenience wrapper bundling a provider and model so callers (the
/// driver) don't need to thread both through every call site.
pub struct Compressor {
    provider: Arc<dyn LLMProvider>,
    model: String,
    threshold: f64,
    keep_recent: usize,
}

impl Compressor {
    pub fn new(provider: Arc<dyn LLMProvider>, model: String, threshold: f64, keep_recent: usize) -> Self {
        Self {
            provider,
            model,
            threshold,
            keep_recent,
        }
    }

    pub async fn maybe_compress(&self, messages: &[Message]) -> Vec<Message> {
        maybe_compress(messages, &self.model, self.provider.as_ref(), self.threshold, self.keep_recent).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProvider;

    fn long_history(n: usize) -> Vec<Message> {
        let mut messages = vec![Message::system("be helpful")];
        for i in 0..n {
            messages.push(Message::user(format!("message number {i} {}", "x".repeat(50))));
        }
        messages
    }

    #[tokio::test]
    async fn leaves_short_conversation_untouched() {
        let provider = MockProvider::text("summary");
        let messages = vec![Message::user("hi")];
        let result = maybe_compress(&messages, "mock-model", &provider, 0.80, 10).await;
        assert_eq!(result.len(), messages.len());
    }

    #[tokio::test]
    async fn compresses_when_over_threshold() {
        let provider = MockProvider::text("the user asked several questions about rust");
        let messages = long_history(400);
        let before = crate::accounting::count(&messages, "mock-model");

        let result = maybe_compress(&messages, "mock-model", &provider, 0.80, 5).await;
        let after = crate::accounting::count(&result, "mock-model");

        assert!(after < before, "compression must strictly reduce token count");
        assert!(result.iter().any(|m| m.content.contains("CONVERSATION SUMMARY")));
        // system message + summary + keep_recent tail
        assert_eq!(result.len(), 1 + 1 + 5);
    }

    #[tokio::test]
    async fn falls_back_to_sentinel_on_summarizer_failure() {
        struct FailingProvider;
        #[async_trait::async_trait]
        impl LLMProvider for FailingProvider {
            async fn chat(&self, _req: ChatRequest<'_>) -> anyhow::Result<crate::providers::base::LLMResponse> {
                anyhow::bail!("provider unavailable")
            }
            fn default_model(&self) -> &str {
                "failing"
            }
        }

        let provider = FailingProvider;
        let messages = long_history(400);
        let result = maybe_compress(&messages, "mock-model", &provider, 0.80, 5).await;
        assert!(result.iter().any(|m| m.content.contains("removed due to context limits")));
    }

    #[tokio::test]
    async fn keeps_recent_tail_content_intact() {
        let provider = MockProvider::text("summary text");
        let messages = long_history(400);
        let result = maybe_compress(&messages, "mock-model", &provider, 0.80, 5).await;
        let tail: Vec<&str> = result[result.len() - 5..].iter().map(|m| m.content.as_str()).collect();
        let original_tail: Vec<&str> = messages[messages.len() - 5..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(tail, original_tail);
    }
}
