//! Token accounting (C2): estimates how many tokens a conversation would
//! cost a given model and decides when it's time to compress.
//!
//! Token counts are estimates, not exact tokenizer output — there is no
//! tokenizer in scope here. The estimate only needs to be stable and
//! conservative enough to trigger compression before a provider's hard
//! context limit is hit.

use crate::providers::base::Message;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Fixed overhead charged per message, covering role/formatting tokens that
/// don't show up in the content string itself.
const PER_MESSAGE_OVERHEAD: usize = 4;
/// Constant charged once per request for response priming.
const RESPONSE_PRIMING: usize = 2;
/// Fallback limit for models not present in the table — conservative so an
/// unrecognized model still compresses well before it would actually fail.
const DEFAULT_MODEL_LIMIT: usize = 4096;
/// Rough characters-per-token ratio used to turn string lengths into a token
/// estimate. 4 is the commonly quoted average for English text.
const CHARS_PER_TOKEN: usize = 4;

static MODEL_LIMITS: LazyLock<HashMap<&'static str, usize>> = LazyLock::new(|| {
    HashMap::from([
        ("claude-opus-4-5", 200_000),
        ("claude-sonnet-4-5", 200_000),
        ("claude-haiku-4-5", 200_000),
        ("gpt-5", 128_000),
        ("gpt-5-mini", 128_000),
        ("gemini-2.5-pro", 1_000_000),
        ("gemini-2.5-flash", 1_000_000),
        ("deepseek-chat", 131_072),
        ("mock-model", 8192),
    ])
});

fn estimate_tokens(s: &str) -> usize {
    s.len().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate the total token cost of a message list for a given model.
pub fn count(messages: &[Message], _model: &str) -> usize {
    let mut total = RESPONSE_PRIMING;
    for msg in messages {
        total += PER_MESSAGE_OVERHEAD;
        total += estimate_tokens(&msg.role);
        total += estimate_tokens(&msg.content);
        if let Some(tool_calls) = &msg.tool_calls {
            for call in tool_calls {
                total += estimate_tokens(&call.name);
                total += estimate_tokens(&call.arguments.to_string());
            }
        }
        if let Some(reasoning) = &msg.reasoning_content {
            total += estimate_tokens(reasoning);
        }
    }
    total
}

/// The usable context window for a model, falling back to a conservative
/// default for models the table doesn't know about.
pub fn limit(model: &str) -> usize {
    MODEL_LIMITS.get(model).copied().unwrap_or(DEFAULT_MODEL_LIMIT)
}

/// Whether a conversation has crossed `threshold` of its model's context
/// window and should be compressed before the next request.
pub fn should_compress(messages: &[Message], model: &str, threshold: f64) -> bool {
    let used = count(messages, model);
    let cap = limit(model);
    (used as f64) >= (cap as f64) * threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_falls_back_to_default_limit() {
        assert_eq!(limit("some-experimental-model"), DEFAULT_MODEL_LIMIT);
    }

    #[test]
    fn known_model_uses_table_limit() {
        assert_eq!(limit("claude-opus-4-5"), 200_000);
    }

    #[test]
    fn empty_conversation_costs_only_priming() {
        assert_eq!(count(&[], "mock-model"), RESPONSE_PRIMING);
    }

    #[test]
    fn longer_content_costs_more_tokens() {
        let short = vec![Message::user("hi")];
        let long = vec![Message::user("a".repeat(4000))];
        assert!(count(&long, "mock-model") > count(&short, "mock-model"));
    }

    #[test]
    fn should_compress_triggers_past_threshold() {
        let messages: Vec<Message> = (0..10_000).map(|_| Message::user("x".repeat(50))).collect();
        assert!(should_compress(&messages, "mock-model", 0.80));
    }

    #[test]
    fn should_compress_false_for_small_conversation() {
        let messages = vec![Message::user("hello")];
        assert!(!should_compress(&messages, "claude-opus-4-5", 0.80));
    }
}
