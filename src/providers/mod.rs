pub mod base;
pub mod mock;

pub use base::{
    ChatRequest, ChatStreamEvent, LLMProvider, LLMResponse, Message, RetryConfig, ToolCallRequest,
    ToolDefinition,
};
pub use mock::MockProvider;
