pub mod base;
pub mod builtin;
pub mod registry;
pub mod truncation;

pub use base::{
    ActionDescriptor, ExecutionContext, SubagentAccess, Tool, ToolCapabilities, ToolMiddleware,
    ToolResult, ToolVersion,
};
pub use registry::{ToolRegistry, ToolRegistryView};
