//! Tool-calling assistant core for a browser-hosted IDE: normalizes provider
//! replies, dispatches repository tools, applies unified diffs, and runs the
//! conversation loop that ties them together.

pub mod commands;
pub mod config;
pub mod context;
pub mod db;
pub mod llm;
pub mod models;
pub mod patch;
pub mod repo_tools;
pub mod workflows;
pub mod workspace;

#[cfg(test)]
mod test_support;

pub use commands::Assistant;
pub use config::AssistantSettings;
pub use context::{IdeContext, SharedContext};
pub use llm::{normalize_response, ChatProvider, ProviderError};
pub use models::{Message, Role, ToolInvocation, UsageRecord};
pub use patch::{apply_patch, apply_patch_text, PatchMode};
pub use repo_tools::{ToolDispatcher, ToolRequest};
pub use workflows::{ChatError, ChatOrchestrator, TurnOutcome};
