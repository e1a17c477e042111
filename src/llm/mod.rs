pub mod client;
pub mod normalize;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::Message;

pub use client::{CustomProviderClient, GatewayClient};
pub use normalize::{flatten_content, normalize_response, CanonicalMessage, CanonicalResponse, Usage};
pub use types::{ChatOptions, LlmConfig, ProviderError, ToolCall};

/// A chat-completion endpoint. Returns the raw payload; callers run it through
/// [`normalize_response`].
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<Value, ProviderError>;

    /// Whether `options.tools` reaches the model. Providers that drop it get no
    /// retry without tools.
    fn accepts_tools(&self) -> bool {
        true
    }
}
