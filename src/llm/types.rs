use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::{new_id, Message, ToolInvocation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default, deserialize_with = "arguments_as_string")]
    pub arguments: String,
}

fn default_call_type() -> String {
    "function".to_string()
}

// Some providers send `arguments` as an object rather than a JSON string.
fn arguments_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl From<ToolCall> for ToolInvocation {
    fn from(call: ToolCall) -> Self {
        let id = if call.id.is_empty() {
            format!("call_{}", new_id())
        } else {
            call.id
        };
        ToolInvocation {
            id,
            name: call.function.name,
            raw_arguments: call.function.arguments,
        }
    }
}

impl From<ToolInvocation> for ToolCall {
    fn from(invocation: ToolInvocation) -> Self {
        ToolCall {
            id: invocation.id,
            call_type: default_call_type(),
            function: ToolFunction {
                name: invocation.name,
                arguments: invocation.raw_arguments,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider_name: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub extra_headers: Value,
}

/// Per-call options handed to a [`ChatProvider`](crate::llm::ChatProvider).
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: String,
    pub tools: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAIChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Missing API key. Set CODESHELL_API_KEY or the api_key setting.")]
    MissingApiKey,
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// The payload arrived but carried an error or an unknown shape.
    #[error("{0}")]
    Response(String),
    #[error("Rate limited")]
    RateLimited,
}
