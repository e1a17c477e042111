use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::types::ToolCall;

pub type ID = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  System,
  User,
  Assistant,
  Tool,
}

/// One entry of a conversation, in the shape providers accept on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub role: Role,
  pub content: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tool_calls: Vec<ToolInvocation>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tool_call_id: Option<String>,
}

impl Message {
  pub fn system(content: impl Into<String>) -> Self {
    Self::plain(Role::System, content)
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self::plain(Role::User, content)
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self::plain(Role::Assistant, content)
  }

  pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      role: Role::Tool,
      content: content.into(),
      tool_calls: Vec::new(),
      tool_call_id: Some(tool_call_id.into()),
    }
  }

  fn plain(role: Role, content: impl Into<String>) -> Self {
    Self { role, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
  }
}

/// A model-emitted request to run a named tool. Serialized as an OpenAI `tool_calls` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ToolCall", into = "ToolCall")]
pub struct ToolInvocation {
  pub id: ID,
  pub name: String,
  pub raw_arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
  pub path: String,
  pub is_directory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
  pub date: String, // RFC3339
  pub model_id: String,
  pub tokens: u64,
  pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
  pub id: ID,
  pub name: String,
  pub description: String,
  pub persona: String,
  pub system_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
  pub id: ID,
  pub label: String,
  pub api_key: String,
  pub url: Option<String>,
}

pub fn new_id() -> ID {
  Uuid::new_v4().to_string()
}

pub fn now_iso() -> String {
  let t = time::OffsetDateTime::now_utc();
  t.format(&time::format_description::well_known::Rfc3339)
    .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
