use serde_json::Value;
use tracing::warn;

use crate::llm::{normalize_response, ChatOptions, ChatProvider};
use crate::models::Message;
use crate::repo_tools::fs::read_file;
use crate::repo_tools::ToolError;
use crate::workspace::{FileStore, KvStore};

pub const NO_SUMMARY: &str = "No summary";

pub fn summary_key(path: &str) -> String {
    format!("summary:{}", path)
}

/// Asks the model for a bullet-point summary of `path` and stores it.
pub async fn summarize_file(
    store: &dyn FileStore,
    provider: &dyn ChatProvider,
    kv: &dyn KvStore,
    model: &str,
    path: &str,
) -> Result<String, ToolError> {
    let content = read_file(store, path).await?;
    let messages = [Message::system(format!(
        "Summarize the following file in bullet points:\n\n{}",
        content
    ))];
    let options = ChatOptions { model: model.to_string(), tools: None };

    let raw = provider.chat(&messages, &options).await
        .map_err(|e| ToolError::Execution(format!("Summary request failed: {}", e)))?;
    let summary = normalize_response(&raw)
        .map_err(|e| ToolError::Execution(format!("Summary request failed: {}", e)))?
        .message
        .text();

    kv.set(&summary_key(path), Value::String(summary.clone())).await
        .map_err(|e| ToolError::Execution(format!("Cannot store summary: {}", e)))?;
    Ok(summary)
}

pub async fn get_summary(kv: &dyn KvStore, path: &str) -> String {
    match kv.get(&summary_key(path)).await {
        Ok(Some(Value::String(s))) if !s.is_empty() => s,
        Ok(_) => NO_SUMMARY.to_string(),
        Err(e) => {
            warn!(%path, error = %e, "summary lookup failed");
            NO_SUMMARY.to_string()
        }
    }
}
