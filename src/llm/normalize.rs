//! Maps whatever a provider returned onto one canonical `{message, usage}` shape.
//!
//! Providers disagree on envelopes: OpenAI-style `choices`, Responses-style
//! `output_text`, bare `message`/`content` objects. Shapes are not mutually
//! exclusive, so recognizers run in a fixed priority order and the first match
//! wins.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::llm::types::{ProviderError, ToolCall};
use crate::models::{Role, ToolInvocation};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMessage {
    pub role: Role,
    /// Raw content as the provider sent it; see [`flatten_content`].
    pub content: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
}

impl CanonicalMessage {
    fn assistant(content: Value) -> Self {
        Self { role: Role::Assistant, content: non_null(content), tool_calls: Vec::new() }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text(&self) -> String {
        flatten_content(&self.content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalResponse {
    pub message: CanonicalMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

type Recognized = Option<Result<CanonicalResponse, ProviderError>>;
type Recognizer = fn(&Map<String, Value>) -> Recognized;

const RECOGNIZERS: &[Recognizer] = &[
    error_field,
    choices_array,
    output_text_string,
    output_string,
    message_string,
    message_object,
    content_field,
];

pub fn normalize_response(data: &Value) -> Result<CanonicalResponse, ProviderError> {
    let obj = match data {
        Value::Object(obj) => obj,
        Value::Null => return Err(ProviderError::Response("Empty provider response".to_string())),
        _ => return Err(unrecognized()),
    };

    RECOGNIZERS
        .iter()
        .find_map(|recognize| recognize(obj))
        .unwrap_or_else(|| Err(unrecognized()))
}

/// Reduces string, segment-array, or object content to one string.
pub fn flatten_content(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(segments) => segments
            .iter()
            .map(|segment| match segment {
                Value::String(s) => s.as_str(),
                other => text_field(other).unwrap_or(""),
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        Value::Object(_) => match text_field(content) {
            Some(text) => text.to_string(),
            None => serde_json::to_string_pretty(content).unwrap_or_else(|_| content.to_string()),
        },
        other => other.to_string(),
    }
}

fn text_field(value: &Value) -> Option<&str> {
    value
        .get("text")
        .and_then(Value::as_str)
        .or_else(|| value.get("content").and_then(Value::as_str))
}

fn unrecognized() -> ProviderError {
    ProviderError::Response("unrecognized response shape".to_string())
}

fn non_null(value: Value) -> Value {
    if value.is_null() {
        Value::String(String::new())
    } else {
        value
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn usage_from(value: Option<&Value>) -> Option<Usage> {
    let usage = present(value)?;
    let total = usage.get("total_tokens").or_else(|| usage.get("totalTokens"))?;
    total
        .as_u64()
        .or_else(|| total.as_f64().map(|f| f.max(0.0) as u64))
        .map(|total_tokens| Usage { total_tokens })
}

fn wrap(content: &Value, data: &Map<String, Value>) -> Recognized {
    Some(Ok(CanonicalResponse {
        message: CanonicalMessage::assistant(content.clone()),
        usage: usage_from(data.get("usage")),
    }))
}

fn error_field(data: &Map<String, Value>) -> Recognized {
    let message = match data.get("error")? {
        Value::Null | Value::Bool(false) => return None,
        Value::String(s) if s.is_empty() => return None,
        Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    };
    Some(Err(ProviderError::Response(message)))
}

fn choices_array(data: &Map<String, Value>) -> Recognized {
    let choice = data.get("choices")?.as_array()?.first()?;
    let message = match present(choice.get("message")) {
        Some(message) => message_from_value(message),
        None => CanonicalMessage::assistant(
            present(choice.get("text")).cloned().unwrap_or_else(|| Value::String(String::new())),
        ),
    };
    let usage = present(data.get("usage")).or_else(|| choice.get("usage"));
    Some(Ok(CanonicalResponse { message, usage: usage_from(usage) }))
}

fn output_text_string(data: &Map<String, Value>) -> Recognized {
    data.get("output_text").filter(|v| v.is_string()).and_then(|v| wrap(v, data))
}

fn output_string(data: &Map<String, Value>) -> Recognized {
    data.get("output").filter(|v| v.is_string()).and_then(|v| wrap(v, data))
}

fn message_string(data: &Map<String, Value>) -> Recognized {
    data.get("message").filter(|v| v.is_string()).and_then(|v| wrap(v, data))
}

fn message_object(data: &Map<String, Value>) -> Recognized {
    let message = data.get("message")?;
    present(message.get("content"))?;
    Some(Ok(CanonicalResponse {
        message: message_from_value(message),
        usage: usage_from(data.get("usage")),
    }))
}

fn content_field(data: &Map<String, Value>) -> Recognized {
    present(data.get("content")).and_then(|v| wrap(v, data))
}

fn message_from_value(message: &Value) -> CanonicalMessage {
    let Some(obj) = message.as_object() else {
        return CanonicalMessage::assistant(message.clone());
    };

    let role = obj
        .get("role")
        .cloned()
        .and_then(|r| serde_json::from_value::<Role>(r).ok())
        .unwrap_or(Role::Assistant);
    let content = non_null(obj.get("content").cloned().unwrap_or(Value::Null));

    let mut tool_calls: Vec<ToolInvocation> = Vec::new();
    if let Some(calls) = obj.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            match serde_json::from_value::<ToolCall>(call.clone()) {
                Ok(call) => tool_calls.push(call.into()),
                Err(e) => warn!(error = %e, "skipping malformed tool call entry"),
            }
        }
    } else if let Some(function) = present(obj.get("function_call")) {
        // Legacy single-function form.
        let call = serde_json::json!({ "function": function });
        match serde_json::from_value::<ToolCall>(call) {
            Ok(call) => tool_calls.push(call.into()),
            Err(e) => warn!(error = %e, "skipping malformed function_call"),
        }
    }

    CanonicalMessage { role, content, tool_calls }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_string_and_object() {
        let err = normalize_response(&json!({ "error": "quota exceeded", "choices": [] })).unwrap_err();
        assert_eq!(err, ProviderError::Response("quota exceeded".into()));

        let err = normalize_response(&json!({ "error": { "message": "bad model" } })).unwrap_err();
        assert_eq!(err.to_string(), "bad model");
    }

    #[test]
    fn test_choices_message_with_tool_calls() {
        let data = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "read_file", "arguments": "{\"path\":\"a.txt\"}" }
                    }]
                }
            }],
            "usage": { "total_tokens": 42 }
        });
        let resp = normalize_response(&data).unwrap();
        assert_eq!(resp.usage, Some(Usage { total_tokens: 42 }));
        assert_eq!(resp.message.tool_calls.len(), 1);
        assert_eq!(resp.message.tool_calls[0].id, "call_1");
        assert_eq!(resp.message.tool_calls[0].name, "read_file");
        assert_eq!(resp.message.tool_calls[0].raw_arguments, "{\"path\":\"a.txt\"}");
        assert_eq!(resp.message.text(), "");
    }

    #[test]
    fn test_choices_text_fallback_and_choice_usage() {
        let data = json!({ "choices": [{ "text": "hello", "usage": { "total_tokens": 7 } }] });
        let resp = normalize_response(&data).unwrap();
        assert_eq!(resp.message.role, Role::Assistant);
        assert_eq!(resp.message.content, json!("hello"));
        assert_eq!(resp.usage, Some(Usage { total_tokens: 7 }));
    }

    #[test]
    fn test_priority_order() {
        // choices beats output_text
        let data = json!({ "choices": [{ "message": { "role": "assistant", "content": "from choices" } }], "output_text": "nope" });
        assert_eq!(normalize_response(&data).unwrap().message.text(), "from choices");

        // empty choices falls through
        let data = json!({ "choices": [], "output_text": "from output_text", "output": "nope" });
        assert_eq!(normalize_response(&data).unwrap().message.text(), "from output_text");

        let data = json!({ "output": "from output", "message": "nope" });
        assert_eq!(normalize_response(&data).unwrap().message.text(), "from output");

        let data = json!({ "message": "from message", "content": "nope" });
        assert_eq!(normalize_response(&data).unwrap().message.text(), "from message");

        let data = json!({ "message": { "role": "assistant", "content": "nested" }, "content": "nope" });
        assert_eq!(normalize_response(&data).unwrap().message.text(), "nested");

        let data = json!({ "message": { "role": "assistant" }, "content": [{ "text": "outer" }] });
        assert_eq!(normalize_response(&data).unwrap().message.text(), "outer");
    }

    #[test]
    fn test_unrecognized_and_empty() {
        let err = normalize_response(&json!({ "foo": 1 })).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized response shape");
        assert!(normalize_response(&Value::Null).is_err());
        assert!(normalize_response(&json!("text")).is_err());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let data = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "checking",
                    "tool_calls": [{ "id": "c1", "function": { "name": "get_summary", "arguments": { "path": "x" } } }]
                }
            }],
            "usage": { "total_tokens": 10 }
        });
        let once = normalize_response(&data).unwrap();
        let twice = normalize_response(&serde_json::to_value(&once).unwrap()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.message.tool_calls[0].raw_arguments, "{\"path\":\"x\"}");
    }

    #[test]
    fn test_missing_tool_call_id_is_generated() {
        let data = json!({ "message": { "content": "", "tool_calls": [{ "function": { "name": "list_files", "arguments": "{}" } }] } });
        let resp = normalize_response(&data).unwrap();
        assert!(resp.message.tool_calls[0].id.starts_with("call_"));
    }

    #[test]
    fn test_flatten_content_shapes() {
        assert_eq!(flatten_content(&json!("plain")), "plain");
        assert_eq!(flatten_content(&json!([])), "");
        assert_eq!(flatten_content(&Value::Null), "");
        assert_eq!(
            flatten_content(&json!(["  first", { "text": "second" }, { "content": "third  " }])),
            "first\nsecond\nthird"
        );
        assert_eq!(flatten_content(&json!([{ "type": "image" }, { "text": "only" }])), "only");
        assert_eq!(flatten_content(&json!({ "text": "obj" })), "obj");
        assert_eq!(flatten_content(&json!({ "content": "obj2" })), "obj2");
        assert_eq!(flatten_content(&json!({ "a": 1 })), "{\n  \"a\": 1\n}");
    }
}
