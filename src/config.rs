use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::llm::{LlmConfig, ProviderError};
use crate::patch::PatchMode;
use crate::workspace::Backend;

pub const API_KEY_ENV: &str = "CODESHELL_API_KEY";
pub const DEFAULT_MODEL: &str = "gpt-5-nano";
pub const DEFAULT_MAX_ROUNDS: usize = 25;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub provider_name: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub extra_headers: Value,
    pub api_key: Option<String>,
    pub max_rounds: usize,
    pub command_timeout: Duration,
    pub patch_mode: PatchMode,
    pub backend: Backend,
    pub local_server_url: Option<String>,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self::from_map(&HashMap::new())
    }
}

impl AssistantSettings {
    /// Builds settings from the string key/value pairs of the `settings` table.
    pub fn from_map(settings: &HashMap<String, String>) -> Self {
        let non_empty = |key: &str| settings.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            provider_name: non_empty("provider_name").unwrap_or_else(|| "gateway".to_string()),
            base_url: non_empty("base_url").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: non_empty("model").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: settings.get("temperature")
                .and_then(|s| s.parse().ok()).unwrap_or(0.2),
            max_tokens: settings.get("max_tokens")
                .and_then(|s| s.parse().ok()).unwrap_or(4000),
            extra_headers: settings.get("extra_headers_json")
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_else(|| json!({})),
            api_key: non_empty("api_key"),
            max_rounds: settings.get("max_rounds")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_ROUNDS),
            command_timeout: Duration::from_secs(
                settings.get("command_timeout_secs")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
            ),
            patch_mode: settings.get("patch_mode")
                .and_then(|s| PatchMode::from_setting(s))
                .unwrap_or_default(),
            backend: settings.get("backend")
                .and_then(|s| Backend::from_setting(s))
                .unwrap_or_default(),
            local_server_url: non_empty("local_server_url"),
        }
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            provider_name: self.provider_name.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            extra_headers: self.extra_headers.clone(),
        }
    }

    /// The configured key, falling back to the environment.
    pub fn api_key(&self) -> Result<String, ProviderError> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::MissingApiKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = AssistantSettings::default();
        assert_eq!(s.model, DEFAULT_MODEL);
        assert_eq!(s.max_rounds, DEFAULT_MAX_ROUNDS);
        assert_eq!(s.command_timeout, Duration::from_secs(300));
        assert_eq!(s.patch_mode, PatchMode::Forgiving);
        assert_eq!(s.backend, Backend::Disk);
        assert_eq!(s.extra_headers, json!({}));
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let map: HashMap<String, String> = [
            ("model", "claude-x"),
            ("temperature", "0.7"),
            ("max_rounds", "0"),
            ("patch_mode", "hunk"),
            ("backend", "local_server"),
            ("extra_headers_json", "{\"X-Team\":\"ide\"}"),
            ("api_key", "sk-test"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let s = AssistantSettings::from_map(&map);
        assert_eq!(s.model, "claude-x");
        assert_eq!(s.temperature, 0.7);
        assert_eq!(s.max_rounds, DEFAULT_MAX_ROUNDS);
        assert_eq!(s.patch_mode, PatchMode::HunkAware);
        assert_eq!(s.backend, Backend::LocalServer);
        assert_eq!(s.extra_headers["X-Team"], "ide");
        assert_eq!(s.api_key().unwrap(), "sk-test");
        assert_eq!(s.llm_config().model, "claude-x");
    }
}
