use async_trait::async_trait;
use backoff::{future::retry, Error as BackoffError, ExponentialBackoff};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::llm::types::*;
use crate::llm::ChatProvider;
use crate::models::{Message, ProviderConfig};

fn build_http() -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| ProviderError::Http(e.to_string()))
}

fn bearer(api_key: &str) -> Result<HeaderValue, ProviderError> {
    format!("Bearer {}", api_key)
        .parse()
        .map_err(|_| ProviderError::Http("API key is not a valid header value".to_string()))
}

/// Default multi-model gateway speaking the OpenAI chat-completions protocol.
pub struct GatewayClient {
    http: Client,
    config: LlmConfig,
    api_key: String,
}

impl GatewayClient {
    pub fn new(config: LlmConfig, api_key: String) -> Result<Self, ProviderError> {
        Ok(Self { http: build_http()?, config, api_key })
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer(&self.api_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Add extra headers from config
        if let Some(obj) = self.config.extra_headers.as_object() {
            for (key, value) in obj {
                if let Some(val_str) = value.as_str() {
                    if let (Ok(header_name), Ok(header_value)) = (
                        HeaderName::from_bytes(key.as_bytes()),
                        val_str.parse::<HeaderValue>(),
                    ) {
                        headers.insert(header_name, header_value);
                    }
                }
            }
        }
        Ok(headers)
    }
}

#[async_trait]
impl ChatProvider for GatewayClient {
    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<Value, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let model = if options.model.is_empty() { &self.config.model } else { &options.model };
        let request = OpenAIChatRequest {
            model,
            messages,
            tools: options.tools.as_deref(),
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            stream: false,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let headers = self.headers()?;
        debug!(provider = %self.config.provider_name, %model, messages = messages.len(), "gateway request");

        let operation = || async {
            let response = self.http
                .post(&url)
                .headers(headers.clone())
                .json(&request)
                .send()
                .await
                .map_err(|e| BackoffError::transient(ProviderError::Http(e.to_string())))?;

            let status = response.status();

            if status.is_success() {
                response
                    .json::<Value>()
                    .await
                    .map_err(|e| BackoffError::permanent(ProviderError::InvalidResponse(e.to_string())))
            } else {
                let error_text = response.text().await.unwrap_or_default();
                match status {
                    StatusCode::TOO_MANY_REQUESTS => Err(BackoffError::transient(ProviderError::RateLimited)),
                    StatusCode::UNAUTHORIZED => Err(BackoffError::permanent(ProviderError::Api {
                        status: 401,
                        message: "Invalid API key".to_string(),
                    })),
                    _ if status.as_u16() >= 500 => Err(BackoffError::transient(ProviderError::Api {
                        status: status.as_u16(),
                        message: error_text,
                    })),
                    _ => Err(BackoffError::permanent(ProviderError::Api {
                        status: status.as_u16(),
                        message: error_text,
                    })),
                }
            }
        };

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(4),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, operation).await
    }
}

/// A user-registered endpoint. Receives only `{messages}` and may answer in any shape.
pub struct CustomProviderClient {
    http: Client,
    provider: ProviderConfig,
}

impl CustomProviderClient {
    pub fn new(provider: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self { http: build_http()?, provider })
    }
}

#[async_trait]
impl ChatProvider for CustomProviderClient {
    async fn chat(&self, messages: &[Message], _options: &ChatOptions) -> Result<Value, ProviderError> {
        let url = self.provider.url.as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProviderError::Http(format!("Provider {} has no URL", self.provider.id)))?;
        if self.provider.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        debug!(provider = %self.provider.id, messages = messages.len(), "custom provider request");
        let response = self.http
            .post(url)
            .header(AUTHORIZATION, bearer(&self.provider.api_key)?)
            .json(&json!({ "messages": messages }))
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let label = if self.provider.label.is_empty() { &self.provider.id } else { &self.provider.label };
            let message = if text.is_empty() {
                format!("Provider {} request failed", label)
            } else {
                text
            };
            return Err(ProviderError::Api { status: status.as_u16(), message });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    fn accepts_tools(&self) -> bool {
        false
    }
}
