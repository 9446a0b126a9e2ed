//! Anthropic Messages API adapter
//!
//! Anthropic takes the system prompt as a top-level `system` field rather
//! than a message role, and streams typed SSE events instead of a `[DONE]`
//! sentinel. The end of a stream is the `message_stop` event.

use crate::config::ProviderConfig;
use crate::error::{NewsdeskError, NewsdeskResult};
use crate::llm::messages::{ChatMessage, MessageRole};
use crate::llm::providers::adapter::{ProbeBody, ProviderAdapter};
use crate::llm::providers::content::ParsedContent;
use crate::llm::streaming::StreamEvent;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, warn};

const DEFAULT_API_VERSION: &str = "2023-06-01";
const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
const API_VERSION_HEADER: HeaderName = HeaderName::from_static("anthropic-version");

#[derive(Debug)]
pub struct AnthropicAdapter {
    config: ProviderConfig,
    api_key: String,
}

impl AnthropicAdapter {
    /// Fails when no API key is configured; Anthropic has no anonymous mode
    pub fn new(config: ProviderConfig) -> NewsdeskResult<Self> {
        let api_key = config.first_key().map(str::to_string).ok_or_else(|| {
            NewsdeskError::config_with_context(
                "API key is required for provider 'anthropic'",
                &config.name,
            )
        })?;
        Ok(Self { config, api_key })
    }

    fn api_version(&self) -> &str {
        self.config.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn identifier(&self) -> &str {
        "anthropic"
    }

    fn headers(&self) -> NewsdeskResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(&self.api_key).map_err(|_| {
                NewsdeskError::config("API key contains characters not allowed in a header")
            })?,
        );
        headers.insert(
            API_VERSION_HEADER,
            HeaderValue::from_str(self.api_version()).map_err(|_| {
                NewsdeskError::config("anthropic-version contains invalid characters")
            })?,
        );
        Ok(headers)
    }

    /// System messages move to the top-level `system` field; the last one
    /// wins. The messages array keeps only user and assistant turns.
    fn prepare_request(&self, messages: &[ChatMessage], streaming: bool) -> Value {
        let mut system_prompt = None;
        let mut turns = Vec::new();
        for message in messages {
            match message.role {
                MessageRole::System => system_prompt = Some(message.content.clone()),
                _ => turns.push(message),
            }
        }

        let mut payload = json!({
            "model": self.config.model,
            "messages": turns,
            "stream": streaming,
        });
        if let Some(system) = system_prompt {
            payload["system"] = json!(system);
        }
        if let Some(temperature) = self.config.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        payload
    }

    fn chat_url(&self) -> String {
        self.config.api_url.clone()
    }

    fn parse_response(&self, response: &Value) -> ParsedContent {
        let blocks = match response.get("content").and_then(Value::as_array) {
            Some(blocks) => blocks,
            None => {
                warn!(response = %response, "no content blocks in Anthropic response");
                return ParsedContent::Empty;
            }
        };

        let mut text = String::new();
        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("text") {
                text.push_str(block.get("text").and_then(Value::as_str).unwrap_or(""));
            }
        }
        let text = text.trim();
        if text.is_empty() {
            ParsedContent::Empty
        } else {
            ParsedContent::Text(text.to_string())
        }
    }

    /// Every SSE data payload is JSON with a `type` discriminator. Text
    /// arrives in `content_block_delta` events; `message_stop` ends the
    /// stream. Everything else (message_start, ping, block boundaries)
    /// carries no text.
    fn parse_stream_line(&self, line: &str) -> StreamEvent {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("event:") {
            return StreamEvent::none();
        }
        let json_str = trimmed.strip_prefix("data: ").unwrap_or(trimmed);

        let data: Value = match serde_json::from_str(json_str) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, line = json_str, "failed to parse Anthropic SSE data");
                return StreamEvent::none();
            }
        };

        match data.get("type").and_then(Value::as_str) {
            Some("content_block_delta") => {
                let delta = &data["delta"];
                if delta.get("type").and_then(Value::as_str) == Some("text_delta") {
                    StreamEvent::text(delta.get("text").and_then(Value::as_str).unwrap_or(""))
                } else {
                    StreamEvent::none()
                }
            }
            Some("message_stop") => {
                debug!("Anthropic stream reported message_stop");
                StreamEvent::final_event(None)
            }
            _ => StreamEvent::none(),
        }
    }

    fn test_connection_payload(&self) -> Option<Value> {
        let mut payload = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": "Say \"Hello\""}],
            "max_tokens": 5,
        });
        if let Some(temperature) = self.config.temperature {
            payload["temperature"] = json!(temperature);
        }
        Some(payload)
    }

    fn check_test_connection_response(&self, body: &ProbeBody) -> bool {
        let ProbeBody::Json(value) = body else {
            return false;
        };
        let has_content = value.get("content").is_some_and(Value::is_array);
        let has_type = value.get("type").is_some();
        let has_error = value.get("error").is_some_and(|e| !e.is_null());
        (has_content || has_type) && !has_error
    }
}
