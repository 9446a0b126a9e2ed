//! OpenAI-compatible adapter
//!
//! One adapter covers OpenAI itself plus every vendor speaking its chat
//! completion dialect (xAI, Mistral, Fireworks, Volcengine Ark, Bailian,
//! Dashscope, Zhipu, and unbranded relays). `api_url` is the full chat
//! completions endpoint.

use crate::config::ProviderConfig;
use crate::error::{NewsdeskError, NewsdeskResult};
use crate::llm::messages::ChatMessage;
use crate::llm::providers::adapter::{ProbeBody, ProviderAdapter};
use crate::llm::providers::content::ParsedContent;
use crate::llm::streaming::StreamEvent;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, warn};

const STOP_SIGNAL: &str = "[DONE]";

pub struct OpenAiAdapter {
    config: ProviderConfig,
}

impl OpenAiAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn identifier(&self) -> &str {
        "openai_compatible"
    }

    /// Bearer auth when a key is present; a missing key is a warning, not an
    /// error, since some compatible endpoints run unauthenticated
    fn headers(&self) -> NewsdeskResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match self.config.first_key() {
            Some(key) => {
                let bearer = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|_| {
                    NewsdeskError::config("API key contains characters not allowed in a header")
                })?;
                headers.insert(AUTHORIZATION, bearer);
            }
            None => {
                warn!(
                    url = %self.config.api_url,
                    "API key missing for OpenAI-compatible provider, request may fail"
                );
            }
        }
        Ok(headers)
    }

    fn prepare_request(&self, messages: &[ChatMessage], streaming: bool) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": streaming,
        });
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
        match response.pointer("/choices/0/message/content") {
            Some(Value::String(content)) => ParsedContent::Text(content.trim().to_string()),
            Some(Value::Null) => {
                warn!("OpenAI-compatible response carried null content");
                ParsedContent::Empty
            }
            _ => {
                warn!(response = %response, "no content found in OpenAI-compatible response");
                ParsedContent::Empty
            }
        }
    }

    /// SSE line decode: `data:`-prefixed JSON deltas, terminated by a
    /// literal `[DONE]` (bare or behind the prefix)
    fn parse_stream_line(&self, line: &str) -> StreamEvent {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return StreamEvent::none();
        }
        if trimmed == STOP_SIGNAL {
            debug!("received stream stop signal");
            return StreamEvent::final_event(None);
        }

        let Some(json_str) = trimmed.strip_prefix("data: ") else {
            warn!(line = trimmed, "stream line without data prefix, skipping");
            return StreamEvent::none();
        };
        let json_str = json_str.trim();
        if json_str == STOP_SIGNAL {
            debug!("received stream stop signal behind data prefix");
            return StreamEvent::final_event(None);
        }
        if json_str.is_empty() {
            return StreamEvent::text("");
        }

        match serde_json::from_str::<Value>(json_str) {
            Ok(data) => {
                let content = data
                    .pointer("/choices/0/delta/content")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                StreamEvent::text(content)
            }
            Err(e) => {
                warn!(error = %e, line = json_str, "failed to parse stream delta");
                StreamEvent::none()
            }
        }
    }

    fn stream_stop_signal(&self) -> Option<&'static str> {
        Some(STOP_SIGNAL)
    }

    fn test_connection_payload(&self) -> Option<Value> {
        Some(json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": "Say \"Hello\""}],
            "max_tokens": 5,
        }))
    }

    fn check_test_connection_response(&self, body: &ProbeBody) -> bool {
        match body {
            ProbeBody::Json(value) => value.get("choices").is_some_and(Value::is_array),
            ProbeBody::Text(_) => false,
        }
    }
}
