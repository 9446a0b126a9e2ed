//! Ollama adapter
//!
//! Targets the local `/api/chat` endpoint. No authentication; a configured
//! API key is ignored. Streams are newline-delimited JSON objects with a
//! `done` flag rather than SSE, and the connection probe is a GET against
//! the server root, which answers with plain text.

use crate::config::ProviderConfig;
use crate::error::NewsdeskResult;
use crate::llm::messages::ChatMessage;
use crate::llm::providers::adapter::{ProbeBody, ProviderAdapter};
use crate::llm::providers::content::ParsedContent;
use crate::llm::streaming::StreamEvent;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::warn;

pub struct OllamaAdapter {
    config: ProviderConfig,
}

impl OllamaAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    fn base_url(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }
}

impl ProviderAdapter for OllamaAdapter {
    fn identifier(&self) -> &str {
        "ollama"
    }

    fn headers(&self) -> NewsdeskResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Sampling parameters ride under `options`; `num_predict` is the
    /// max-token knob and only applies to non-streaming calls
    fn prepare_request(&self, messages: &[ChatMessage], streaming: bool) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": streaming,
        });

        let mut options = serde_json::Map::new();
        if let Some(temperature) = self.config.temperature {
            options.insert("temperature".into(), json!(temperature));
        }
        if !streaming {
            if let Some(max_tokens) = self.config.max_tokens {
                options.insert("num_predict".into(), json!(max_tokens));
            }
        }
        if !options.is_empty() {
            payload["options"] = Value::Object(options);
        }
        payload
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url())
    }

    /// `message.content` on current servers, `response` on older ones
    fn parse_response(&self, response: &Value) -> ParsedContent {
        let content = response
            .pointer("/message/content")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .or_else(|| response.get("response").and_then(Value::as_str));

        match content {
            Some(text) => ParsedContent::Text(text.trim().to_string()),
            None => {
                warn!(response = %response, "no content in Ollama response");
                ParsedContent::Empty
            }
        }
    }

    /// One JSON object per line; `done: true` marks the final chunk
    fn parse_stream_line(&self, line: &str) -> StreamEvent {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return StreamEvent::none();
        }

        let data: Value = match serde_json::from_str(trimmed) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, line = trimmed, "failed to parse Ollama stream chunk");
                return StreamEvent::none();
            }
        };

        let done = data.get("done").and_then(Value::as_bool).unwrap_or(false);
        let content = data
            .pointer("/message/content")
            .and_then(Value::as_str)
            .or_else(|| data.get("response").and_then(Value::as_str))
            .unwrap_or("");

        if done {
            StreamEvent::final_event(Some(content.to_string()))
        } else {
            StreamEvent::text(content)
        }
    }

    /// GET against the server root; Ollama answers with a plain-text banner
    fn test_connection_url(&self) -> String {
        self.base_url().to_string()
    }

    fn test_connection_payload(&self) -> Option<Value> {
        None
    }

    fn check_test_connection_response(&self, body: &ProbeBody) -> bool {
        match body {
            ProbeBody::Text(text) => text.contains("Ollama is running"),
            // Proxied setups can answer the probe with a JSON chat body
            ProbeBody::Json(value) => {
                value.get("message").is_some_and(Value::is_object)
                    || value.get("response").is_some()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> OllamaAdapter {
        OllamaAdapter::new(
            ProviderConfig::new("Local Ollama", "http://localhost:11434/", "llama3")
                .with_temperature(0.5)
                .with_max_tokens(128),
        )
    }

    #[test]
    fn chat_url_appends_api_chat_without_double_slash() {
        assert_eq!(adapter().chat_url(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn num_predict_only_applies_to_non_streaming() {
        let messages = vec![ChatMessage::user("hi")];
        let non_stream = adapter().prepare_request(&messages, false);
        assert_eq!(non_stream["options"]["num_predict"], 128);
        assert_eq!(non_stream["options"]["temperature"], 0.5);

        let stream = adapter().prepare_request(&messages, true);
        assert!(stream["options"].get("num_predict").is_none());
        assert_eq!(stream["options"]["temperature"], 0.5);
    }

    #[test]
    fn payload_without_options_omits_the_key() {
        let bare = OllamaAdapter::new(ProviderConfig::new("o", "http://localhost:11434", "m"));
        let payload = bare.prepare_request(&[ChatMessage::user("hi")], true);
        assert!(payload.get("options").is_none());
    }

    #[test]
    fn parse_response_prefers_message_content() {
        let chat = json!({"message": {"role": "assistant", "content": " hi there "}});
        assert_eq!(adapter().parse_response(&chat), ParsedContent::Text("hi there".into()));

        let generate = json!({"response": "legacy reply"});
        assert_eq!(
            adapter().parse_response(&generate),
            ParsedContent::Text("legacy reply".into())
        );

        assert_eq!(adapter().parse_response(&json!({})), ParsedContent::Empty);
    }

    #[test]
    fn stream_chunks_carry_text_until_done() {
        let chunk = r#"{"message":{"content":"Hel"},"done":false}"#;
        assert_eq!(adapter().parse_stream_line(chunk), StreamEvent::text("Hel"));

        let last = r#"{"message":{"content":""},"done":true}"#;
        let event = adapter().parse_stream_line(last);
        assert!(event.is_final);
        assert_eq!(event.text.as_deref(), Some(""));
    }

    #[test]
    fn stream_falls_back_to_legacy_response_field() {
        let chunk = r#"{"response":"old","done":false}"#;
        assert_eq!(adapter().parse_stream_line(chunk), StreamEvent::text("old"));
    }

    #[test]
    fn stream_skips_blank_and_garbled_lines() {
        assert_eq!(adapter().parse_stream_line(""), StreamEvent::none());
        assert_eq!(adapter().parse_stream_line("{oops"), StreamEvent::none());
    }

    #[test]
    fn probe_is_a_get_against_the_root() {
        let adapter = adapter();
        assert_eq!(adapter.test_connection_url(), "http://localhost:11434");
        assert!(adapter.test_connection_payload().is_none());
        assert!(adapter
            .check_test_connection_response(&ProbeBody::Text("Ollama is running".into())));
        assert!(!adapter.check_test_connection_response(&ProbeBody::Text("404".into())));
    }
}
