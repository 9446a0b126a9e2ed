//! Google Gemini adapter
//!
//! Gemini differs from the OpenAI dialect on every axis: the key rides in
//! the URL query string, conversations are `contents` with a user/model
//! role split, the system prompt is a separate `systemInstruction`, and
//! completion is signalled by `finishReason` inside the last JSON chunk.
//! Requests run through the key rotation engine because Google meters
//! quota per key.

use crate::config::ProviderConfig;
use crate::error::{NewsdeskError, NewsdeskResult};
use crate::llm::messages::{ChatMessage, MessageRole};
use crate::llm::providers::adapter::{ProbeBody, ProviderAdapter};
use crate::llm::providers::content::{BlockReason, ParsedContent};
use crate::llm::rotation::run_with_rotation;
use crate::llm::streaming::StreamEvent;
use crate::llm::transport::{HttpClient, LineStream};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Statuses the transport must surface immediately so the rotation engine
/// can move to the next key instead of retrying in place
const GEMINI_FAST_FAIL: [u16; 3] = [429, 403, 400];

const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug)]
pub struct GeminiAdapter {
    config: ProviderConfig,
    keys: Vec<String>,
    identifier: String,
}

impl GeminiAdapter {
    /// Fails when the config carries no usable API key; blank entries in
    /// the key list are dropped
    pub fn new(config: ProviderConfig) -> NewsdeskResult<Self> {
        let keys: Vec<String> = config
            .api_keys
            .iter()
            .filter(|k| !k.trim().is_empty())
            .cloned()
            .collect();
        if keys.is_empty() {
            return Err(NewsdeskError::config_with_context(
                "API密钥列表不能为空",
                &config.name,
            ));
        }
        let identifier = format!("google:{}", config.model);
        Ok(Self {
            config,
            keys,
            identifier,
        })
    }

    fn chat_url_for_key(&self, key: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.api_url.trim_end_matches('/'),
            self.config.model,
            key
        )
    }

    fn stream_url_for_key(&self, key: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?key={}",
            self.config.api_url.trim_end_matches('/'),
            self.config.model,
            key
        )
    }

    /// Non-streaming generateContent call under key rotation
    pub async fn send_chat(
        &self,
        http: &HttpClient,
        messages: &[ChatMessage],
        timeout_secs: u64,
    ) -> NewsdeskResult<Value> {
        let headers = self.headers()?;
        let payload = self.prepare_request(messages, false);
        run_with_rotation(&self.keys, "非流式请求", &self.identifier, |key| {
            let url = self.chat_url_for_key(&key);
            let headers = headers.clone();
            let payload = payload.clone();
            async move {
                http.post_json(&url, &headers, &payload, timeout_secs, Some(&GEMINI_FAST_FAIL))
                    .await
            }
        })
        .await
    }

    /// Opens a streamGenerateContent connection under key rotation. Only
    /// the connection attempt rotates; once lines are flowing, a mid-stream
    /// failure surfaces as a stream item and is never retried.
    pub async fn open_stream(
        &self,
        http: &HttpClient,
        messages: &[ChatMessage],
    ) -> NewsdeskResult<LineStream> {
        let headers = self.headers()?;
        let payload = self.prepare_request(messages, true);
        run_with_rotation(&self.keys, "流式请求", &self.identifier, |key| {
            let url = self.stream_url_for_key(&key);
            let headers = headers.clone();
            let payload = payload.clone();
            async move {
                http.post_stream(&url, &headers, &payload, Some(&GEMINI_FAST_FAIL))
                    .await
            }
        })
        .await
    }
}

/// Joins the text of every part under a `parts` array. None when the array
/// is missing or empty.
fn join_parts(parts: Option<&Value>) -> Option<String> {
    let parts = parts?.as_array()?;
    if parts.is_empty() {
        return None;
    }
    Some(
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect(),
    )
}

impl ProviderAdapter for GeminiAdapter {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The key travels in the URL, so headers stay minimal
    fn headers(&self) -> NewsdeskResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// A leading system message becomes `systemInstruction`; remaining
    /// turns map user to "user" and everything else to "model"
    fn prepare_request(&self, messages: &[ChatMessage], _streaming: bool) -> Value {
        let mut system_instruction = None;
        let mut rest = messages;
        if let Some((first, tail)) = messages.split_first() {
            if first.role == MessageRole::System {
                system_instruction = Some(json!({
                    "role": "system",
                    "parts": [{"text": first.content}],
                }));
                rest = tail;
            }
        }

        let contents: Vec<Value> = rest
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| {
                let role = match m.role {
                    MessageRole::User => "user",
                    _ => "model",
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        let mut generation_config = json!({
            "temperature": self.config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        });
        if let Some(max_tokens) = self.config.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }

        let mut payload = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if let Some(instruction) = system_instruction {
            payload["systemInstruction"] = instruction;
        }
        payload
    }

    fn chat_url(&self) -> String {
        self.chat_url_for_key(&self.keys[0])
    }

    fn stream_url(&self) -> String {
        self.stream_url_for_key(&self.keys[0])
    }

    fn parse_response(&self, response: &Value) -> ParsedContent {
        let candidate = response
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first());
        let Some(candidate) = candidate else {
            warn!(response = %response, "Gemini response carried no candidates");
            return ParsedContent::Blocked(BlockReason::NoUsableContent);
        };

        if let Some(text) = join_parts(candidate.pointer("/content/parts")) {
            let text = text.trim();
            if !text.is_empty() {
                return ParsedContent::Text(text.to_string());
            }
        }

        let finish_reason = candidate.get("finishReason").and_then(Value::as_str);
        match finish_reason {
            Some("SAFETY") => ParsedContent::Blocked(BlockReason::Safety),
            Some("RECITATION") => ParsedContent::Blocked(BlockReason::Recitation),
            other => {
                warn!(finish_reason = ?other, "no usable text in Gemini response");
                ParsedContent::Blocked(BlockReason::NoUsableContent)
            }
        }
    }

    /// Stream chunks are JSON objects, optionally behind a `data: ` prefix.
    /// Any `finishReason` marks the final chunk; safety and recitation
    /// blocks append their placeholder to whatever text arrived with them.
    fn parse_stream_line(&self, line: &str) -> StreamEvent {
        let trimmed = line.trim();
        let json_str = trimmed.strip_prefix("data: ").unwrap_or(trimmed).trim();
        if json_str.is_empty() {
            return StreamEvent::none();
        }

        let data: Value = match serde_json::from_str(json_str) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, line = json_str, "failed to decode Gemini stream chunk");
                return StreamEvent::none();
            }
        };

        if let Some(candidate) = data
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
        {
            let mut text = join_parts(candidate.pointer("/content/parts"));
            let finish_reason = candidate.get("finishReason").and_then(Value::as_str);
            let Some(reason) = finish_reason else {
                return StreamEvent {
                    text,
                    is_final: false,
                };
            };

            debug!(reason, "Gemini stream candidate finished");
            let block = match reason {
                "SAFETY" => Some(BlockReason::Safety),
                "RECITATION" => Some(BlockReason::Recitation),
                "STOP" | "MAX_TOKENS" => None,
                other => {
                    warn!(reason = other, "Gemini stream finished with unexpected reason");
                    None
                }
            };
            if let Some(block) = block {
                let suffix = format!("\n{}", block.placeholder());
                text = match text {
                    Some(t) if !t.is_empty() => Some(format!("{t}{suffix}")),
                    _ => Some(suffix),
                };
            }
            return StreamEvent::final_event(text);
        }

        if let Some(reason) = data
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
        {
            warn!(reason, "Gemini prompt was blocked");
            let placeholder = BlockReason::PromptBlocked(reason.to_string()).placeholder();
            return StreamEvent::final_event(Some(format!("\n{placeholder}")));
        }

        warn!(chunk = %data, "Gemini stream chunk had no candidates or feedback");
        StreamEvent::none()
    }

    fn fast_fail_status_codes(&self) -> Option<&'static [u16]> {
        Some(&GEMINI_FAST_FAIL)
    }

    fn test_connection_payload(&self) -> Option<Value> {
        Some(json!({
            "contents": [
                {"role": "user", "parts": [{"text": "Hello. Please respond with a single word."}]}
            ]
        }))
    }

    fn check_test_connection_response(&self, body: &ProbeBody) -> bool {
        match body {
            ProbeBody::Json(value) => value.get("candidates").is_some(),
            ProbeBody::Text(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> GeminiAdapter {
        GeminiAdapter::new(
            ProviderConfig::new(
                "Gemini",
                "https://generativelanguage.googleapis.com/",
                "gemini-pro",
            )
            .with_api_keys(vec!["key-one".into(), "key-two".into()]),
        )
        .unwrap()
    }

    #[test]
    fn construction_requires_a_usable_key() {
        let empty = ProviderConfig::new("g", "https://generativelanguage.googleapis.com", "m");
        assert!(GeminiAdapter::new(empty).unwrap_err().is_config());

        let blank = ProviderConfig::new("g", "https://generativelanguage.googleapis.com", "m")
            .with_api_keys(vec!["   ".into()]);
        assert!(GeminiAdapter::new(blank).unwrap_err().is_config());
    }

    #[test]
    fn urls_embed_model_and_key_without_double_slash() {
        let adapter = adapter();
        assert_eq!(
            adapter.chat_url_for_key("key-one"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent?key=key-one"
        );
        assert_eq!(
            adapter.stream_url_for_key("key-two"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:streamGenerateContent?key=key-two"
        );
    }

    #[test]
    fn identifier_names_the_model() {
        assert_eq!(adapter().identifier(), "google:gemini-pro");
    }

    #[test]
    fn payload_splits_system_instruction_from_turns() {
        let messages = vec![
            ChatMessage::system("analyze the news"),
            ChatMessage::user("first question"),
            ChatMessage::assistant("first answer"),
        ];
        let payload = adapter().prepare_request(&messages, false);

        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            "analyze the news"
        );
        let contents = payload["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn payload_defaults_temperature_and_omits_unset_max_tokens() {
        let payload = adapter().prepare_request(&[ChatMessage::user("hi")], false);
        assert_eq!(payload["generationConfig"]["temperature"], 0.7);
        assert!(payload["generationConfig"].get("maxOutputTokens").is_none());

        let tuned = GeminiAdapter::new(
            ProviderConfig::new("g", "https://generativelanguage.googleapis.com", "m")
                .with_api_key("k")
                .with_temperature(0.2)
                .with_max_tokens(256),
        )
        .unwrap();
        let payload = tuned.prepare_request(&[ChatMessage::user("hi")], false);
        assert_eq!(payload["generationConfig"]["temperature"], 0.2);
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn parse_response_joins_candidate_parts() {
        let response = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Hello "}, {"text": "world"}]},
                "finishReason": "STOP",
            }]
        });
        assert_eq!(
            adapter().parse_response(&response),
            ParsedContent::Text("Hello world".into())
        );
    }

    #[test]
    fn parse_response_maps_block_reasons_to_placeholders() {
        let safety = json!({"candidates": [{"finishReason": "SAFETY"}]});
        assert_eq!(
            adapter().parse_response(&safety).into_text(),
            "[响应因安全设置被阻止]"
        );

        let recitation = json!({"candidates": [{"finishReason": "RECITATION"}]});
        assert_eq!(
            adapter().parse_response(&recitation).into_text(),
            "[响应因疑似引用受保护内容被阻止]"
        );

        let nothing = json!({"promptFeedback": {}});
        assert_eq!(
            adapter().parse_response(&nothing).into_text(),
            "[未能从响应中提取有效内容]"
        );
    }

    #[test]
    fn stream_chunk_without_finish_reason_is_not_final() {
        let line = r#"{"candidates":[{"content":{"parts":[{"text":"chunk"}]}}]}"#;
        let event = adapter().parse_stream_line(line);
        assert_eq!(event.text.as_deref(), Some("chunk"));
        assert!(!event.is_final);
    }

    #[test]
    fn stream_accepts_optional_data_prefix() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"chunk"}]}}]}"#;
        assert_eq!(adapter().parse_stream_line(line).text.as_deref(), Some("chunk"));
    }

    #[test]
    fn stream_finish_reason_marks_final() {
        let line = r#"{"candidates":[{"content":{"parts":[{"text":"end"}]},"finishReason":"STOP"}]}"#;
        let event = adapter().parse_stream_line(line);
        assert_eq!(event.text.as_deref(), Some("end"));
        assert!(event.is_final);
    }

    #[test]
    fn stream_safety_block_appends_placeholder() {
        let line = r#"{"candidates":[{"content":{"parts":[{"text":"partial"}]},"finishReason":"SAFETY"}]}"#;
        let event = adapter().parse_stream_line(line);
        assert_eq!(event.text.as_deref(), Some("partial\n[响应因安全设置被阻止]"));
        assert!(event.is_final);

        let bare = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        let event = adapter().parse_stream_line(bare);
        assert_eq!(event.text.as_deref(), Some("\n[响应因安全设置被阻止]"));
    }

    #[test]
    fn stream_prompt_block_is_final_with_reason() {
        let line = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let event = adapter().parse_stream_line(line);
        assert_eq!(event.text.as_deref(), Some("\n[请求因 SAFETY 被阻止]"));
        assert!(event.is_final);
    }

    #[test]
    fn stream_ignores_blank_and_garbled_lines() {
        assert_eq!(adapter().parse_stream_line("data: "), StreamEvent::none());
        assert_eq!(adapter().parse_stream_line("{broken"), StreamEvent::none());
    }

    #[test]
    fn probe_checks_for_candidates() {
        let adapter = adapter();
        assert!(adapter.check_test_connection_response(&ProbeBody::Json(json!({"candidates": []}))));
        assert!(!adapter.check_test_connection_response(&ProbeBody::Json(json!({"error": {}}))));
    }
}
