//! Provider adapter trait and dispatch
//!
//! An adapter is a pure codec for one vendor family: it builds URLs,
//! headers, and payloads, and parses responses and stream lines. It never
//! touches the network itself; the transport client executes what the
//! adapter describes. Gemini additionally carries inherent request helpers
//! for its key-rotation paths.

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::NewsdeskResult;
use crate::llm::messages::ChatMessage;
use crate::llm::providers::anthropic::AnthropicAdapter;
use crate::llm::providers::content::ParsedContent;
use crate::llm::providers::google::GeminiAdapter;
use crate::llm::providers::ollama::OllamaAdapter;
use crate::llm::providers::openai::OpenAiAdapter;
use crate::llm::streaming::StreamEvent;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::debug;

/// Body of a connection-test response
///
/// Most backends answer the probe with JSON; Ollama's root endpoint answers
/// with plain text.
#[derive(Debug, Clone)]
pub enum ProbeBody {
    Json(Value),
    Text(String),
}

/// Wire codec for one vendor family
pub trait ProviderAdapter: Send + Sync {
    /// Short identifier for logs
    fn identifier(&self) -> &str;

    /// Request headers; fails when a required key is missing
    fn headers(&self) -> NewsdeskResult<HeaderMap>;

    /// Translate neutral messages into the vendor's request payload
    fn prepare_request(&self, messages: &[ChatMessage], streaming: bool) -> Value;

    /// Endpoint for a single-shot chat request
    fn chat_url(&self) -> String;

    /// Endpoint for a streaming chat request; same as chat for most vendors
    fn stream_url(&self) -> String {
        self.chat_url()
    }

    /// Extract content from a complete response body
    fn parse_response(&self, response: &Value) -> ParsedContent;

    /// Decode one stream line into text and a terminal flag
    fn parse_stream_line(&self, line: &str) -> StreamEvent;

    /// Explicit end-of-stream sentinel, for vendors that use one
    fn stream_stop_signal(&self) -> Option<&'static str> {
        None
    }

    /// Statuses the transport must surface immediately instead of retrying,
    /// because this adapter owns retry for them (key rotation)
    fn fast_fail_status_codes(&self) -> Option<&'static [u16]> {
        None
    }

    /// Endpoint probed by a connection test
    fn test_connection_url(&self) -> String {
        self.chat_url()
    }

    /// Minimal probe payload; `None` means the test is a plain GET
    fn test_connection_payload(&self) -> Option<Value>;

    /// Whether a probe response looks like this vendor answering
    fn check_test_connection_response(&self, body: &ProbeBody) -> bool;
}

/// The active adapter, one variant per vendor family
///
/// Enum dispatch keeps the set closed: classification produces a
/// [`ProviderKind`], and this table is the only place a kind is mapped to
/// wire behavior.
pub enum ProviderInstance {
    OpenAiCompatible(OpenAiAdapter),
    Anthropic(AnthropicAdapter),
    Gemini(GeminiAdapter),
    Ollama(OllamaAdapter),
}

impl ProviderInstance {
    /// Build the adapter matching the config's kind
    ///
    /// Every OpenAI-compatible alias (xAI, Mistral, Fireworks, Volcengine
    /// Ark, Bailian, Dashscope, Zhipu, generic) shares one adapter; only
    /// Anthropic, Gemini, and Ollama have their own wire formats.
    pub fn from_config(config: &ProviderConfig) -> NewsdeskResult<Self> {
        config.validate()?;
        let kind = config.kind();
        debug!(name = %config.name, kind = %kind, model = %config.model, "building provider");

        let instance = match kind {
            ProviderKind::Anthropic => {
                ProviderInstance::Anthropic(AnthropicAdapter::new(config.clone())?)
            }
            ProviderKind::Google => ProviderInstance::Gemini(GeminiAdapter::new(config.clone())?),
            ProviderKind::Ollama => ProviderInstance::Ollama(OllamaAdapter::new(config.clone())),
            _ => ProviderInstance::OpenAiCompatible(OpenAiAdapter::new(config.clone())),
        };
        Ok(instance)
    }

    fn inner(&self) -> &dyn ProviderAdapter {
        match self {
            ProviderInstance::OpenAiCompatible(adapter) => adapter,
            ProviderInstance::Anthropic(adapter) => adapter,
            ProviderInstance::Gemini(adapter) => adapter,
            ProviderInstance::Ollama(adapter) => adapter,
        }
    }
}

impl ProviderAdapter for ProviderInstance {
    fn identifier(&self) -> &str {
        self.inner().identifier()
    }

    fn headers(&self) -> NewsdeskResult<HeaderMap> {
        self.inner().headers()
    }

    fn prepare_request(&self, messages: &[ChatMessage], streaming: bool) -> Value {
        self.inner().prepare_request(messages, streaming)
    }

    fn chat_url(&self) -> String {
        self.inner().chat_url()
    }

    fn stream_url(&self) -> String {
        self.inner().stream_url()
    }

    fn parse_response(&self, response: &Value) -> ParsedContent {
        self.inner().parse_response(response)
    }

    fn parse_stream_line(&self, line: &str) -> StreamEvent {
        self.inner().parse_stream_line(line)
    }

    fn stream_stop_signal(&self) -> Option<&'static str> {
        self.inner().stream_stop_signal()
    }

    fn fast_fail_status_codes(&self) -> Option<&'static [u16]> {
        self.inner().fast_fail_status_codes()
    }

    fn test_connection_url(&self) -> String {
        self.inner().test_connection_url()
    }

    fn test_connection_payload(&self) -> Option<Value> {
        self.inner().test_connection_payload()
    }

    fn check_test_connection_response(&self, body: &ProbeBody) -> bool {
        self.inner().check_test_connection_response(body)
    }
}
