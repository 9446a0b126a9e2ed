//! LLM integration: provider adapters, transport, prompts, and the
//! chat/analysis service

pub mod line_decoder;
pub mod messages;
pub mod prompts;
pub mod providers;
pub mod rotation;
pub mod service;
pub mod streaming;
pub mod transport;

pub use messages::{ChatMessage, MessageRole};
pub use prompts::{PromptManager, PROMPT_ERROR_PREFIX};
pub use providers::{
    AnthropicAdapter, BlockReason, GeminiAdapter, OllamaAdapter, OpenAiAdapter, ParsedContent,
    ProbeBody, ProviderAdapter, ProviderInstance,
};
pub use rotation::{KeyRotation, MAX_POLLING_CYCLES};
pub use service::{ChatEvents, LlmService};
pub use streaming::{StreamEvent, TextStream};
pub use transport::{HttpClient, LineStream};
