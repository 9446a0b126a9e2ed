//! Vendor adapters behind one trait
//!
//! Four wire formats cover every supported backend: the OpenAI chat
//! completion dialect (shared by a long tail of compatible vendors),
//! Anthropic's Messages API, Google Gemini, and Ollama. Dispatch from a
//! classified [`crate::config::ProviderKind`] to an adapter lives in
//! [`ProviderInstance::from_config`].

mod adapter;
mod anthropic;
mod content;
mod google;
mod ollama;
mod openai;

pub use adapter::{ProbeBody, ProviderAdapter, ProviderInstance};
pub use anthropic::AnthropicAdapter;
pub use content::{BlockReason, ParsedContent};
pub use google::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
