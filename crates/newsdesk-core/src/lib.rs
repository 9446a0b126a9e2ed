//! Newsdesk core library
//!
//! The analysis subsystem of a desktop news aggregator: a uniform
//! abstraction over heterogeneous LLM vendors (OpenAI-compatible,
//! Anthropic, Google Gemini, Ollama), a resilient transport layer with
//! retry and multi-key rotation, a streaming state machine with
//! exactly-once terminal events, and the orchestration that turns
//! articles and clustered events into persisted analyses.

pub mod analysis;
pub mod config;
pub mod error;
pub mod llm;

// Re-export commonly used types
pub use analysis::{
    AnalysisEvents, AnalysisPayload, AnalysisRecord, AnalysisService, AnalysisStore,
    ArticleAnalyzer, JsonAnalysisStore, NewsArticle, NewsEvent,
};
pub use config::{classify_provider, ProviderConfig, ProviderKind, StreamingPolicy};
pub use error::{NewsdeskError, NewsdeskResult};
pub use llm::{ChatEvents, ChatMessage, LlmService, MessageRole, PromptManager};
