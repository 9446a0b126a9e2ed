//! Analysis orchestration: coordinates LLM calls, persistence, and
//! progress notifications for articles and clustered events

pub mod events;
pub mod service;
pub mod storage;
pub mod types;

pub use events::AnalysisEvents;
pub use service::{AnalysisService, ArticleAnalyzer};
pub use storage::{AnalysisStore, JsonAnalysisStore};
pub use types::{AnalysisPayload, AnalysisRecord, NewsArticle, NewsEvent};
