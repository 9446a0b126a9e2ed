//! Provider configuration and classification

mod classify;
mod provider;

pub use classify::{classify_provider, ProviderKind, StreamingPolicy};
pub use provider::ProviderConfig;
