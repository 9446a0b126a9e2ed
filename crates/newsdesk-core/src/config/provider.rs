//! Provider configuration
//!
//! A [`ProviderConfig`] is an immutable snapshot taken from persisted
//! settings (or explicit overrides) when a provider is built. Changing it
//! means building a new provider; nothing observes it live.

use crate::config::classify::{classify_provider, ProviderKind};
use crate::error::{NewsdeskError, NewsdeskResult};
use serde::{Deserialize, Serialize};

/// Connection settings for one LLM backend
///
/// `api_url` is the full chat endpoint for OpenAI-compatible and Anthropic
/// backends, and a base URL for Gemini and Ollama, which append their own
/// paths. `api_keys` holds one entry for most backends; Gemini accepts a
/// pool and rotates through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub api_url: String,
    pub model: String,
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Overrides the `anthropic-version` header when set
    #[serde(default)]
    pub api_version: Option<String>,
    /// Explicit provider kind, consulted before name/URL classification
    #[serde(default)]
    pub provider_hint: Option<String>,
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        api_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_url: api_url.into(),
            model: model.into(),
            api_keys: Vec::new(),
            temperature: None,
            max_tokens: None,
            timeout_secs: None,
            api_version: None,
            provider_hint: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_keys.push(key.into());
        self
    }

    pub fn with_api_keys(mut self, keys: Vec<String>) -> Self {
        self.api_keys = keys;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_provider_hint(mut self, hint: impl Into<String>) -> Self {
        self.provider_hint = Some(hint.into());
        self
    }

    /// First key in the pool, if any
    pub fn first_key(&self) -> Option<&str> {
        self.api_keys.iter().map(String::as_str).find(|k| !k.is_empty())
    }

    /// Resolve the provider kind: explicit hint first, then name/URL matching
    pub fn kind(&self) -> ProviderKind {
        self.provider_hint
            .as_deref()
            .and_then(ProviderKind::from_identifier)
            .unwrap_or_else(|| classify_provider(Some(&self.name), Some(&self.api_url)))
    }

    /// Per-call timeout with the caller's path default applied
    pub fn timeout_or(&self, default_secs: u64) -> u64 {
        self.timeout_secs.unwrap_or(default_secs)
    }

    /// A provider cannot be built without an endpoint and a model
    pub fn validate(&self) -> NewsdeskResult<()> {
        if self.api_url.trim().is_empty() {
            return Err(NewsdeskError::config("API URL missing in provider config"));
        }
        if self.model.trim().is_empty() {
            return Err(NewsdeskError::config("model missing in provider config"));
        }
        if let Some(t) = self.timeout_secs {
            if t == 0 {
                return Err(NewsdeskError::config("timeout must be greater than zero"));
            }
        }
        Ok(())
    }
}
