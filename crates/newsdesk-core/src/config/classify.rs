//! Provider classification
//!
//! Maps a free-text configuration name and URL onto a closed set of
//! provider kinds. Classification is a pure function; the adapter chosen
//! for each kind lives in one dispatch table next to the adapters.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Closed set of recognized backends
///
/// Most kinds share the OpenAI-compatible wire format and differ only in
/// endpoint and branding; `Anthropic`, `Google`, and `Ollama` have their own
/// adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    Mistral,
    Fireworks,
    Ollama,
    Bailian,
    Dashscope,
    Zhipu,
    XAi,
    VolcengineArk,
    Generic,
}

impl ProviderKind {
    /// Stable identifier used in configuration and logs
    pub fn identifier(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Fireworks => "fireworks",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Bailian => "bailian",
            ProviderKind::Dashscope => "dashscope",
            ProviderKind::Zhipu => "zhipu",
            ProviderKind::XAi => "xai",
            ProviderKind::VolcengineArk => "volcengine_ark",
            ProviderKind::Generic => "generic",
        }
    }

    /// Inverse of [`identifier`](Self::identifier), for explicit hints
    pub fn from_identifier(s: &str) -> Option<ProviderKind> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "anthropic" => Some(ProviderKind::Anthropic),
            "google" | "gemini" => Some(ProviderKind::Google),
            "mistral" => Some(ProviderKind::Mistral),
            "fireworks" => Some(ProviderKind::Fireworks),
            "ollama" => Some(ProviderKind::Ollama),
            "bailian" => Some(ProviderKind::Bailian),
            "dashscope" => Some(ProviderKind::Dashscope),
            "zhipu" => Some(ProviderKind::Zhipu),
            "xai" => Some(ProviderKind::XAi),
            "volcengine_ark" => Some(ProviderKind::VolcengineArk),
            "generic" => Some(ProviderKind::Generic),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Classify a configuration by name first, then by URL
///
/// Name substrings win over URL substrings so a config called "My OpenAI
/// proxy" pointing at a relay host still gets OpenAI treatment. Unmatched
/// configs are `Generic` and use the OpenAI-compatible wire format.
pub fn classify_provider(name: Option<&str>, api_url: Option<&str>) -> ProviderKind {
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        let lower = name.to_lowercase();
        if lower.contains("openai") {
            return ProviderKind::OpenAi;
        }
        if lower.contains("anthropic") {
            return ProviderKind::Anthropic;
        }
        if lower.contains("google") || lower.contains("gemini") {
            return ProviderKind::Google;
        }
        if lower.contains("mistral") {
            return ProviderKind::Mistral;
        }
        if lower.contains("fireworks") {
            return ProviderKind::Fireworks;
        }
        if lower.contains("ollama") {
            return ProviderKind::Ollama;
        }
        if lower.contains("bailian") {
            return ProviderKind::Bailian;
        }
        if lower.contains("dashscope") {
            return ProviderKind::Dashscope;
        }
        if lower.contains("zhipu") {
            return ProviderKind::Zhipu;
        }
        if lower.contains("xai") || lower.contains("grok") {
            return ProviderKind::XAi;
        }
        if lower.contains("volcengine")
            || lower.contains("ark")
            || lower.contains("deepseek")
            || name.contains("火山方舟")
        {
            return ProviderKind::VolcengineArk;
        }
    }

    if let Some(url) = api_url.filter(|u| !u.is_empty()) {
        let lower = url.to_lowercase();
        if lower.contains("openai.com") {
            return ProviderKind::OpenAi;
        }
        if lower.contains("anthropic.com") {
            return ProviderKind::Anthropic;
        }
        if lower.contains("googleapis.com") {
            return ProviderKind::Google;
        }
        if lower.contains("mistral.ai") {
            return ProviderKind::Mistral;
        }
        if lower.contains("fireworks.ai") {
            return ProviderKind::Fireworks;
        }
        if lower.contains("localhost") || lower.contains("127.0.0.1") {
            return ProviderKind::Ollama;
        }
        if lower.contains("bailian.aliyuncs.com") {
            return ProviderKind::Bailian;
        }
        if lower.contains("dashscope.aliyuncs.com") {
            return ProviderKind::Dashscope;
        }
        if lower.contains("bigmodel.cn") {
            return ProviderKind::Zhipu;
        }
        if lower.contains("api.x.ai") {
            return ProviderKind::XAi;
        }
        if lower.contains("volces.com") {
            return ProviderKind::VolcengineArk;
        }
    }

    ProviderKind::Generic
}

/// Which kinds are denied true streaming
///
/// Some backends stream unreliably through this pipeline, so chat requests
/// against them are downgraded to a single response no matter what the
/// caller asked for. Policy data, not hidden logic, so deployments can
/// adjust it.
#[derive(Debug, Clone)]
pub struct StreamingPolicy {
    forced_non_streaming: HashSet<ProviderKind>,
}

impl Default for StreamingPolicy {
    fn default() -> Self {
        Self {
            forced_non_streaming: HashSet::from([ProviderKind::Google, ProviderKind::VolcengineArk]),
        }
    }
}

impl StreamingPolicy {
    pub fn new(forced_non_streaming: impl IntoIterator<Item = ProviderKind>) -> Self {
        Self {
            forced_non_streaming: forced_non_streaming.into_iter().collect(),
        }
    }

    pub fn allows_streaming(&self, kind: ProviderKind) -> bool {
        !self.forced_non_streaming.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_match_wins_over_url() {
        let kind = classify_provider(Some("Ollama local"), Some("https://api.openai.com/v1/chat/completions"));
        assert_eq!(kind, ProviderKind::Ollama);
    }

    #[test]
    fn url_used_when_name_is_uninformative() {
        let kind = classify_provider(Some("work account"), Some("https://api.anthropic.com/v1/messages"));
        assert_eq!(kind, ProviderKind::Anthropic);
        let kind = classify_provider(Some("dev"), Some("http://localhost:11434"));
        assert_eq!(kind, ProviderKind::Ollama);
    }

    #[test]
    fn grok_and_deepseek_aliases_resolve() {
        assert_eq!(classify_provider(Some("Grok beta"), None), ProviderKind::XAi);
        assert_eq!(classify_provider(Some("DeepSeek V3"), None), ProviderKind::VolcengineArk);
        assert_eq!(classify_provider(Some("火山方舟"), None), ProviderKind::VolcengineArk);
    }

    #[test]
    fn unmatched_config_is_generic() {
        assert_eq!(classify_provider(None, None), ProviderKind::Generic);
        assert_eq!(
            classify_provider(Some("my relay"), Some("https://llm.internal.example")),
            ProviderKind::Generic
        );
    }

    #[test]
    fn default_policy_downgrades_google_and_ark() {
        let policy = StreamingPolicy::default();
        assert!(!policy.allows_streaming(ProviderKind::Google));
        assert!(!policy.allows_streaming(ProviderKind::VolcengineArk));
        assert!(policy.allows_streaming(ProviderKind::OpenAi));
        assert!(policy.allows_streaming(ProviderKind::Ollama));
    }

    #[test]
    fn identifiers_round_trip() {
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::Google,
            ProviderKind::Mistral,
            ProviderKind::Fireworks,
            ProviderKind::Ollama,
            ProviderKind::Bailian,
            ProviderKind::Dashscope,
            ProviderKind::Zhipu,
            ProviderKind::XAi,
            ProviderKind::VolcengineArk,
            ProviderKind::Generic,
        ] {
            assert_eq!(ProviderKind::from_identifier(kind.identifier()), Some(kind));
        }
    }
}
