//! Provider policy integration test
//!
//! Verifies that free-text provider configurations resolve to the right
//! backend kind and that the streaming downgrade table holds.

use newsdesk_core::{classify_provider, ProviderConfig, ProviderKind, StreamingPolicy};

#[test]
fn test_vendor_names_resolve_to_kinds() {
    // Name substrings decide the kind before the URL is consulted
    assert_eq!(
        classify_provider(Some("Azure OpenAI"), None),
        ProviderKind::OpenAi
    );
    assert_eq!(
        classify_provider(Some("Anthropic Claude"), None),
        ProviderKind::Anthropic
    );
    assert_eq!(
        classify_provider(Some("Google Gemini"), None),
        ProviderKind::Google
    );
    assert_eq!(
        classify_provider(Some("Ollama (local)"), None),
        ProviderKind::Ollama
    );
    assert_eq!(
        classify_provider(Some("DeepSeek V3"), None),
        ProviderKind::VolcengineArk
    );
    assert_eq!(
        classify_provider(Some("火山方舟"), None),
        ProviderKind::VolcengineArk
    );
}

#[test]
fn test_vendor_urls_resolve_when_name_is_uninformative() {
    assert_eq!(
        classify_provider(Some("work"), Some("https://api.openai.com/v1/chat/completions")),
        ProviderKind::OpenAi
    );
    assert_eq!(
        classify_provider(Some("dev"), Some("http://localhost:11434")),
        ProviderKind::Ollama
    );
    assert_eq!(
        classify_provider(Some("backup"), Some("https://open.bigmodel.cn/api/paas/v4/chat/completions")),
        ProviderKind::Zhipu
    );
}

#[test]
fn test_explicit_hint_wins_over_classification() {
    let config = ProviderConfig::new("my relay", "https://relay.example/v1", "gemini-pro")
        .with_provider_hint("gemini");
    assert_eq!(config.kind(), ProviderKind::Google);

    // A bad hint falls back to name/URL matching
    let config = ProviderConfig::new("Ollama box", "http://10.0.0.2:11434", "llama3")
        .with_provider_hint("not-a-kind");
    assert_eq!(config.kind(), ProviderKind::Ollama);
}

#[test]
fn test_streaming_downgrade_table() {
    let policy = StreamingPolicy::default();

    // Backends that stream unreliably are forced non-streaming
    assert!(!policy.allows_streaming(ProviderKind::Google));
    assert!(!policy.allows_streaming(ProviderKind::VolcengineArk));

    assert!(policy.allows_streaming(ProviderKind::OpenAi));
    assert!(policy.allows_streaming(ProviderKind::Anthropic));
    assert!(policy.allows_streaming(ProviderKind::Ollama));
    assert!(policy.allows_streaming(ProviderKind::Generic));
}

#[test]
fn test_streaming_policy_is_data_not_logic() {
    // Deployments can swap the deny set without touching dispatch
    let policy = StreamingPolicy::new([ProviderKind::Anthropic]);
    assert!(!policy.allows_streaming(ProviderKind::Anthropic));
    assert!(policy.allows_streaming(ProviderKind::Google));
}

#[test]
fn test_invalid_configs_are_rejected() {
    let no_url = ProviderConfig::new("OpenAI", "", "gpt-4o");
    assert!(no_url.validate().is_err());

    let no_model = ProviderConfig::new("OpenAI", "https://api.openai.com/v1/chat/completions", "");
    assert!(no_model.validate().is_err());

    let zero_timeout = ProviderConfig::new("OpenAI", "https://api.openai.com/v1/chat/completions", "gpt-4o")
        .with_timeout_secs(0);
    assert!(zero_timeout.validate().is_err());
}
