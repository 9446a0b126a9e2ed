//! LLM service: chat, article analysis, and connection testing
//!
//! One service owns the transport client and the active provider adapter.
//! Chat results and failures flow through the [`ChatEvents`] sink rather
//! than return values, so a UI can connect once and receive chunks,
//! completions, and errors uniformly for streaming and non-streaming
//! providers alike. Analysis calls are ordinary async operations with
//! `Result` returns, consumed by the analysis orchestrator.

use crate::config::{ProviderConfig, ProviderKind, StreamingPolicy};
use crate::error::{NewsdeskError, NewsdeskResult};
use crate::llm::messages::ChatMessage;
use crate::llm::prompts::{news_items_text, PromptManager, PROMPT_ERROR_PREFIX};
use crate::llm::providers::{ProbeBody, ProviderAdapter, ProviderInstance};
use crate::llm::transport::{HttpClient, LineStream};
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Read-gap bound for stream connections; a live generation can run much
/// longer than this as long as chunks keep arriving
const STREAM_READ_TIMEOUT_SECS: u64 = 120;

/// Default total deadline for chat requests
const CHAT_TIMEOUT_SECS: u64 = 120;

/// Default total deadline for single-article analysis
const ANALYSIS_TIMEOUT_SECS: u64 = 60;

/// Default total deadline for multi-article and custom-prompt analysis
const LONG_ANALYSIS_TIMEOUT_SECS: u64 = 120;

/// Default total deadline for connection probes
const TEST_TIMEOUT_SECS: u64 = 60;

const NOT_CONFIGURED_MESSAGE: &str = "LLM 未配置。请检查环境变量或在设置中选择有效的配置。";
const DEFAULT_CHAT_SYSTEM_PROMPT: &str = "你是一个专业的新闻分析助手。";

static IMPORTANCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"重要[程度性][:：]\s*(\d+(?:\.\d+)?)").unwrap());
static STANCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"立场[:：]\s*([-+]?\d+(?:\.\d+)?)").unwrap());

/// Sink for chat progress; the host application connects its UI here.
///
/// For any one chat call, exactly one of `chat_finished` or `chat_error`
/// fires, after zero or more `chat_chunk` calls.
pub trait ChatEvents: Send + Sync {
    fn chat_chunk(&self, text: &str);
    fn chat_finished(&self, content: &str);
    fn chat_error(&self, message: &str);
}

struct ActiveProvider {
    adapter: Arc<ProviderInstance>,
    kind: ProviderKind,
    config: ProviderConfig,
}

pub struct LlmService {
    http: HttpClient,
    prompts: Arc<PromptManager>,
    chat_events: Arc<dyn ChatEvents>,
    policy: StreamingPolicy,
    cancel_requested: Arc<AtomicBool>,
    active: Option<ActiveProvider>,
}

impl LlmService {
    pub fn new(
        prompts: Arc<PromptManager>,
        chat_events: Arc<dyn ChatEvents>,
    ) -> NewsdeskResult<Self> {
        Self::with_policy(prompts, chat_events, StreamingPolicy::default())
    }

    pub fn with_policy(
        prompts: Arc<PromptManager>,
        chat_events: Arc<dyn ChatEvents>,
        policy: StreamingPolicy,
    ) -> NewsdeskResult<Self> {
        Ok(Self {
            http: HttpClient::new(STREAM_READ_TIMEOUT_SECS)?,
            prompts,
            chat_events,
            policy,
            cancel_requested: Arc::new(AtomicBool::new(false)),
            active: None,
        })
    }

    /// Swap the active provider; `None` leaves the service unconfigured.
    /// A config that fails to build also leaves it unconfigured.
    pub fn set_provider(&mut self, config: Option<ProviderConfig>) -> NewsdeskResult<()> {
        self.active = None;
        let Some(config) = config else {
            info!("provider cleared, service is unconfigured");
            return Ok(());
        };

        let kind = config.kind();
        let adapter = Arc::new(ProviderInstance::from_config(&config)?);
        info!(name = %config.name, kind = %kind, model = %config.model, "provider activated");
        self.active = Some(ActiveProvider {
            adapter,
            kind,
            config,
        });
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.active.is_some()
    }

    pub fn provider_identifier(&self) -> Option<String> {
        self.active
            .as_ref()
            .map(|a| a.adapter.identifier().to_string())
    }

    /// Ask the running stream to stop after its current line. The stream
    /// still completes with `chat_finished` carrying whatever accumulated.
    pub fn cancel_stream(&self) {
        info!("chat stream cancellation requested");
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    fn require_provider(&self) -> NewsdeskResult<&ActiveProvider> {
        self.active
            .as_ref()
            .ok_or_else(|| NewsdeskError::config(NOT_CONFIGURED_MESSAGE))
    }

    /// Runs one chat exchange over the history plus an optional news
    /// context block.
    ///
    /// Streaming requests run on a spawned task whose handle is returned;
    /// non-streaming requests (including vendors the policy forces
    /// non-streaming) complete before returning `None`. All outcomes are
    /// reported through [`ChatEvents`], never as a return value.
    pub async fn chat(
        &self,
        history: &[ChatMessage],
        context: &str,
        stream: bool,
    ) -> Option<JoinHandle<()>> {
        self.cancel_requested.store(false, Ordering::SeqCst);

        let Some(active) = &self.active else {
            warn!("{}", NOT_CONFIGURED_MESSAGE);
            self.chat_events.chat_error(NOT_CONFIGURED_MESSAGE);
            return None;
        };

        let messages = assemble_chat_messages(&self.prompts, history, context);
        let should_stream = stream && self.policy.allows_streaming(active.kind);
        if stream && !should_stream {
            info!(kind = %active.kind, "forcing non-streaming chat for this provider");
        }

        if !should_stream {
            let timeout = active.config.timeout_or(CHAT_TIMEOUT_SECS);
            match send_chat_request(&self.http, &active.adapter, &messages, timeout).await {
                Ok(response) => {
                    let content = active.adapter.parse_response(&response).into_text();
                    self.chat_events.chat_finished(&content);
                }
                Err(e) => {
                    error!(error = %e, "non-streaming chat request failed");
                    self.chat_events.chat_error(&chat_error_message(&e));
                }
            }
            return None;
        }

        let http = self.http.clone();
        let adapter = Arc::clone(&active.adapter);
        let events = Arc::clone(&self.chat_events);
        let cancel = Arc::clone(&self.cancel_requested);
        Some(tokio::spawn(async move {
            run_stream_worker(http, adapter, events, cancel, messages).await;
        }))
    }

    /// Analyzes one article; the prompt comes from the template mapped to
    /// `analysis_type`. Returns the model's text.
    #[instrument(skip(self, article), level = "debug")]
    pub async fn analyze_news(
        &self,
        article: &Map<String, Value>,
        analysis_type: &str,
    ) -> NewsdeskResult<Value> {
        let active = self.require_provider()?;

        let prompt = self
            .prompts
            .get_formatted_prompt(None, article, Some(analysis_type));
        if prompt.starts_with(PROMPT_ERROR_PREFIX) {
            return Err(NewsdeskError::prompt(prompt));
        }

        let messages = vec![ChatMessage::user(prompt)];
        let timeout = active.config.timeout_or(ANALYSIS_TIMEOUT_SECS);
        let response = send_chat_request(&self.http, &active.adapter, &messages, timeout).await?;

        // Empty or unparseable content is absorbed into the success path
        // as explanatory text rather than raised, so every analysis flow
        // downstream always receives a string to store and display
        let content = active.adapter.parse_response(&response).into_text();
        if content.is_empty() {
            warn!(analysis_type, "analysis response carried no usable content");
            return Ok(Value::String("API 返回的内容为空或无法解析。".to_string()));
        }
        info!(analysis_type, length = content.len(), "article analysis completed");
        Ok(Value::String(content))
    }

    /// Analyzes a set of related articles as one event. The articles are
    /// rendered into a numbered `news_items` block for the template.
    #[instrument(skip(self, articles), level = "debug")]
    pub async fn analyze_news_group(
        &self,
        articles: &[Map<String, Value>],
        analysis_type: &str,
    ) -> NewsdeskResult<Value> {
        let active = self.require_provider()?;

        let mut prompt_data = Map::new();
        prompt_data.insert(
            "news_items".to_string(),
            Value::String(news_items_text(articles)),
        );
        let prompt = self
            .prompts
            .get_formatted_prompt(None, &prompt_data, Some(analysis_type));
        if prompt.starts_with(PROMPT_ERROR_PREFIX) {
            return Err(NewsdeskError::prompt(prompt));
        }

        let messages = vec![ChatMessage::user(prompt)];
        let timeout = active.config.timeout_or(LONG_ANALYSIS_TIMEOUT_SECS);
        let response = send_chat_request(&self.http, &active.adapter, &messages, timeout).await?;

        let content = active.adapter.parse_response(&response).into_text();
        if content.is_empty() {
            warn!(analysis_type, "group analysis response carried no usable content");
            return Ok(Value::String("分析成功，但模型未返回有效内容。".to_string()));
        }
        info!(analysis_type, count = articles.len(), "group analysis completed");
        Ok(Value::String(content))
    }

    /// Runs a user-authored prompt over the article fields. Importance and
    /// stance scores found in the reply are returned alongside the text.
    #[instrument(skip(self, data, custom_prompt), level = "debug")]
    pub async fn analyze_with_custom_prompt(
        &self,
        data: &Map<String, Value>,
        custom_prompt: &str,
    ) -> NewsdeskResult<Value> {
        let active = self.require_provider()?;

        let prompt = self.prompts.format_custom_prompt(custom_prompt, data);
        let messages = vec![ChatMessage::user(prompt)];
        let timeout = active.config.timeout_or(LONG_ANALYSIS_TIMEOUT_SECS);
        let response = send_chat_request(&self.http, &active.adapter, &messages, timeout).await?;

        let content = active.adapter.parse_response(&response).into_text();
        if content.is_empty() {
            warn!("custom prompt analysis returned no usable content");
            return Ok(Value::String("分析成功，但模型未返回有效内容。".to_string()));
        }

        let (importance, stance) = extract_metrics(&content);
        Ok(json!({
            "importance": importance,
            "stance": stance,
            "analysis": content,
        }))
    }

    /// Probes a candidate config without touching the active provider.
    /// Returns success plus a user-facing message; every failure mode is
    /// folded into the message rather than raised.
    pub async fn test_connection_with_config(&self, config: &ProviderConfig) -> (bool, String) {
        let adapter = match ProviderInstance::from_config(config) {
            Ok(adapter) => adapter,
            Err(e) => {
                error!(error = %e, name = %config.name, "connection test setup failed");
                return (false, format!("测试连接时发生错误: {e}"));
            }
        };
        let headers = match adapter.headers() {
            Ok(headers) => headers,
            Err(e) => return (false, format!("测试连接时发生错误: {e}")),
        };

        let url = adapter.test_connection_url();
        let timeout = config.timeout_or(TEST_TIMEOUT_SECS);
        info!(name = %config.name, provider = adapter.identifier(), url = %url, "testing connection");

        // Ollama probes with a GET against the server root and checks the
        // text banner; everything else POSTs a minimal chat payload
        let outcome = match adapter.test_connection_payload() {
            None => self
                .http
                .get_text(&url, &headers, timeout, None)
                .await
                .map(|text| {
                    let ok = adapter.check_test_connection_response(&ProbeBody::Text(text.clone()));
                    let message = if ok {
                        format!("连接成功: {}...", truncate_chars(&text, 100))
                    } else {
                        format!(
                            "连接失败: 未在响应中找到预期内容。响应: {}...",
                            truncate_chars(&text, 100)
                        )
                    };
                    (ok, message)
                }),
            Some(payload) => self
                .http
                .post_json(&url, &headers, &payload, timeout, None)
                .await
                .map(|value| {
                    let ok = adapter.check_test_connection_response(&ProbeBody::Json(value));
                    let message = if ok {
                        "连接测试成功。".to_string()
                    } else {
                        "连接测试失败: 响应内容未通过验证。".to_string()
                    };
                    (ok, message)
                }),
        };

        match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, name = %config.name, "connection test request failed");
                (false, format!("测试连接时发生错误: {e}"))
            }
        }
    }
}

/// Builds the outgoing message list: the `chat_system` template (or its
/// built-in default), with the news context appended when present, becomes
/// a leading system message ahead of the history.
fn assemble_chat_messages(
    prompts: &PromptManager,
    history: &[ChatMessage],
    context: &str,
) -> Vec<ChatMessage> {
    let template = prompts
        .load_template("chat_system")
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_CHAT_SYSTEM_PROMPT.to_string());
    let system_content = if context.is_empty() {
        template
    } else {
        format!("{template}\n\n相关新闻信息:\n{context}")
    };

    let mut messages = Vec::with_capacity(history.len() + 1);
    let trimmed = system_content.trim();
    if !trimmed.is_empty() {
        messages.push(ChatMessage::system(trimmed));
    }
    messages.extend_from_slice(history);
    messages
}

/// Routes a non-streaming request: Gemini goes through its key-rotation
/// path, everything else is one POST described by the adapter
async fn send_chat_request(
    http: &HttpClient,
    adapter: &ProviderInstance,
    messages: &[ChatMessage],
    timeout_secs: u64,
) -> NewsdeskResult<Value> {
    match adapter {
        ProviderInstance::Gemini(gemini) => gemini.send_chat(http, messages, timeout_secs).await,
        other => {
            let headers = other.headers()?;
            let payload = other.prepare_request(messages, false);
            http.post_json(
                &other.chat_url(),
                &headers,
                &payload,
                timeout_secs,
                other.fast_fail_status_codes(),
            )
            .await
        }
    }
}

async fn open_line_stream(
    http: &HttpClient,
    adapter: &ProviderInstance,
    messages: &[ChatMessage],
) -> NewsdeskResult<LineStream> {
    match adapter {
        ProviderInstance::Gemini(gemini) => gemini.open_stream(http, messages).await,
        other => {
            let headers = other.headers()?;
            let payload = other.prepare_request(messages, true);
            http.post_stream(
                &other.stream_url(),
                &headers,
                &payload,
                other.fast_fail_status_codes(),
            )
            .await
        }
    }
}

#[instrument(skip_all, fields(stream_id = %Uuid::new_v4(), provider = adapter.identifier()))]
async fn run_stream_worker(
    http: HttpClient,
    adapter: Arc<ProviderInstance>,
    events: Arc<dyn ChatEvents>,
    cancel: Arc<AtomicBool>,
    messages: Vec<ChatMessage>,
) {
    let stream = match open_line_stream(&http, &adapter, &messages).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "failed to open chat stream");
            events.chat_error(&chat_error_message(&e));
            return;
        }
    };
    pump_stream(stream, adapter, events, cancel).await;
}

/// Drains a line stream, forwarding chunks as they decode.
///
/// Exactly one terminal event fires: `chat_error` on a mid-stream
/// failure, otherwise one `chat_finished` with everything accumulated.
/// Cancelled streams and streams that produce no text still finish.
async fn pump_stream(
    mut stream: LineStream,
    adapter: Arc<ProviderInstance>,
    events: Arc<dyn ChatEvents>,
    cancel: Arc<AtomicBool>,
) {
    let stop_signal = adapter.stream_stop_signal();
    let mut accumulated = String::new();
    let mut saw_final = false;

    while let Some(item) = stream.next().await {
        if cancel.load(Ordering::SeqCst) {
            info!("chat stream cancelled, finishing with accumulated content");
            break;
        }
        match item {
            Ok(line) => {
                if stop_signal.is_some_and(|sig| line.trim() == sig) {
                    saw_final = true;
                    debug!("stream stop signal received");
                    continue;
                }
                let event = adapter.parse_stream_line(&line);
                if let Some(text) = &event.text {
                    accumulated.push_str(text);
                    events.chat_chunk(text);
                }
                if event.is_final {
                    saw_final = true;
                    debug!("stream reported its final chunk, draining remainder");
                }
            }
            Err(e) => {
                error!(error = %e, "chat stream failed mid-flight");
                events.chat_error(&chat_error_message(&e));
                return;
            }
        }
    }

    if !saw_final && !cancel.load(Ordering::SeqCst) {
        warn!("stream ended without a terminal chunk");
    }
    events.chat_finished(&accumulated);
}

/// User-facing message for a failed chat request
fn chat_error_message(e: &NewsdeskError) -> String {
    match e {
        NewsdeskError::Transport {
            status_code: Some(408),
            ..
        } => format!("错误：网络连接超时 ({e})"),
        NewsdeskError::Transport {
            status_code: Some(code),
            ..
        } => format!("错误：网络请求失败 (Status: {code}) ({e})"),
        NewsdeskError::Transport { .. } => format!("错误：网络请求失败 ({e})"),
        NewsdeskError::Provider { .. } | NewsdeskError::Decode { .. } => {
            format!("错误：API 请求失败 ({e})")
        }
        _ => format!("错误：处理聊天请求时发生意外错误 ({e})"),
    }
}

/// Pulls importance and stance scores out of analysis text. Both are
/// written by the templates as `重要程度: N` and `立场: N` lines.
fn extract_metrics(content: &str) -> (Option<f64>, Option<f64>) {
    let importance = IMPORTANCE_PATTERN
        .captures(content)
        .and_then(|c| c[1].parse().ok());
    let stance = STANCE_PATTERN
        .captures(content)
        .and_then(|c| c[1].parse().ok());
    (importance, stance)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::OpenAiAdapter;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingEvents {
        chunks: Mutex<Vec<String>>,
        finished: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl ChatEvents for RecordingEvents {
        fn chat_chunk(&self, text: &str) {
            self.chunks.lock().push(text.to_string());
        }
        fn chat_finished(&self, content: &str) {
            self.finished.lock().push(content.to_string());
        }
        fn chat_error(&self, message: &str) {
            self.errors.lock().push(message.to_string());
        }
    }

    fn service_with(events: Arc<RecordingEvents>) -> (TempDir, LlmService) {
        let dir = TempDir::new().unwrap();
        let prompts = Arc::new(PromptManager::new(dir.path()));
        let service = LlmService::new(prompts, events).unwrap();
        (dir, service)
    }

    fn openai_instance() -> Arc<ProviderInstance> {
        Arc::new(ProviderInstance::OpenAiCompatible(OpenAiAdapter::new(
            ProviderConfig::new("OpenAI", "https://api.openai.com/v1/chat/completions", "gpt-4o")
                .with_api_key("sk-test"),
        )))
    }

    fn line_stream(items: Vec<NewsdeskResult<String>>) -> LineStream {
        Box::pin(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn chat_without_provider_reports_error_event() {
        let events = Arc::new(RecordingEvents::default());
        let (_dir, service) = service_with(events.clone());

        let handle = service.chat(&[ChatMessage::user("hi")], "", true).await;
        assert!(handle.is_none());
        assert_eq!(*events.errors.lock(), vec![NOT_CONFIGURED_MESSAGE.to_string()]);
        assert!(events.finished.lock().is_empty());
    }

    #[tokio::test]
    async fn set_provider_toggles_configuration() {
        let events = Arc::new(RecordingEvents::default());
        let (_dir, mut service) = service_with(events);
        assert!(!service.is_configured());

        let config = ProviderConfig::new("OpenAI", "https://api.openai.com/v1/chat/completions", "gpt-4o")
            .with_api_key("sk-test");
        service.set_provider(Some(config)).unwrap();
        assert!(service.is_configured());
        assert_eq!(service.provider_identifier().as_deref(), Some("openai_compatible"));

        service.set_provider(None).unwrap();
        assert!(!service.is_configured());
    }

    #[tokio::test]
    async fn failed_provider_build_leaves_service_unconfigured() {
        let events = Arc::new(RecordingEvents::default());
        let (_dir, mut service) = service_with(events);

        let good = ProviderConfig::new("OpenAI", "https://api.openai.com/v1/chat/completions", "m")
            .with_api_key("k");
        service.set_provider(Some(good)).unwrap();

        // Anthropic without a key cannot build
        let bad = ProviderConfig::new("Anthropic", "https://api.anthropic.com/v1/messages", "m");
        assert!(service.set_provider(Some(bad)).is_err());
        assert!(!service.is_configured());
    }

    #[test]
    fn chat_messages_lead_with_system_prompt() {
        let dir = TempDir::new().unwrap();
        let prompts = PromptManager::new(dir.path());
        let history = vec![ChatMessage::user("你好")];

        let messages = assemble_chat_messages(&prompts, &history, "");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, DEFAULT_CHAT_SYSTEM_PROMPT);
        assert_eq!(messages[1].content, "你好");
    }

    #[test]
    fn chat_context_is_appended_to_system_prompt() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("chat_system.txt"), "你是新闻助手。").unwrap();
        let prompts = PromptManager::new(dir.path());

        let messages = assemble_chat_messages(&prompts, &[], "今日要闻……");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "你是新闻助手。\n\n相关新闻信息:\n今日要闻……");
    }

    #[test]
    fn blank_system_template_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("chat_system.txt"), "").unwrap();
        let prompts = PromptManager::new(dir.path());

        let messages = assemble_chat_messages(&prompts, &[], "");
        assert_eq!(messages[0].content, DEFAULT_CHAT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn stream_accumulates_chunks_and_finishes_once() {
        let events = Arc::new(RecordingEvents::default());
        let cancel = Arc::new(AtomicBool::new(false));
        let stream = line_stream(vec![
            Ok(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#.to_string()),
            Ok(r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#.to_string()),
            Ok("data: [DONE]".to_string()),
        ]);

        pump_stream(stream, openai_instance(), events.clone(), cancel).await;

        assert_eq!(*events.chunks.lock(), vec!["Hel", "lo"]);
        assert_eq!(*events.finished.lock(), vec!["Hello"]);
        assert!(events.errors.lock().is_empty());
    }

    #[tokio::test]
    async fn cancelled_stream_finishes_without_error() {
        let events = Arc::new(RecordingEvents::default());
        let cancel = Arc::new(AtomicBool::new(true));
        let stream = line_stream(vec![
            Ok(r#"data: {"choices":[{"delta":{"content":"never"}}]}"#.to_string()),
        ]);

        pump_stream(stream, openai_instance(), events.clone(), cancel).await;

        assert!(events.chunks.lock().is_empty());
        assert_eq!(*events.finished.lock(), vec![""]);
        assert!(events.errors.lock().is_empty());
    }

    #[tokio::test]
    async fn mid_stream_failure_emits_single_error_and_no_finish() {
        let events = Arc::new(RecordingEvents::default());
        let cancel = Arc::new(AtomicBool::new(false));
        let stream = line_stream(vec![
            Ok(r#"data: {"choices":[{"delta":{"content":"partial"}}]}"#.to_string()),
            Err(NewsdeskError::transport("connection reset")),
        ]);

        pump_stream(stream, openai_instance(), events.clone(), cancel).await;

        assert_eq!(*events.chunks.lock(), vec!["partial"]);
        assert!(events.finished.lock().is_empty());
        let errors = events.errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("错误：网络请求失败"));
    }

    #[tokio::test]
    async fn stream_ending_without_final_chunk_still_finishes() {
        let events = Arc::new(RecordingEvents::default());
        let cancel = Arc::new(AtomicBool::new(false));
        let stream = line_stream(vec![
            Ok(r#"data: {"choices":[{"delta":{"content":"cut off"}}]}"#.to_string()),
        ]);

        pump_stream(stream, openai_instance(), events.clone(), cancel).await;

        assert_eq!(*events.finished.lock(), vec!["cut off"]);
        assert!(events.errors.lock().is_empty());
    }

    #[test]
    fn chat_errors_map_by_failure_kind() {
        let timeout = NewsdeskError::timeout("request timed out");
        assert!(chat_error_message(&timeout).starts_with("错误：网络连接超时"));

        let status = NewsdeskError::transport_with_status("bad gateway", 502);
        let rendered = chat_error_message(&status);
        assert!(rendered.starts_with("错误：网络请求失败 (Status: 502)"));

        let plain = NewsdeskError::transport("dns failure");
        assert!(chat_error_message(&plain).starts_with("错误：网络请求失败 ("));

        let provider = NewsdeskError::provider("google:m", "quota");
        assert!(chat_error_message(&provider).starts_with("错误：API 请求失败"));

        let other = NewsdeskError::other("boom");
        assert!(chat_error_message(&other).starts_with("错误：处理聊天请求时发生意外错误"));
    }

    #[test]
    fn metrics_extraction_reads_scores() {
        let content = "分析如下。\n重要程度: 8.5\n立场: -0.5\n其余内容。";
        assert_eq!(extract_metrics(content), (Some(8.5), Some(-0.5)));

        // Full-width colon and the 重要性 variant both match
        let variant = "重要性：7\n立场：+1";
        assert_eq!(extract_metrics(variant), (Some(7.0), Some(1.0)));

        assert_eq!(extract_metrics("没有任何评分。"), (None, None));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("新闻分析", 2), "新闻");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
