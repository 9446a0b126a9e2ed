//! HTTP transport shared by every provider
//!
//! Owns connection setup, request timeouts, and retry with exponential
//! backoff for transport-level failures. Vendor-specific retry semantics
//! (key rotation) stay out of this layer: callers hand in the status codes
//! they want surfaced immediately instead of retried.

use crate::error::{NewsdeskError, NewsdeskResult};
use crate::llm::line_decoder::LineDecoder;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Retries after the first attempt, so 4 attempts total
const MAX_RETRIES: u32 = 3;
/// Base backoff delay, doubled per attempt (1s, 2s, 4s)
const BASE_RETRY_DELAY_SECS: u64 = 1;

/// Stream of decoded text lines from a chunked response
///
/// An `Err` item is terminal: once bytes are flowing, transport failures end
/// the stream and are never retried here. Restarting the whole call is the
/// caller's decision.
pub type LineStream = Pin<Box<dyn futures::Stream<Item = NewsdeskResult<String>> + Send>>;

/// HTTP client with uniform retry behavior
///
/// Retryable: connect failures, timeouts, and HTTP 429 (honoring an integer
/// `Retry-After` when present). Statuses listed in `fast_fail` are raised
/// immediately with the status preserved so the caller can rotate keys.
/// Every other non-success status is raised immediately.
///
/// Timeouts are per call: non-streaming requests get a total deadline,
/// streams get the client-wide read-gap timeout instead so a slow but live
/// generation is not cut off mid-body.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client; `read_timeout_secs` bounds the gap between stream reads
    pub fn new(read_timeout_secs: u64) -> NewsdeskResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .build()
            .map_err(|e| {
                NewsdeskError::transport_with_context(
                    format!("failed to build HTTP client: {}", e),
                    "transport setup",
                )
            })?;

        debug!(read_timeout_secs, "created transport client");
        Ok(Self { client })
    }

    /// POST a JSON payload and decode the JSON response body
    ///
    /// A malformed body on a success status is a decode error, not a
    /// transport error; it carries no status code.
    #[instrument(skip(self, headers, payload, fast_fail), level = "debug")]
    pub async fn post_json(
        &self,
        url: &str,
        headers: &HeaderMap,
        payload: &Value,
        timeout_secs: u64,
        fast_fail: Option<&[u16]>,
    ) -> NewsdeskResult<Value> {
        let response = self
            .execute_with_retry(
                || {
                    self.client
                        .post(url)
                        .headers(headers.clone())
                        .json(payload)
                        .timeout(Duration::from_secs(timeout_secs))
                },
                url,
                fast_fail,
            )
            .await?;

        response
            .json::<Value>()
            .await
            .map_err(|e| NewsdeskError::decode(format!("invalid JSON from {}: {}", url, e)))
    }

    /// GET a URL and return the raw body text
    #[instrument(skip(self, headers, fast_fail), level = "debug")]
    pub async fn get_text(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout_secs: u64,
        fast_fail: Option<&[u16]>,
    ) -> NewsdeskResult<String> {
        let response = self
            .execute_with_retry(
                || {
                    self.client
                        .get(url)
                        .headers(headers.clone())
                        .timeout(Duration::from_secs(timeout_secs))
                },
                url,
                fast_fail,
            )
            .await?;

        response
            .text()
            .await
            .map_err(|e| NewsdeskError::transport(format!("failed reading body from {}: {}", url, e)))
    }

    /// POST a JSON payload and return the response as a stream of lines
    ///
    /// Retry applies to connection establishment only. The returned stream
    /// decodes bytes into complete lines, carrying split UTF-8 sequences
    /// across chunk boundaries. No total deadline is set here; the client's
    /// read-gap timeout bounds stalls instead.
    #[instrument(skip(self, headers, payload, fast_fail), level = "debug")]
    pub async fn post_stream(
        &self,
        url: &str,
        headers: &HeaderMap,
        payload: &Value,
        fast_fail: Option<&[u16]>,
    ) -> NewsdeskResult<LineStream> {
        let response = self
            .execute_with_retry(
                || self.client.post(url).headers(headers.clone()).json(payload),
                url,
                fast_fail,
            )
            .await?;

        let decoder = Arc::new(Mutex::new(LineDecoder::new()));
        let tail = Arc::clone(&decoder);

        let lines = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder
                    .lock()
                    .feed(&bytes)
                    .into_iter()
                    .map(Ok)
                    .collect::<Vec<_>>(),
                Err(e) => vec![Err(NewsdeskError::transport(format!(
                    "stream interrupted: {}",
                    e
                )))],
            })
            .flat_map(futures::stream::iter)
            .chain(
                futures::stream::once(async move { tail.lock().finish().map(Ok) })
                    .filter_map(|flushed| async move { flushed }),
            );

        Ok(Box::pin(lines))
    }

    /// Issue a request, retrying transport failures and 429 with backoff
    async fn execute_with_retry<F>(
        &self,
        build: F,
        url: &str,
        fast_fail: Option<&[u16]>,
    ) -> NewsdeskResult<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            let mut retry_delay = None;

            match build().send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if fast_fail.is_some_and(|codes| codes.contains(&status)) {
                        debug!(status, url, "fast-fail status, handing back to caller");
                        return Err(NewsdeskError::transport_with_status(
                            format!("request to {} failed with status {}", url, status),
                            status,
                        ));
                    }

                    if status == 429 {
                        retry_delay = parse_retry_after(response.headers());
                        last_error = Some(NewsdeskError::transport_with_status(
                            format!("request to {} rate limited", url),
                            429,
                        ));
                    } else if !response.status().is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(NewsdeskError::transport_with_status(
                            format!(
                                "request to {} failed with status {}: {}",
                                url,
                                status,
                                truncate(&body, 300)
                            ),
                            status,
                        ));
                    } else {
                        if attempt > 0 {
                            debug!(attempt, url, "request succeeded after retry");
                        }
                        return Ok(response);
                    }
                }
                Err(e) if e.is_timeout() => {
                    last_error = Some(NewsdeskError::timeout(format!(
                        "request to {} timed out",
                        url
                    )));
                }
                Err(e) => {
                    last_error = Some(NewsdeskError::transport(format!(
                        "request to {} failed: {}",
                        url, e
                    )));
                }
            }

            if attempt < MAX_RETRIES {
                let delay = retry_delay
                    .unwrap_or_else(|| BASE_RETRY_DELAY_SECS * 2_u64.pow(attempt));
                warn!(
                    attempt = attempt + 1,
                    max_attempts = MAX_RETRIES + 1,
                    delay_secs = delay,
                    url,
                    "transport failure, retrying"
                );
                sleep(Duration::from_secs(delay)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            NewsdeskError::transport(format!(
                "request to {} failed after {} attempts",
                url,
                MAX_RETRIES + 1
            ))
        }))
    }
}

/// Parse an integer `Retry-After` header, seconds form only
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars).collect();
        format!("{}...", kept)
    }
}
