//! Multi-key rotation for quota-metered providers
//!
//! Google meters quota per API key, so a plan with several keys can ride
//! out 429/403 responses by moving to the next key. The engine runs up to
//! [`MAX_POLLING_CYCLES`] passes over the whole key list, resetting to the
//! first key at the top of each pass and backing off between passes. A
//! status outside the retryable set aborts immediately with the original
//! error.

use crate::error::{NewsdeskError, NewsdeskResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Passes over the full key list before the operation is declared failed.
pub const MAX_POLLING_CYCLES: u32 = 3;

/// Base delay between passes; doubles each pass (5s, 10s).
pub const POLLING_CYCLE_BASE_DELAY_SECS: u64 = 5;

/// Statuses that plausibly clear up under a different key. 400 is included
/// because Google reports disabled or malformed keys as 400.
pub const ROTATION_RETRYABLE_STATUS_CODES: [u16; 4] = [400, 403, 429, 408];

/// Cursor over a key list, wrapping at the end.
#[derive(Debug)]
pub struct KeyRotation<'a> {
    keys: &'a [String],
    index: usize,
}

impl<'a> KeyRotation<'a> {
    pub fn new(keys: &'a [String]) -> Self {
        Self { keys, index: 0 }
    }

    /// Rewinds to the first key at the top of a new cycle
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn current(&self) -> &'a str {
        &self.keys[self.index]
    }

    /// Moves to the next key. Returns false when the cursor wraps back to
    /// the first key, meaning every key has been visited this cycle.
    pub fn advance(&mut self) -> bool {
        self.index = (self.index + 1) % self.keys.len();
        self.index != 0
    }
}

/// Runs `attempt` under the rotation policy, calling it once per key per
/// cycle until one call succeeds. The closure receives the key for that
/// attempt and must build a fresh request from it.
///
/// `request_label` names the operation in the final error ("非流式请求" or
/// "流式请求").
pub async fn run_with_rotation<T, F, Fut>(
    keys: &[String],
    request_label: &str,
    provider: &str,
    mut attempt: F,
) -> NewsdeskResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = NewsdeskResult<T>>,
{
    if keys.is_empty() {
        return Err(NewsdeskError::config("API密钥列表不能为空"));
    }

    let mut rotation = KeyRotation::new(keys);
    let mut last_error: Option<NewsdeskError> = None;

    for cycle in 0..MAX_POLLING_CYCLES {
        debug!(
            provider,
            cycle = cycle + 1,
            total = MAX_POLLING_CYCLES,
            "starting key rotation cycle"
        );
        rotation.reset();

        loop {
            let key = rotation.current().to_string();
            debug!(provider, key = %key_suffix(&key), "attempting request");

            match attempt(key).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let status = e.status_code();
                    if status.is_some_and(|s| ROTATION_RETRYABLE_STATUS_CODES.contains(&s)) {
                        warn!(
                            provider,
                            status = status,
                            error = %e,
                            "key failed with retryable status, rotating"
                        );
                        last_error = Some(e);
                        if !rotation.advance() {
                            warn!(provider, cycle = cycle + 1, "all keys tried this cycle");
                            break;
                        }
                    } else {
                        error!(
                            provider,
                            status = status,
                            error = %e,
                            "non-retryable error, aborting rotation"
                        );
                        return Err(e);
                    }
                }
            }
        }

        if cycle < MAX_POLLING_CYCLES - 1 {
            let delay = Duration::from_secs(POLLING_CYCLE_BASE_DELAY_SECS * 2u64.pow(cycle));
            warn!(
                provider,
                cycle = cycle + 1,
                delay_secs = delay.as_secs(),
                "rotation cycle failed, delaying before next cycle"
            );
            tokio::time::sleep(delay).await;
        }
    }

    let message = match &last_error {
        Some(e) => format!(
            "{request_label}失败，所有API密钥在 {MAX_POLLING_CYCLES} 轮尝试后均失败。最后错误: {e}"
        ),
        None => format!(
            "{request_label}失败，所有API密钥在 {MAX_POLLING_CYCLES} 轮尝试后均失败，且未记录特定错误。"
        ),
    };
    Err(match last_error.as_ref().and_then(NewsdeskError::status_code) {
        Some(code) => NewsdeskError::provider_with_status(provider, message, code),
        None => NewsdeskError::provider(provider, message),
    })
}

/// Last few characters of a key, for logs that must not leak the key itself
pub(crate) fn key_suffix(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let start = chars.len().saturating_sub(6);
    format!("...{}", chars[start..].iter().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_key_list_is_a_config_error() {
        let result: NewsdeskResult<()> =
            run_with_rotation(&[], "非流式请求", "google", |_key| async {
                panic!("attempt must not run without keys")
            })
            .await;
        assert!(result.unwrap_err().is_config());
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let log = attempts.clone();

        let result = run_with_rotation(&keys(&["k1", "k2"]), "非流式请求", "google", |key| {
            let log = log.clone();
            async move {
                log.lock().push(key);
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempts.lock(), vec!["k1"]);
    }

    #[tokio::test]
    async fn retryable_status_rotates_to_next_key() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let log = attempts.clone();

        let result = run_with_rotation(&keys(&["k1", "k2", "k3"]), "非流式请求", "google", |key| {
            let log = log.clone();
            async move {
                log.lock().push(key.clone());
                if key == "k2" {
                    Ok("ok")
                } else {
                    Err(NewsdeskError::transport_with_status("quota", 429))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(*attempts.lock(), vec!["k1", "k2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_cycle_succeeds_after_one_backoff() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();
        let start = tokio::time::Instant::now();

        let result = run_with_rotation(
            &keys(&["k1", "k2", "k3", "k4"]),
            "非流式请求",
            "google",
            |key| {
                let counter = counter.clone();
                async move {
                    let mut n = counter.lock();
                    *n += 1;
                    if *n == 7 {
                        Ok(key)
                    } else {
                        Err(NewsdeskError::transport_with_status("quota", 429))
                    }
                }
            },
        )
        .await;

        // Four failures in cycle one, one backoff, then success on the
        // third key of cycle two
        assert_eq!(result.unwrap(), "k3");
        assert_eq!(*attempts.lock(), 7);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_tries_every_key_every_cycle() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let log = attempts.clone();

        let result: NewsdeskResult<()> =
            run_with_rotation(&keys(&["k1", "k2"]), "非流式请求", "google", |key| {
                let log = log.clone();
                async move {
                    log.lock().push(key);
                    Err(NewsdeskError::transport_with_status("quota exhausted", 429))
                }
            })
            .await;

        // 2 keys x 3 cycles, first key first in every cycle
        assert_eq!(
            *attempts.lock(),
            vec!["k1", "k2", "k1", "k2", "k1", "k2"]
        );
        let err = result.unwrap_err();
        assert_eq!(err.status_code(), Some(429));
        let message = err.to_string();
        assert!(message.contains("非流式请求失败"));
        assert!(message.contains("3 轮尝试后均失败"));
        assert!(message.contains("quota exhausted"));
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_delays_double_from_base() {
        let start = tokio::time::Instant::now();

        let _: NewsdeskResult<()> =
            run_with_rotation(&keys(&["only"]), "流式请求", "google", |_key| async {
                Err(NewsdeskError::transport_with_status("quota", 429))
            })
            .await;

        // 5s after cycle 1 plus 10s after cycle 2, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn non_retryable_status_aborts_on_first_attempt() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();

        let result: NewsdeskResult<()> =
            run_with_rotation(&keys(&["k1", "k2"]), "非流式请求", "google", |_key| {
                let counter = counter.clone();
                async move {
                    *counter.lock() += 1;
                    Err(NewsdeskError::transport_with_status("server exploded", 500))
                }
            })
            .await;

        assert_eq!(*attempts.lock(), 1);
        assert_eq!(result.unwrap_err().status_code(), Some(500));
    }

    #[tokio::test]
    async fn statusless_error_is_not_retried() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();

        let result: NewsdeskResult<()> =
            run_with_rotation(&keys(&["k1", "k2"]), "非流式请求", "google", |_key| {
                let counter = counter.clone();
                async move {
                    *counter.lock() += 1;
                    Err(NewsdeskError::transport("connection refused"))
                }
            })
            .await;

        assert_eq!(*attempts.lock(), 1);
        assert!(result.is_err());
    }

    #[test]
    fn key_suffix_keeps_only_the_tail() {
        assert_eq!(key_suffix("AIzaSyD-1234567890"), "...567890");
        assert_eq!(key_suffix("tiny"), "...tiny");
    }
}
