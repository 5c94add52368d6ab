//! Shared HTTP plumbing for the drivers.
//!
//! Drivers build their own signed `RequestBuilder`; this module sends it, logs a
//! truncated trace, classifies transport failures and handles retries.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::utils::log_sanitizer::truncate_for_log;

/// Cap applied to a server-provided `Retry-After`.
const MAX_RETRY_AFTER_SECS: u64 = 30;
/// Cap applied to exponential backoff.
const MAX_BACKOFF_MS: u64 = 10_000;

pub struct HttpUtils;

impl HttpUtils {
    /// Send once. Returns `(status, body)` for every response the driver should
    /// interpret itself; 429 and 502-504 are turned into errors here.
    pub async fn execute_request(
        request_builder: RequestBuilder,
        provider_name: &str,
        label: &str,
    ) -> Result<(u16, String), ProviderError> {
        log::debug!("[{provider_name}] -> {label}");

        let response = request_builder
            .send()
            .await
            .map_err(|e| transport_error(provider_name, &e))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        if status == 429 {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[{provider_name}] rate limited on {label}, retry_after={retry_after:?}");
            return Err(ProviderError::RateLimited {
                provider: provider_name.to_string(),
                retry_after,
                raw_message: Some(truncate_for_log(&body)),
            });
        }

        if (502..=504).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[{provider_name}] upstream HTTP {status} on {label}");
            return Err(ProviderError::NetworkError {
                provider: provider_name.to_string(),
                detail: format!("HTTP {status}: {}", truncate_for_log(&body)),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError {
                provider: provider_name.to_string(),
                detail: format!("failed to read response body: {e}"),
            })?;

        log::debug!(
            "[{provider_name}] <- {status} {}",
            truncate_for_log(&body)
        );
        Ok((status, body))
    }

    /// [`execute_request`](Self::execute_request) with up to `max_retries` extra
    /// attempts for transient failures (network, timeout, 429).
    pub async fn execute_request_with_retry(
        request_builder: RequestBuilder,
        provider_name: &str,
        label: &str,
        max_retries: u32,
    ) -> Result<(u16, String), ProviderError> {
        let mut attempt = 0;
        loop {
            // streaming bodies cannot be cloned; send those once
            let Some(req) = request_builder.try_clone() else {
                return Self::execute_request(request_builder, provider_name, label).await;
            };

            match Self::execute_request(req, provider_name, label).await {
                Err(e) if attempt < max_retries && e.is_transient() => {
                    let delay = retry_delay(&e, attempt);
                    log::warn!(
                        "[{provider_name}] {label} failed (attempt {}/{}), retrying in {}ms: {e}",
                        attempt + 1,
                        max_retries + 1,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Deserialize a JSON body, logging a truncated copy when it does not parse.
    pub fn parse_json<T>(body: &str, provider_name: &str) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_str(body).map_err(|e| {
            log::error!(
                "[{provider_name}] unexpected response shape: {e}; body: {}",
                truncate_for_log(body)
            );
            ProviderError::ParseError {
                provider: provider_name.to_string(),
                detail: e.to_string(),
            }
        })
    }
}

fn transport_error(provider_name: &str, e: &reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout {
            provider: provider_name.to_string(),
            detail: e.to_string(),
        }
    } else {
        ProviderError::NetworkError {
            provider: provider_name.to_string(),
            detail: e.to_string(),
        }
    }
}

/// `Retry-After` when the server sent one, otherwise exponential backoff.
fn retry_delay(error: &ProviderError, attempt: u32) -> Duration {
    match error {
        ProviderError::RateLimited {
            retry_after: Some(secs),
            ..
        } => Duration::from_secs((*secs).min(MAX_RETRY_AFTER_SECS)),
        _ => backoff_delay(attempt),
    }
}

/// 100ms, 200ms, 400ms ... capped at 10s.
fn backoff_delay(attempt: u32) -> Duration {
    let ms = 100_u64.saturating_mul(1_u64 << attempt.min(20));
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}
