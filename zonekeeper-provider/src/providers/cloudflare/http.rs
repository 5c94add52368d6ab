//! Cloudflare HTTP 请求方法

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ProviderError, Result};
use crate::http_client::HttpUtils;
use crate::traits::{ErrorContext, ProviderErrorMapper, RawApiError};

use super::{CF_API_BASE, CloudflareProvider, Envelope};

impl CloudflareProvider {
    /// Send one API call and unwrap the `{success, result, errors}` envelope.
    pub(crate) async fn call<T, B>(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<&B>,
        ctx: ErrorContext,
    ) -> Result<Envelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{CF_API_BASE}{path_and_query}");
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.api_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let (status, text) = HttpUtils::execute_request_with_retry(
            request,
            self.provider_name(),
            &format!("{method} {path_and_query}"),
            self.max_retries,
        )
        .await?;

        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if status >= 400 => {
                return Err(ProviderError::NetworkError {
                    provider: self.provider_name().to_string(),
                    detail: format!("HTTP {status}"),
                });
            }
            Err(e) => return Err(self.parse_error(e)),
        };

        if !envelope.success || status >= 400 {
            let raw = envelope
                .first_error()
                .unwrap_or_else(|| RawApiError::new(format!("HTTP {status}")));
            // 401/403 without a documented code
            if raw.code.is_none() && matches!(status, 401 | 403) {
                return Err(ProviderError::InvalidCredentials {
                    provider: self.provider_name().to_string(),
                    raw_message: Some(raw.message),
                });
            }
            return Err(self.map_error(raw, ctx));
        }

        Ok(envelope)
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path_and_query: &str,
        ctx: ErrorContext,
    ) -> Result<Envelope<T>> {
        self.call::<T, ()>(Method::GET, path_and_query, None, ctx)
            .await
    }

    /// Call that must carry a `result`.
    pub(crate) async fn send_for_result<T, B>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        ctx: ErrorContext,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(method, path, Some(body), ctx)
            .await?
            .result
            .ok_or_else(|| self.parse_error("response has no result"))
    }

    pub(crate) async fn delete(&self, path: &str, ctx: ErrorContext) -> Result<()> {
        self.call::<serde_json::Value, ()>(Method::DELETE, path, None, ctx)
            .await
            .map(|_| ())
    }
}
