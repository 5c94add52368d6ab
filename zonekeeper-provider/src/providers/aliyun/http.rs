//! 阿里云 RPC 调用

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ProviderError, Result};
use crate::http_client::HttpUtils;
use crate::traits::{ErrorContext, ProviderErrorMapper, RawApiError};

use super::{
    ALIYUN_DNS_HOST, ALIYUN_DNS_VERSION, AliyunProvider, EMPTY_BODY_SHA256,
    serialize_to_query_string,
};

/// `{Code, Message}` when the body is an API error.
fn api_error(value: &serde_json::Value) -> Option<RawApiError> {
    let code = value.get("Code")?.as_str()?;
    let message = value.get("Message").and_then(|v| v.as_str()).unwrap_or(code);
    Some(RawApiError::with_code(code, message))
}

impl AliyunProvider {
    /// Signed POST with the parameters in the query string.
    pub(crate) async fn request<T: DeserializeOwned, B: Serialize>(
        &self,
        action: &str,
        params: &B,
        ctx: ErrorContext,
    ) -> Result<T> {
        let query_string = serialize_to_query_string(params)?;
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().to_string();
        let authorization = self.sign(action, &query_string, &timestamp, &nonce);

        let url = if query_string.is_empty() {
            format!("https://{ALIYUN_DNS_HOST}/")
        } else {
            format!("https://{ALIYUN_DNS_HOST}/?{query_string}")
        };

        let request = self
            .client
            .post(&url)
            .header("Host", ALIYUN_DNS_HOST)
            .header("x-acs-action", action)
            .header("x-acs-version", ALIYUN_DNS_VERSION)
            .header("x-acs-date", &timestamp)
            .header("x-acs-signature-nonce", &nonce)
            .header("x-acs-content-sha256", EMPTY_BODY_SHA256)
            .header("Authorization", authorization);

        let (status, text) = HttpUtils::execute_request_with_retry(
            request,
            self.provider_name(),
            &format!("POST {action}"),
            self.max_retries,
        )
        .await?;

        let value: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) if status >= 400 => {
                return Err(ProviderError::NetworkError {
                    provider: self.provider_name().to_string(),
                    detail: format!("HTTP {status}"),
                });
            }
            Err(e) => return Err(self.parse_error(e)),
        };

        if let Some(raw) = api_error(&value) {
            let err = self.map_error(raw, ctx);
            if err.is_expected() {
                log::warn!("{err}");
            } else {
                log::error!("{err}");
            }
            return Err(err);
        }
        if status >= 400 {
            return Err(ProviderError::NetworkError {
                provider: self.provider_name().to_string(),
                detail: format!("HTTP {status}"),
            });
        }

        serde_json::from_value(value).map_err(|e| self.parse_error(e))
    }
}
