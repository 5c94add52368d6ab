//! `DNSPod` API 调用

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ProviderError, Result};
use crate::http_client::HttpUtils;
use crate::traits::{ErrorContext, ProviderErrorMapper, RawApiError};

use super::types::{ApiError, Envelope};
use super::{DNSPOD_API_HOST, DNSPOD_VERSION, DnspodProvider};

/// Split the envelope into the API error (if any) and the payload.
fn unwrap_envelope(envelope: Envelope) -> std::result::Result<serde_json::Value, RawApiError> {
    let mut response = envelope.response;
    if let Some(error) = response.get_mut("Error").map(serde_json::Value::take)
        && let Ok(error) = serde_json::from_value::<ApiError>(error)
    {
        return Err(RawApiError::with_code(error.code, error.message));
    }
    Ok(response)
}

impl DnspodProvider {
    /// Signed POST with a JSON body.
    pub(crate) async fn request<T: DeserializeOwned, B: Serialize>(
        &self,
        action: &str,
        body: &B,
        ctx: ErrorContext,
    ) -> Result<T> {
        let payload =
            serde_json::to_string(body).map_err(|e| ProviderError::SerializationError {
                provider: self.provider_name().to_string(),
                detail: e.to_string(),
            })?;

        let timestamp = Utc::now().timestamp();
        let authorization = self.sign(action, &payload, timestamp);

        let request = self
            .client
            .post(format!("https://{DNSPOD_API_HOST}"))
            .header("Content-Type", "application/json; charset=utf-8")
            .header("Host", DNSPOD_API_HOST)
            .header("X-TC-Action", action)
            .header("X-TC-Version", DNSPOD_VERSION)
            .header("X-TC-Timestamp", timestamp.to_string())
            .header("Authorization", authorization)
            .body(payload);

        let (_status, text) = HttpUtils::execute_request_with_retry(
            request,
            self.provider_name(),
            &format!("POST {action}"),
            self.max_retries,
        )
        .await?;

        let envelope: Envelope = HttpUtils::parse_json(&text, self.provider_name())?;
        match unwrap_envelope(envelope) {
            Ok(data) => serde_json::from_value(data).map_err(|e| self.parse_error(e)),
            Err(raw) => {
                let err = self.map_error(raw, ctx);
                if err.is_expected() {
                    log::warn!("{err}");
                } else {
                    log::error!("{err}");
                }
                Err(err)
            }
        }
    }
}
