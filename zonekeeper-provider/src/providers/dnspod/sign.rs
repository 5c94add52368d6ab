//! `DNSPod` TC3-HMAC-SHA256 签名
//! 参考: <https://cloud.tencent.com/document/api/1427/56189>

use chrono::DateTime;
use sha2::{Digest, Sha256};

use crate::providers::common::hmac_sha256;

use super::{DNSPOD_API_HOST, DNSPOD_SERVICE, DnspodProvider};

const ALGORITHM: &str = "TC3-HMAC-SHA256";
const SIGNED_HEADERS: &str = "content-type;host;x-tc-action";

fn canonical_request(action: &str, payload: &str) -> String {
    let canonical_headers = format!(
        "content-type:application/json; charset=utf-8\nhost:{DNSPOD_API_HOST}\nx-tc-action:{}\n",
        action.to_lowercase()
    );
    let hashed_payload = hex::encode(Sha256::digest(payload.as_bytes()));
    format!("POST\n/\n\n{canonical_headers}\n{SIGNED_HEADERS}\n{hashed_payload}")
}

/// UTC date of the request, part of the credential scope.
fn scope_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

impl DnspodProvider {
    /// `Authorization` header value for one request.
    pub(crate) fn sign(&self, action: &str, payload: &str, timestamp: i64) -> String {
        let date = scope_date(timestamp);
        let credential_scope = format!("{date}/{DNSPOD_SERVICE}/tc3_request");
        let string_to_sign = format!(
            "{ALGORITHM}\n{timestamp}\n{credential_scope}\n{}",
            hex::encode(Sha256::digest(canonical_request(action, payload).as_bytes()))
        );

        // 派生密钥: date -> service -> tc3_request
        let secret_date = hmac_sha256(
            format!("TC3{}", self.secret_key).as_bytes(),
            date.as_bytes(),
        );
        let secret_service = hmac_sha256(&secret_date, DNSPOD_SERVICE.as_bytes());
        let secret_signing = hmac_sha256(&secret_service, b"tc3_request");
        let signature = hex::encode(hmac_sha256(&secret_signing, string_to_sign.as_bytes()));

        format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            self.secret_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-15 08:00:00 UTC
    const TS: i64 = 1_705_305_600;

    fn provider(key: &str) -> DnspodProvider {
        DnspodProvider::new("test_secret_id".to_string(), key.to_string()).unwrap()
    }

    fn signature(auth: &str) -> &str {
        auth.rsplit("Signature=").next().unwrap()
    }

    #[test]
    fn credential_scope_and_headers() {
        let auth = provider("k").sign("DescribeRecordList", "{}", TS);
        assert!(auth.starts_with(
            "TC3-HMAC-SHA256 Credential=test_secret_id/2024-01-15/dnspod/tc3_request, "
        ));
        assert!(auth.contains("SignedHeaders=content-type;host;x-tc-action, "));
        assert_eq!(signature(&auth).len(), 64);
    }

    #[test]
    fn action_is_lowercased_in_canonical_headers() {
        let req = canonical_request("CreateRecord", "{}");
        assert!(req.contains("x-tc-action:createrecord\n"));
        assert!(req.starts_with("POST\n/\n\n"));
    }

    #[test]
    fn signature_inputs() {
        let p = provider("key_alpha");
        let base = p.sign("DescribeRecordList", r#"{"Domain":"a.com"}"#, TS);
        assert_eq!(base, p.sign("DescribeRecordList", r#"{"Domain":"a.com"}"#, TS));

        let other_payload = p.sign("DescribeRecordList", r#"{"Domain":"b.com"}"#, TS);
        let other_action = p.sign("CreateRecord", r#"{"Domain":"a.com"}"#, TS);
        let other_key = provider("key_beta").sign("DescribeRecordList", r#"{"Domain":"a.com"}"#, TS);
        for other in [&other_payload, &other_action, &other_key] {
            assert_ne!(signature(&base), signature(other));
        }
    }

    #[test]
    fn scope_date_rolls_over_at_utc_midnight() {
        assert_eq!(scope_date(TS), "2024-01-15");
        assert_eq!(scope_date(1_705_348_800), "2024-01-15");
        assert_eq!(scope_date(1_705_392_000), "2024-01-16");
    }
}
