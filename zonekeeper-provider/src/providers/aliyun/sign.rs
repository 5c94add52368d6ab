//! 阿里云 ACS3-HMAC-SHA256 签名
//! 参考: <https://www.alibabacloud.com/help/zh/sdk/product-overview/v3-request-structure-and-signature>

use sha2::{Digest, Sha256};

use crate::providers::common::hmac_sha256;

use super::{ALIYUN_DNS_HOST, ALIYUN_DNS_VERSION, AliyunProvider, EMPTY_BODY_SHA256};

const ALGORITHM: &str = "ACS3-HMAC-SHA256";
const SIGNED_HEADERS: &str =
    "host;x-acs-action;x-acs-content-sha256;x-acs-date;x-acs-signature-nonce;x-acs-version";

/// RPC 风格：参数全部在 query string，body 为空
fn canonical_request(action: &str, query_string: &str, timestamp: &str, nonce: &str) -> String {
    let canonical_headers = format!(
        "host:{ALIYUN_DNS_HOST}\nx-acs-action:{action}\nx-acs-content-sha256:{EMPTY_BODY_SHA256}\nx-acs-date:{timestamp}\nx-acs-signature-nonce:{nonce}\nx-acs-version:{ALIYUN_DNS_VERSION}\n"
    );
    format!("POST\n/\n{query_string}\n{canonical_headers}\n{SIGNED_HEADERS}\n{EMPTY_BODY_SHA256}")
}

impl AliyunProvider {
    /// `Authorization` header value for one request.
    pub(crate) fn sign(
        &self,
        action: &str,
        query_string: &str,
        timestamp: &str,
        nonce: &str,
    ) -> String {
        let request = canonical_request(action, query_string, timestamp, nonce);
        let string_to_sign = format!(
            "{ALGORITHM}\n{}",
            hex::encode(Sha256::digest(request.as_bytes()))
        );
        let signature = hex::encode(hmac_sha256(
            self.access_key_secret.as_bytes(),
            string_to_sign.as_bytes(),
        ));

        format!(
            "{ALGORITHM} Credential={},SignedHeaders={SIGNED_HEADERS},Signature={signature}",
            self.access_key_id
        )
    }
}
