//! `DNSPod` error mapping
//!
//! Reference: <https://cloud.tencent.com/document/api/1427/56192>

use crate::error::ProviderError;
use crate::traits::{CodeClass, ErrorContext, ProviderErrorMapper, RawApiError, RecordField};

use super::DnspodProvider;

/// Codes outside the `AuthFailure.*` / `OperationDenied.*` families that still mean
/// a bad or insufficient credential.
const CREDENTIAL_CODES: &[&str] = &[
    "InvalidParameter.InvalidSecretId",
    "InvalidParameter.InvalidSignature",
    "InvalidParameter.PermissionDenied",
    "InvalidParameter.LoginTokenIdError",
    "InvalidParameter.LoginTokenNotExists",
    "InvalidParameter.LoginTokenValidateFailed",
];

const PERMISSION_CODES: &[&str] = &[
    "UnauthorizedOperation",
    "FailedOperation.NotDomainOwner",
    "FailedOperation.NotResourceOwner",
    "FailedOperation.NotBatchTaskOwner",
    "InvalidParameter.NoAuthorityToSrcDomain",
    "InvalidParameter.NoAuthorityToTheGroup",
];

/// Temporary limits; everything else under `LimitExceeded` / `RequestLimitExceeded`
/// is a quota that retrying will not fix.
const THROTTLE_CODES: &[&str] = &[
    "RequestLimitExceeded",
    "RequestLimitExceeded.RequestLimitExceeded",
    "FailedOperation.FrequencyLimit",
    "InvalidParameter.OperationIsTooFrequent",
];

const ZONE_LOCK_CODES: &[&str] = &[
    "FailedOperation.DomainIsLocked",
    "FailedOperation.DomainIsSpam",
    "FailedOperation.AccountIsLocked",
    "InvalidParameter.UserAlreadyLocked",
    "InvalidParameter.DomainIsNotlocked",
    "InvalidParameter.DomainNotAllowedLock",
];

fn classify(code: &str) -> Option<CodeClass> {
    use CodeClass::{
        Credentials, Invalid, Permission, Quota, RecordExists, RecordMissing, Throttled,
        ZoneLocked, ZoneMissing,
    };

    let class = match code {
        // TTL 超限归为参数问题，不是配额
        "LimitExceeded.RecordTtlLimit" => Invalid(RecordField::Ttl),
        c if THROTTLE_CODES.contains(&c) => Throttled,
        c if c.starts_with("LimitExceeded") || c.starts_with("RequestLimitExceeded") => Quota,
        c if c.starts_with("AuthFailure") || CREDENTIAL_CODES.contains(&c) => Credentials,
        c if c.starts_with("OperationDenied") || PERMISSION_CODES.contains(&c) => Permission,
        c if ZONE_LOCK_CODES.contains(&c) => ZoneLocked,
        "InvalidParameter.DomainRecordExist" => RecordExists,
        "ResourceNotFound.NoDataOfDomain" | "InvalidParameterValue.DomainNotExists" => ZoneMissing,
        "InvalidParameter.RecordIdInvalid" | "ResourceNotFound.NoDataOfRecordId" => RecordMissing,
        "InvalidParameter.RecordLineInvalid" | "InvalidParameter.LineNotExist" => {
            Invalid(RecordField::Line)
        }
        "InvalidParameter.RecordTypeInvalid" => Invalid(RecordField::Type),
        "InvalidParameter.RecordValueInvalid" | "InvalidParameter.RecordValueLengthInvalid" => {
            Invalid(RecordField::Value)
        }
        "InvalidParameter.SubdomainInvalid" => Invalid(RecordField::Name),
        "InvalidParameter.MxInvalid" => Invalid(RecordField::Priority),
        "InvalidParameter.DomainIdInvalid"
        | "InvalidParameter.DomainInvalid"
        | "InvalidParameter.DomainTooLong"
        | "InvalidParameter.DomainTypeInvalid" => Invalid(RecordField::Zone),
        _ => return None,
    };
    Some(class)
}

impl ProviderErrorMapper for DnspodProvider {
    fn provider_name(&self) -> &'static str {
        "dnspod"
    }

    fn map_error(&self, raw: RawApiError, context: ErrorContext) -> ProviderError {
        let class = raw.code.as_deref().and_then(classify);
        self.classified(class, raw, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(code: &str, ctx: ErrorContext) -> ProviderError {
        DnspodProvider::new(String::new(), String::new())
            .unwrap()
            .map_error(RawApiError::with_code(code, "msg"), ctx)
    }

    #[test]
    fn auth_and_permission() {
        for code in [
            "AuthFailure",
            "AuthFailure.InvalidSecretId",
            "InvalidParameter.LoginTokenNotExists",
        ] {
            let err = map(code, ErrorContext::default());
            assert!(
                matches!(err, ProviderError::InvalidCredentials { .. }),
                "{code} -> {err:?}"
            );
        }
        for code in [
            "OperationDenied",
            "OperationDenied.NotAgent",
            "UnauthorizedOperation",
            "FailedOperation.NotDomainOwner",
        ] {
            let err = map(code, ErrorContext::default());
            assert!(
                matches!(err, ProviderError::PermissionDenied { .. }),
                "{code} -> {err:?}"
            );
        }
    }

    #[test]
    fn quota_is_not_transient_but_throttling_is() {
        for code in ["LimitExceeded.AAAACountLimit", "RequestLimitExceeded.CreateDomainLimit"] {
            let quota = map(code, ErrorContext::default());
            assert!(matches!(quota, ProviderError::QuotaExceeded { .. }), "{code}");
            assert!(!quota.is_transient());
        }

        for code in ["RequestLimitExceeded", "FailedOperation.FrequencyLimit"] {
            assert!(map(code, ErrorContext::default()).is_transient(), "{code}");
        }
    }

    #[test]
    fn zone_errors_carry_context() {
        let err = map("ResourceNotFound.NoDataOfDomain", ErrorContext::zone("example.com"));
        assert!(matches!(err, ProviderError::ZoneNotFound { zone, .. } if zone == "example.com"));

        let err = map("FailedOperation.DomainIsLocked", ErrorContext::zone("example.com"));
        assert!(matches!(err, ProviderError::ZoneLocked { zone, .. } if zone == "example.com"));
    }

    #[test]
    fn record_errors_carry_context() {
        let err = map(
            "InvalidParameter.DomainRecordExist",
            ErrorContext::record_name("example.com", "www"),
        );
        assert!(matches!(err, ProviderError::RecordExists { record_name, .. } if record_name == "www"));

        let err = map("InvalidParameter.RecordIdInvalid", ErrorContext::record("example.com", "77"));
        assert!(matches!(err, ProviderError::RecordNotFound { record_id, .. } if record_id == "77"));
    }

    #[test]
    fn invalid_parameters_use_record_field_names() {
        let cases = [
            ("InvalidParameter.RecordLineInvalid", "line"),
            ("InvalidParameter.RecordTypeInvalid", "type"),
            ("InvalidParameter.RecordValueInvalid", "value"),
            ("InvalidParameter.SubdomainInvalid", "name"),
            ("LimitExceeded.RecordTtlLimit", "ttl"),
            ("InvalidParameter.MxInvalid", "priority"),
            ("InvalidParameter.DomainInvalid", "zone"),
        ];
        for (code, expected) in cases {
            let err = map(code, ErrorContext::default());
            assert!(
                matches!(&err, ProviderError::InvalidParameter { param, .. } if param == expected),
                "{code} -> {err:?}"
            );
        }
    }

    #[test]
    fn unknown_code_falls_back() {
        let err = map("SomeNewError.NeverSeenBefore", ErrorContext::default());
        assert!(matches!(
            err,
            ProviderError::Unknown { raw_code, .. }
                if raw_code.as_deref() == Some("SomeNewError.NeverSeenBefore")
        ));
    }
}
