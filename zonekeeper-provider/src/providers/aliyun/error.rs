//! 阿里云错误码映射
//!
//! 参考: <https://api.aliyun.com/document/Alidns/2015-01-09/errorCode>

use crate::error::ProviderError;
use crate::traits::{CodeClass, ErrorContext, ProviderErrorMapper, RawApiError, RecordField};

use super::AliyunProvider;

/// 错误码 → 分类。按顺序匹配，第一个命中的表生效。
const CODE_TABLE: &[(CodeClass, &[&str])] = &[
    (
        CodeClass::Credentials,
        &[
            "InvalidAccessKeyId", "InvalidAccessKeyId.NotFound",
            "SignatureDoesNotMatch", "IncompleteSignature",
        ],
    ),
    (
        CodeClass::Permission,
        &[
            "Forbidden", "Forbidden.RiskControl", "OperationDomain.NoPermission",
            "IllegalUser", "IncorrectDomainUser",
        ],
    ),
    (CodeClass::RecordExists, &["DomainRecordDuplicate", "DomainRecordConflict"]),
    (
        CodeClass::RecordMissing,
        &[
            "DomainRecordNotBelongToUser", "InvalidRecordId.NotFound",
            "InvalidRR.NoExist", "PdnsRecord.NotExists",
        ],
    ),
    (
        CodeClass::ZoneMissing,
        &["InvalidDomainName.NoExist", "DomainNotFound", "PdnsZone.NotExists"],
    ),
    // 解析被锁、到期停服、黑洞
    (
        CodeClass::ZoneLocked,
        &[
            "DomainRecordLocked", "DomainExpiredDNSForbidden", "Forbidden.DomainExpired",
            "RecordForbidden.BlackHole", "RecordFobidden.BlackHole",
        ],
    ),
    (CodeClass::Throttled, &["Throttling", "Throttling.User"]),
    (
        CodeClass::Invalid(RecordField::Type),
        &["InvalidRR.TypeEmpty", "SubDomainInvalid.Type", "PdnsRecord.InvalidType"],
    ),
    (
        CodeClass::Invalid(RecordField::Value),
        &[
            "InvalidRR.AValue", "InvalidRR.AAAAValue", "InvalidRR.MXValue",
            "InvalidRR.NSValue", "PdnsRecord.InvalidRecordValue",
        ],
    ),
    // RR 即相对记录名
    (
        CodeClass::Invalid(RecordField::Name),
        &["InvalidRR.RrEmpty", "InvalidRR.Format", "InvalidRR.Length", "Record.Invalid.Rr"],
    ),
    (
        CodeClass::Invalid(RecordField::Ttl),
        &["SubDomainInvalid.TTL", "PdnsRecord.InvalidTtl"],
    ),
    (CodeClass::Invalid(RecordField::Priority), &["SubDomainInvalid.Priority"]),
    (CodeClass::Invalid(RecordField::Line), &["SubDomainInvalid.Line", "UnsupportedLine"]),
    (
        CodeClass::Invalid(RecordField::Zone),
        &[
            "DomainEmpty", "InvalidDomainName.Format", "InvalidDomainName.Suffix",
            "InvalidDomainName.Length", "PdnsZone.InvalidZoneName",
        ],
    ),
];

fn classify(code: &str) -> Option<CodeClass> {
    // 各类配额码很多，统一按前缀归类
    if code.starts_with("QuotaExceeded.") || code == "LineDnsSlb.QuotaExceeded" {
        return Some(CodeClass::Quota);
    }
    CODE_TABLE
        .iter()
        .find(|(_, codes)| codes.contains(&code))
        .map(|(class, _)| *class)
}

impl ProviderErrorMapper for AliyunProvider {
    fn provider_name(&self) -> &'static str {
        "aliyun"
    }

    fn map_error(&self, raw: RawApiError, context: ErrorContext) -> ProviderError {
        let class = raw.code.as_deref().and_then(classify);
        self.classified(class, raw, context)
    }
}
