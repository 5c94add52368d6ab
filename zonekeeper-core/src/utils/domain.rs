//! 域名 / 记录名校验

use crate::error::{CoreError, CoreResult};

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// LDH label, punycode included. Record names may also carry underscores
/// (`_acme-challenge`, `_sip`).
fn is_valid_label(label: &str, allow_underscore: bool) -> bool {
    let bytes = label.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    let inner_ok = |b: u8| {
        b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || (allow_underscore && b == b'_')
    };
    label.len() <= MAX_LABEL_LEN
        && *first != b'-'
        && *last != b'-'
        && (allow_underscore || *first != b'_')
        && bytes.iter().all(|b| inner_ok(*b))
}

/// Normalize and validate a zone name: lowercase, no trailing dot, at least two labels.
pub fn normalize_zone_name(name: &str) -> CoreResult<String> {
    let normalized = name.trim().trim_end_matches('.').to_ascii_lowercase();
    let invalid = || CoreError::ValidationError(format!("invalid domain name: '{name}'"));

    if normalized.is_empty() || normalized.len() > MAX_NAME_LEN {
        return Err(invalid());
    }
    let labels: Vec<&str> = normalized.split('.').collect();
    if labels.len() < 2 || !labels.iter().all(|l| is_valid_label(l, false)) {
        return Err(invalid());
    }
    Ok(normalized)
}

/// Normalize and validate a relative record name: `@`, `*`, `*.sub`, `_svc._tcp`, `www`.
pub fn normalize_record_name(name: &str) -> CoreResult<String> {
    let normalized = name.trim().trim_end_matches('.').to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(CoreError::ValidationError("record name is required".into()));
    }
    if normalized == "@" {
        return Ok(normalized);
    }

    let rest = match normalized.strip_prefix('*') {
        Some("") => return Ok(normalized),
        Some(rest) => rest.strip_prefix('.').ok_or_else(|| {
            CoreError::ValidationError(format!("invalid record name: '{name}'"))
        })?,
        None => normalized.as_str(),
    };
    if normalized.len() > MAX_NAME_LEN || !rest.split('.').all(|l| is_valid_label(l, true)) {
        return Err(CoreError::ValidationError(format!("invalid record name: '{name}'")));
    }
    Ok(normalized)
}

/// Certificate identifier: a zone-like name, optionally prefixed with `*.`.
pub fn normalize_certificate_domain(domain: &str) -> CoreResult<String> {
    let trimmed = domain.trim().to_ascii_lowercase();
    match trimmed.strip_prefix("*.") {
        Some(base) => Ok(format!("*.{}", normalize_zone_name(base)?)),
        None => normalize_zone_name(&trimmed),
    }
}

/// Whether `domain` is `zone` or lies under it.
pub fn is_within_zone(domain: &str, zone: &str) -> bool {
    let domain = domain.trim_start_matches("*.");
    domain.eq_ignore_ascii_case(zone)
        || domain
            .to_ascii_lowercase()
            .ends_with(&format!(".{}", zone.to_ascii_lowercase()))
}
