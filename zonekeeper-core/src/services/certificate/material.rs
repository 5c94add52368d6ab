//! PEM / X.509 解析与私钥匹配

use chrono::{DateTime, Utc};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::pem::{parse_x509_pem, Pem};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::error::{CoreError, CoreResult};
use crate::types::{CertificateDetails, CsrValidation, KeyType};

/// CSR uploads larger than this are rejected outright.
pub const MAX_CSR_BYTES: usize = 100 * 1024;

/// Fields pulled out of a leaf certificate.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    pub common_name: String,
    pub subject_alt_names: Vec<String>,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial_number: String,
    pub fingerprint: String,
    pub key_algorithm: String,
    pub key_size: u32,
    /// SubjectPublicKeyInfo DER
    spki_der: Vec<u8>,
    /// RSA modulus without leading zeros
    rsa_modulus: Option<Vec<u8>>,
}

impl ParsedCertificate {
    /// Common name first, then the remaining SANs, lowercase and deduplicated.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for name in std::iter::once(&self.common_name).chain(&self.subject_alt_names) {
            let name = name.to_ascii_lowercase();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn key_type(&self) -> KeyType {
        match (self.key_algorithm.as_str(), self.key_size) {
            ("RSA", bits) if bits >= 4096 => KeyType::Rsa4096,
            ("ECDSA", bits) if bits >= 384 => KeyType::Ecdsa384,
            ("ECDSA", _) => KeyType::Ecdsa256,
            _ => KeyType::Rsa2048,
        }
    }

    pub fn details(&self, now: DateTime<Utc>) -> CertificateDetails {
        CertificateDetails {
            common_name: self.common_name.clone(),
            subject_alt_names: self.subject_alt_names.clone(),
            issuer: self.issuer.clone(),
            not_before: self.not_before,
            not_after: self.not_after,
            days_remaining: (self.not_after - now).num_days(),
            key_algorithm: self.key_algorithm.clone(),
            serial_number: self.serial_number.clone(),
        }
    }
}

/// Parsed certificate signing request.
#[derive(Debug, Clone)]
pub struct ParsedCsr {
    pub der: Vec<u8>,
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub organization: String,
    pub country: String,
    pub key_algorithm: String,
    pub key_size: u32,
    pub signature_algorithm: String,
}

impl ParsedCsr {
    /// Lowercase CN plus SANs
    pub fn names(&self) -> Vec<String> {
        std::iter::once(&self.common_name)
            .chain(&self.dns_names)
            .filter(|n| !n.is_empty())
            .map(|n| n.to_ascii_lowercase())
            .collect()
    }

    pub fn key_type(&self) -> KeyType {
        match (self.key_algorithm.as_str(), self.key_size) {
            ("RSA", bits) if bits >= 4096 => KeyType::Rsa4096,
            ("ECDSA", bits) if bits >= 384 => KeyType::Ecdsa384,
            ("ECDSA", _) => KeyType::Ecdsa256,
            _ => KeyType::Rsa2048,
        }
    }

    pub fn validation(&self) -> CsrValidation {
        CsrValidation {
            valid: true,
            common_name: self.common_name.clone(),
            dns_names: self.dns_names.clone(),
            organization: self.organization.clone(),
            country: self.country.clone(),
            key_algorithm: self.key_algorithm.clone(),
            key_size: self.key_size,
            signature_algorithm: self.signature_algorithm.clone(),
            error_message: None,
        }
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::ValidationError(message.into())
}

fn read_pem(input: &str, what: &str) -> CoreResult<Pem> {
    let (_, pem) = parse_x509_pem(input.trim().as_bytes())
        .map_err(|e| invalid(format!("invalid {what} PEM: {e}")))?;
    Ok(pem)
}

fn to_utc(time: ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

/// (algorithm, size in bits)
fn describe_key(spki: &SubjectPublicKeyInfo<'_>) -> (String, u32) {
    match spki.parsed() {
        Ok(PublicKey::RSA(rsa)) => ("RSA".to_string(), u32::try_from(rsa.key_size()).unwrap_or(0)),
        Ok(PublicKey::EC(point)) => ("ECDSA".to_string(), u32::try_from(point.key_size()).unwrap_or(0)),
        _ => ("Other".to_string(), 0),
    }
}

fn first_attr<'a, 'b: 'a>(mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> String {
    values
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn join_attrs<'a, 'b: 'a>(values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> String {
    values
        .filter_map(|attr| attr.as_str().ok())
        .collect::<Vec<_>>()
        .join(", ")
}

fn dns_names<'a, 'b: 'a>(names: impl Iterator<Item = &'a GeneralName<'b>>) -> Vec<String> {
    names
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some((*dns).to_string()),
            _ => None,
        })
        .collect()
}

fn signature_name(oid: &str) -> String {
    match oid {
        "1.2.840.113549.1.1.11" => "SHA256-RSA",
        "1.2.840.113549.1.1.12" => "SHA384-RSA",
        "1.2.840.113549.1.1.13" => "SHA512-RSA",
        "1.2.840.10045.4.3.2" => "ECDSA-SHA256",
        "1.2.840.10045.4.3.3" => "ECDSA-SHA384",
        "1.2.840.10045.4.3.4" => "ECDSA-SHA512",
        "1.3.101.112" => "Ed25519",
        other => return other.to_string(),
    }
    .to_string()
}

// ============ 证书 ============

/// Parse the first certificate of a PEM bundle.
pub fn parse_certificate(pem: &str) -> CoreResult<ParsedCertificate> {
    let pem = read_pem(pem, "certificate")?;
    if pem.label != "CERTIFICATE" {
        return Err(invalid(format!("expected a CERTIFICATE block, found {}", pem.label)));
    }
    let (_, cert) = X509Certificate::from_der(&pem.contents)
        .map_err(|e| invalid(format!("certificate parsing failed: {e}")))?;

    let subject_alt_names = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| dns_names(ext.value.general_names.iter()))
        .unwrap_or_default();
    let common_name = match first_attr(cert.subject().iter_common_name()) {
        cn if cn.is_empty() => subject_alt_names.first().cloned().unwrap_or_default(),
        cn => cn,
    };
    let issuer = match first_attr(cert.issuer().iter_common_name()) {
        cn if cn.is_empty() => cert.issuer().to_string(),
        cn => cn,
    };
    let (key_algorithm, key_size) = describe_key(cert.public_key());
    let rsa_modulus = match cert.public_key().parsed() {
        Ok(PublicKey::RSA(rsa)) => Some(trim_leading_zeros(rsa.modulus).to_vec()),
        _ => None,
    };

    Ok(ParsedCertificate {
        common_name,
        subject_alt_names,
        issuer,
        not_before: to_utc(cert.validity().not_before),
        not_after: to_utc(cert.validity().not_after),
        serial_number: cert.serial.to_str_radix(16).to_uppercase(),
        fingerprint: hex::encode(Sha256::digest(&pem.contents)),
        key_algorithm,
        key_size,
        spki_der: cert.public_key().raw.to_vec(),
        rsa_modulus,
    })
}

/// Every block of a chain must be a parsable certificate.
fn check_chain(chain: &str) -> CoreResult<()> {
    let mut found = 0;
    for pem in Pem::iter_from_buffer(chain.as_bytes()) {
        let pem = pem.map_err(|e| invalid(format!("invalid certificate chain: {e}")))?;
        X509Certificate::from_der(&pem.contents)
            .map_err(|e| invalid(format!("invalid certificate chain: {e}")))?;
        found += 1;
    }
    if found == 0 {
        return Err(invalid("invalid certificate chain: no certificate found"));
    }
    Ok(())
}

/// Public key (SubjectPublicKey contents) of a private key PEM.
///
/// RSA keys are read as PKCS#1 or PKCS#8; other PKCS#8 keys go through `rcgen`.
fn private_key_public_bytes(key_pem: &str) -> CoreResult<PublicKeyBytes> {
    let pem = read_pem(key_pem, "private key")?;
    match pem.label.as_str() {
        "RSA PRIVATE KEY" => {
            let key = RsaPrivateKey::from_pkcs1_der(&pem.contents)
                .map_err(|e| invalid(format!("invalid RSA private key: {e}")))?;
            Ok(PublicKeyBytes::Rsa(key.n().to_bytes_be()))
        }
        "PRIVATE KEY" => {
            if let Ok(key) = RsaPrivateKey::from_pkcs8_der(&pem.contents) {
                return Ok(PublicKeyBytes::Rsa(key.n().to_bytes_be()));
            }
            let key = rcgen::KeyPair::from_pem(key_pem.trim())
                .map_err(|e| invalid(format!("unsupported private key: {e}")))?;
            Ok(PublicKeyBytes::Spki(rcgen::PublicKeyData::subject_public_key_info(&key)))
        }
        other => Err(invalid(format!("unsupported private key format: {other}"))),
    }
}

enum PublicKeyBytes {
    /// RSA modulus, big endian without leading zeros
    Rsa(Vec<u8>),
    /// SubjectPublicKeyInfo DER
    Spki(Vec<u8>),
}

fn key_matches(cert: &ParsedCertificate, key: &PublicKeyBytes) -> bool {
    match key {
        PublicKeyBytes::Rsa(modulus) => cert.rsa_modulus.as_deref() == Some(modulus.as_slice()),
        PublicKeyBytes::Spki(spki) => cert.spki_der == *spki,
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Checks an uploaded bundle: parsable, inside its validity window, key matches.
pub fn validate_certificate(
    certificate_pem: &str,
    private_key_pem: &str,
    chain_pem: Option<&str>,
    now: DateTime<Utc>,
) -> CoreResult<(ParsedCertificate, CertificateDetails)> {
    let cert = parse_certificate(certificate_pem)?;
    if now < cert.not_before {
        return Err(invalid("certificate is not yet valid"));
    }
    if now > cert.not_after {
        return Err(invalid("certificate has expired"));
    }

    let key = private_key_public_bytes(private_key_pem)?;
    if !key_matches(&cert, &key) {
        return Err(invalid("private key does not match certificate"));
    }

    if let Some(chain) = chain_pem.filter(|c| !c.trim().is_empty()) {
        check_chain(chain)?;
    }

    let details = cert.details(now);
    Ok((cert, details))
}

// ============ CSR ============

/// Parse and self-verify a CSR. Errors carry a user-facing message.
pub fn parse_csr(csr_pem: &str) -> CoreResult<ParsedCsr> {
    if csr_pem.len() > MAX_CSR_BYTES {
        return Err(invalid(format!("CSR exceeds {} KiB", MAX_CSR_BYTES / 1024)));
    }
    let pem = read_pem(csr_pem, "CSR")?;
    if pem.label != "CERTIFICATE REQUEST" && pem.label != "NEW CERTIFICATE REQUEST" {
        return Err(invalid(format!("expected a CERTIFICATE REQUEST block, found {}", pem.label)));
    }

    let (_, csr) = X509CertificationRequest::from_der(&pem.contents)
        .map_err(|e| invalid(format!("CSR parsing failed: {e}")))?;
    csr.verify_signature()
        .map_err(|e| invalid(format!("CSR signature verification failed: {e}")))?;

    let info = &csr.certification_request_info;
    let mut names = Vec::new();
    if let Some(extensions) = csr.requested_extensions() {
        for ext in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = ext {
                names.extend(dns_names(san.general_names.iter()));
            }
        }
    }
    let (key_algorithm, key_size) = describe_key(&info.subject_pki);

    Ok(ParsedCsr {
        common_name: first_attr(info.subject.iter_common_name()),
        dns_names: names,
        organization: join_attrs(info.subject.iter_organization()),
        country: first_attr(info.subject.iter_country()),
        key_algorithm,
        key_size,
        signature_algorithm: signature_name(&csr.signature_algorithm.algorithm.to_id_string()),
        der: pem.contents.clone(),
    })
}

/// Never fails: a bad CSR comes back as `valid = false`.
pub fn validate_csr(csr_pem: &str) -> CsrValidation {
    match parse_csr(csr_pem) {
        Ok(csr) => csr.validation(),
        Err(CoreError::ValidationError(message)) => CsrValidation::invalid(message),
        Err(e) => CsrValidation::invalid(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn self_signed(names: &[&str]) -> (String, String) {
        let key = KeyPair::generate().unwrap();
        let params = CertificateParams::new(names.iter().map(|n| (*n).to_string()).collect::<Vec<_>>()).unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    fn csr(names: &[&str]) -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(names.iter().map(|n| (*n).to_string()).collect::<Vec<_>>()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, names[0]);
        dn.push(DnType::OrganizationName, "Example Ltd");
        dn.push(DnType::CountryName, "DE");
        params.distinguished_name = dn;
        params.serialize_request(&key).unwrap().pem().unwrap()
    }

    #[test]
    fn parses_self_signed_certificate() {
        let (cert_pem, _) = self_signed(&["example.com", "www.example.com"]);
        let cert = parse_certificate(&cert_pem).unwrap();

        assert_eq!(cert.subject_alt_names, vec!["example.com", "www.example.com"]);
        assert_eq!(cert.key_algorithm, "ECDSA");
        assert_eq!(cert.key_type(), KeyType::Ecdsa256);
        assert_eq!(cert.fingerprint.len(), 64);
        assert!(cert.not_after > cert.not_before);
    }

    #[test]
    fn upload_checks_key_and_window() {
        let (cert_pem, key_pem) = self_signed(&["example.com"]);
        let now = Utc::now();

        let (_, details) = validate_certificate(&cert_pem, &key_pem, None, now).unwrap();
        assert!(details.days_remaining > 0);

        let (_, other_key) = self_signed(&["example.com"]);
        let err = validate_certificate(&cert_pem, &other_key, None, now).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: private key does not match certificate");

        let far_future = now + Duration::days(365 * 5000);
        let err = validate_certificate(&cert_pem, &key_pem, None, far_future).unwrap_err();
        assert!(err.to_string().contains("certificate has expired"));
    }

    #[test]
    fn rsa_key_matching() {
        let key = crate::services::acme::generate_key_pair(KeyType::Rsa2048).unwrap();
        let cert = CertificateParams::new(vec!["rsa.example.com".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let (parsed, _) =
            validate_certificate(&cert.pem(), &key.serialize_pem(), None, Utc::now()).unwrap();
        assert_eq!(parsed.key_algorithm, "RSA");
        assert_eq!(parsed.key_type(), KeyType::Rsa2048);
    }

    #[test]
    fn chain_must_parse() {
        let (cert_pem, key_pem) = self_signed(&["example.com"]);
        let err = validate_certificate(&cert_pem, &key_pem, Some("garbage"), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("invalid certificate chain"));
    }

    #[test]
    fn csr_validation_reports_fields() {
        let result = validate_csr(&csr(&["example.com", "www.example.com"]));
        assert!(result.valid, "{:?}", result.error_message);
        assert_eq!(result.common_name, "example.com");
        assert_eq!(result.dns_names, vec!["example.com", "www.example.com"]);
        assert_eq!(result.organization, "Example Ltd");
        assert_eq!(result.country, "DE");
        assert_eq!(result.key_algorithm, "ECDSA");
        assert_eq!(result.signature_algorithm, "ECDSA-SHA256");
    }

    #[test]
    fn bad_csr_is_reported_not_raised() {
        let result = validate_csr("not a csr");
        assert!(!result.valid);
        assert!(result.error_message.unwrap().contains("invalid CSR PEM"));

        let (cert_pem, _) = self_signed(&["example.com"]);
        let result = validate_csr(&cert_pem);
        assert!(result.error_message.unwrap().contains("CERTIFICATE REQUEST"));

        let huge = "A".repeat(MAX_CSR_BYTES + 1);
        assert!(validate_csr(&huge).error_message.unwrap().contains("exceeds"));
    }
}
