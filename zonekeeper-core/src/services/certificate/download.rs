//! 证书下载格式

use crate::error::{CoreError, CoreResult};
use crate::types::{Certificate, CertificateFile, CertificateMaterial, DownloadFormat};

const PEM_MIME: &str = "application/x-pem-file";

/// Format decrypted material as a downloadable file.
pub fn render(
    cert: &Certificate,
    material: &CertificateMaterial,
    format: DownloadFormat,
) -> CoreResult<CertificateFile> {
    let stem = cert.file_stem();
    let file = |suffix: &str, content_type: &str, content: String| CertificateFile {
        filename: format!("{stem}{suffix}"),
        content_type: content_type.to_string(),
        content,
    };

    match format {
        DownloadFormat::Pem => {
            let mut parts = vec![material.certificate_pem.trim_end()];
            if let Some(key) = &material.private_key_pem {
                parts.push(key.trim_end());
            }
            if let Some(chain) = &material.chain_pem {
                parts.push(chain.trim_end());
            }
            Ok(file(".pem", PEM_MIME, format!("{}\n", parts.join("\n"))))
        }
        DownloadFormat::Crt => Ok(file(
            ".crt",
            "application/x-x509-ca-cert",
            material.certificate_pem.clone(),
        )),
        DownloadFormat::Key => {
            let key = material.private_key_pem.clone().ok_or_else(|| {
                CoreError::MaterialUnavailable("private key not available".to_string())
            })?;
            Ok(file(".key", "application/pkcs8", key))
        }
        DownloadFormat::Chain => {
            let chain = material.chain_pem.clone().ok_or_else(|| {
                CoreError::MaterialUnavailable("certificate chain not available".to_string())
            })?;
            Ok(file("_chain.pem", PEM_MIME, chain))
        }
    }
}
