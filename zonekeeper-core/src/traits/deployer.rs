//! 证书部署出口 Trait

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::types::{CertificateDeployment, CertificateMaterial};

/// Pushes decrypted certificate material to one host.
///
/// Implementations:
/// - App: `DirectoryDeployer` (writes PEM files under a local root)
#[async_trait]
pub trait HostDeployer: Send + Sync {
    /// # Arguments
    /// * `deployment` - target host, deploy path and service name
    /// * `material` - leaf, optional key and chain
    async fn deploy(
        &self,
        deployment: &CertificateDeployment,
        material: &CertificateMaterial,
    ) -> CoreResult<()>;
}
