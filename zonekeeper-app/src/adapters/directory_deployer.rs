//! Host deployer that writes PEM files into a local directory tree.
//!
//! Layout: `<root>/<host>/<deploy_path>/fullchain.pem` and `privkey.pem`.
//! Something outside the daemon (rsync, config management) is expected to
//! ship the tree to the real hosts and reload `service_name`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use zonekeeper_core::error::{CoreError, CoreResult};
use zonekeeper_core::traits::HostDeployer;
use zonekeeper_core::types::{CertificateDeployment, CertificateMaterial};

const FULLCHAIN_FILE: &str = "fullchain.pem";
const PRIVKEY_FILE: &str = "privkey.pem";

pub struct DirectoryDeployer {
    root: PathBuf,
}

impl DirectoryDeployer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Target directory for a deployment; rejects anything that would escape `root`.
    pub fn target_dir(&self, deployment: &CertificateDeployment) -> CoreResult<PathBuf> {
        let host = deployment.host.trim();
        if host.is_empty() || host.contains(['/', '\\']) || host.contains("..") {
            return Err(CoreError::ValidationError(format!(
                "invalid deploy host: {:?}",
                deployment.host
            )));
        }

        let relative = Path::new(deployment.deploy_path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(CoreError::ValidationError(format!(
                "invalid deploy path: {}",
                deployment.deploy_path
            )));
        }

        Ok(self.root.join(host).join(relative))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CoreError + '_ {
    move |e| CoreError::StorageError(format!("Failed to write {}: {e}", path.display()))
}

#[async_trait]
impl HostDeployer for DirectoryDeployer {
    async fn deploy(
        &self,
        deployment: &CertificateDeployment,
        material: &CertificateMaterial,
    ) -> CoreResult<()> {
        let dir = self.target_dir(deployment)?;
        fs::create_dir_all(&dir).await.map_err(io_err(&dir))?;

        let fullchain = dir.join(FULLCHAIN_FILE);
        fs::write(&fullchain, material.fullchain())
            .await
            .map_err(io_err(&fullchain))?;

        if let Some(key) = &material.private_key_pem {
            let keyfile = dir.join(PRIVKEY_FILE);
            fs::write(&keyfile, key).await.map_err(io_err(&keyfile))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&keyfile, std::fs::Permissions::from_mode(0o600))
                    .await
                    .map_err(io_err(&keyfile))?;
            }
        } else {
            // CSR 签发的证书私钥不在本地
            log::debug!("Certificate {} has no private key, writing chain only", deployment.certificate_id);
        }

        log::info!(
            "Deployed certificate {} for {} into {} (reload {})",
            deployment.certificate_id,
            deployment.host,
            dir.display(),
            deployment.service_name
        );
        Ok(())
    }
}
