//! Repository provisioning.
//!
//! The provisioner registers a source-control remote with the control plane
//! so that applications referencing its URL fetch with exactly the refspecs
//! a test asks for. Provisioning is a precondition, not the behaviour under
//! test: every failure is reported as [`HarnessError::Setup`] and never
//! retried.

mod credential;
mod probe;

use std::sync::Arc;

use tracing::info;

pub use credential::{Refspec, RepoUrlType, RepositoryAuth, RepositoryCredential, RepositoryUrl};
pub use probe::{Git2RemoteProbe, RemoteProbe};

use crate::control_plane::ControlPlaneGateway;
use crate::error::HarnessError;

/// Registers repositories with the control plane.
pub struct RepositoryProvisioner<'gateway, Gateway>
where
    Gateway: ControlPlaneGateway + ?Sized,
{
    gateway: &'gateway Gateway,
    probe: Option<Arc<dyn RemoteProbe>>,
    insecure_ignore_host_key: bool,
}

impl<'gateway, Gateway> RepositoryProvisioner<'gateway, Gateway>
where
    Gateway: ControlPlaneGateway + ?Sized,
{
    /// Creates a provisioner that registers through `gateway`.
    #[must_use]
    pub const fn new(gateway: &'gateway Gateway) -> Self {
        Self {
            gateway,
            probe: None,
            insecure_ignore_host_key: false,
        }
    }

    /// Checks reachability with `probe` before registering.
    #[must_use]
    pub fn with_probe(self, probe: Arc<dyn RemoteProbe>) -> Self {
        Self {
            probe: Some(probe),
            ..self
        }
    }

    /// Asks the controller to skip SSH host key verification.
    #[must_use]
    pub fn with_insecure_ignore_host_key(self, insecure: bool) -> Self {
        Self {
            insecure_ignore_host_key: insecure,
            ..self
        }
    }

    /// Registers `url` with `auth` and the given fetch refspecs.
    ///
    /// An empty `refspecs` slice leaves the controller's default refspec in
    /// place. Refspecs are forwarded unmodified.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Setup`] when the URL or a refspec is malformed,
    /// the credentials do not suit the URL, the probe cannot reach the
    /// endpoint, or the control plane refuses the registration.
    pub async fn configure(
        &self,
        url: &str,
        auth: RepositoryAuth,
        refspecs: &[&str],
    ) -> Result<RepositoryCredential, HarnessError> {
        let parsed_url = RepositoryUrl::parse(url)?;
        let credential = RepositoryCredential::new(parsed_url, auth, refspecs)?
            .with_insecure_ignore_host_key(self.insecure_ignore_host_key);

        if let Some(probe) = &self.probe {
            check_reachable(probe, &credential).await?;
        }

        self.gateway
            .upsert_repository(&credential)
            .await
            .map_err(|error| HarnessError::Setup {
                url: credential.url().as_str().to_owned(),
                message: error.to_string(),
            })?;

        info!(
            url = credential.url().as_str(),
            url_type = credential.url_type().as_str(),
            auth = credential.auth().kind(),
            refspecs = credential.refspecs().len(),
            "repository registered"
        );
        Ok(credential)
    }
}

async fn check_reachable(
    probe: &Arc<dyn RemoteProbe>,
    credential: &RepositoryCredential,
) -> Result<(), HarnessError> {
    let probe_handle = Arc::clone(probe);
    let probed = credential.clone();
    let refs = tokio::task::spawn_blocking(move || probe_handle.advertised_refs(&probed))
        .await
        .map_err(|error| HarnessError::Setup {
            url: credential.url().as_str().to_owned(),
            message: format!("reachability probe did not complete: {error}"),
        })??;

    info!(
        url = credential.url().as_str(),
        advertised = refs.len(),
        "repository reachable"
    );
    Ok(())
}
