//! The `Given` stage: repositories and application settings.

use std::sync::Arc;
use std::time::Duration;

use super::{TestContext, When};
use crate::application::ApplicationDraft;
use crate::error::HarnessError;
use crate::repository::{RepoUrlType, RepositoryAuth, RepositoryProvisioner};

/// Preconditions and application settings for the next round of actions.
#[derive(Debug)]
pub struct Given {
    context: TestContext,
}

impl Given {
    pub(super) const fn new(context: TestContext) -> Self {
        Self { context }
    }

    /// Registers the configured SSH repository with the given fetch refspecs.
    ///
    /// An empty slice keeps the controller's default refspec.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Configuration`] when no SSH URL is configured
    /// and [`HarnessError::Setup`] when registration fails.
    pub async fn ssh_repo_url_added(self, refspecs: &[&str]) -> Result<Self, HarnessError> {
        let endpoints = &self.context.settings.repositories;
        let url = endpoints.ssh_url.clone();
        let auth = endpoints.ssh_auth.clone();
        self.add_configured(RepoUrlType::Ssh, url, auth, refspecs)
            .await
    }

    /// Registers the configured HTTPS repository with the default refspec.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Configuration`] when no HTTPS URL is
    /// configured and [`HarnessError::Setup`] when registration fails.
    pub async fn https_repo_url_added(self) -> Result<Self, HarnessError> {
        let endpoints = &self.context.settings.repositories;
        let url = endpoints.https_url.clone();
        let auth = endpoints.https_auth.clone();
        self.add_configured(RepoUrlType::Https, url, auth, &[])
            .await
    }

    async fn add_configured(
        self,
        url_type: RepoUrlType,
        url: Option<String>,
        auth: RepositoryAuth,
        refspecs: &[&str],
    ) -> Result<Self, HarnessError> {
        let Some(repo_url) = url else {
            let started = self.context.now();
            let error = HarnessError::Configuration {
                message: format!("no {} repository URL is configured", url_type.as_str()),
            };
            return Err(self.context.step_failed("repository", started, error));
        };
        self.repository_added(&repo_url, auth, refspecs).await
    }

    /// Registers an arbitrary repository.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Setup`] when the URL, credentials or refspecs
    /// are unusable, the repository is unreachable, or the control plane
    /// refuses the registration.
    pub async fn repository_added(
        mut self,
        url: &str,
        auth: RepositoryAuth,
        refspecs: &[&str],
    ) -> Result<Self, HarnessError> {
        let started = self.context.now();
        let step = format!("repository {url}");

        let mut provisioner = RepositoryProvisioner::new(self.context.gateway.as_ref())
            .with_insecure_ignore_host_key(self.context.settings.insecure_ignore_host_key);
        if let Some(probe) = &self.context.probe {
            provisioner = provisioner.with_probe(Arc::clone(probe));
        }

        match provisioner.configure(url, auth, refspecs).await {
            Ok(credential) => {
                self.context.step_passed(&step, started);
                self.context.provisioned.push(credential);
                Ok(self)
            }
            Err(error) => Err(self.context.step_failed(&step, started, error)),
        }
    }

    /// Selects which configured repository URL applications use.
    #[must_use]
    pub fn repo_url_type(mut self, url_type: RepoUrlType) -> Self {
        self.context.repo_url_type = Some(url_type);
        self
    }

    /// Uses an explicit repository URL, overriding the URL type selection.
    #[must_use]
    pub fn repo_url(mut self, url: impl Into<String>) -> Self {
        self.context.explicit_repo_url = Some(url.into());
        self
    }

    /// Sets the source path inside the repository.
    #[must_use]
    pub fn path(self, path: &str) -> Self {
        self.map_draft(|draft| draft.with_path(path))
    }

    /// Sets the target revision.
    #[must_use]
    pub fn revision(self, revision: &str) -> Self {
        self.map_draft(|draft| draft.with_revision(revision))
    }

    /// Sets the destination cluster API server.
    #[must_use]
    pub fn destination_server(self, server: &str) -> Self {
        self.map_draft(|draft| draft.with_destination_server(server))
    }

    /// Sets the destination namespace.
    #[must_use]
    pub fn destination_namespace(self, namespace: &str) -> Self {
        self.map_draft(|draft| draft.with_destination_namespace(namespace))
    }

    /// Sets the project.
    #[must_use]
    pub fn project(self, project: &str) -> Self {
        self.map_draft(|draft| draft.with_project(project))
    }

    /// Overrides how long eventual expectations may take in this case.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.context.settings.poll = self.context.settings.poll.with_timeout(timeout);
        self
    }

    fn map_draft(mut self, transition: impl FnOnce(ApplicationDraft) -> ApplicationDraft) -> Self {
        self.context.draft = transition(self.context.draft.clone());
        self
    }

    /// Per-case state accumulated so far.
    #[must_use]
    pub const fn context(&self) -> &TestContext {
        &self.context
    }

    /// Resolves the repository URL, validates the draft and moves to `When`.
    ///
    /// The URL comes from [`Self::repo_url`] when set, otherwise from the
    /// configured endpoint for [`Self::repo_url_type`], otherwise from the
    /// most recently registered repository.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidSpec`] when no repository URL can be
    /// resolved or the draft breaks a submission invariant.
    pub fn when(mut self) -> Result<When, HarnessError> {
        let started = self.context.now();
        let resolved = self.resolve_repo_url();

        let Some(repo_url) = resolved else {
            let error = HarnessError::InvalidSpec {
                message: "source repository URL is required; register a repository or set one"
                    .to_owned(),
            };
            return Err(self.context.step_failed("when", started, error));
        };

        self.context.draft = self.context.draft.clone().with_repo_url(repo_url);
        if let Err(error) = self.context.draft.validate() {
            return Err(self.context.step_failed("when", started, error));
        }
        Ok(When::new(self.context))
    }

    fn resolve_repo_url(&self) -> Option<String> {
        if let Some(url) = &self.context.explicit_repo_url {
            return Some(url.clone());
        }
        if let Some(url_type) = self.context.repo_url_type {
            return self
                .context
                .settings
                .repositories
                .url_for(url_type)
                .map(str::to_owned)
                .or_else(|| {
                    self.context
                        .provisioned
                        .iter()
                        .rev()
                        .find(|credential| credential.url_type() == url_type)
                        .map(|credential| credential.url().as_str().to_owned())
                });
        }
        self.context
            .provisioned
            .last()
            .map(|credential| credential.url().as_str().to_owned())
    }
}
