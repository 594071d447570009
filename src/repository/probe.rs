//! Reachability preflight for repository endpoints.
//!
//! Before a repository is registered, the provisioner can ask a
//! [`RemoteProbe`] whether the endpoint answers at all. An unreachable
//! endpoint is a setup error, reported once and never retried.

use std::fmt::Debug;

use git2::{Cred, Direction, Remote, RemoteCallbacks};

use super::credential::{RepositoryAuth, RepositoryCredential, setup};
use crate::error::HarnessError;

/// Checks that a repository endpoint can be reached with its credentials.
pub trait RemoteProbe: Send + Sync + Debug {
    /// Connects to the remote and returns the references it advertises.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Setup`] when the endpoint cannot be reached or
    /// rejects the credentials.
    fn advertised_refs(
        &self,
        credential: &RepositoryCredential,
    ) -> Result<Vec<String>, HarnessError>;
}

/// `git ls-remote` equivalent built on git2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2RemoteProbe;

impl RemoteProbe for Git2RemoteProbe {
    fn advertised_refs(
        &self,
        credential: &RepositoryCredential,
    ) -> Result<Vec<String>, HarnessError> {
        let url = credential.url().as_str();
        let map_git_error = |error: git2::Error| setup(url, error.message());

        let mut remote = Remote::create_detached(url).map_err(map_git_error)?;
        let callbacks = credential_callbacks(credential.auth());
        let connection = remote
            .connect_auth(Direction::Fetch, Some(callbacks), None)
            .map_err(map_git_error)?;

        let refs = connection
            .list()
            .map_err(map_git_error)?
            .iter()
            .map(|head| head.name().to_owned())
            .collect();
        Ok(refs)
    }
}

fn credential_callbacks(auth: &RepositoryAuth) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, _allowed| match auth {
        RepositoryAuth::Anonymous => Cred::default(),
        RepositoryAuth::SshKey { private_key } => Cred::ssh_key_from_memory(
            username_from_url.unwrap_or("git"),
            None,
            private_key,
            None,
        ),
        RepositoryAuth::Token { username, token } => Cred::userpass_plaintext(username, token),
    });
    callbacks
}
