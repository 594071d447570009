//! End-to-end scenarios shipped with the harness.
//!
//! Each scenario is an ordinary async function over a [`Harness`], so the
//! binary and integration tests run exactly the same steps.

use tracing::info;

use crate::control_plane::OperationPhase;
use crate::error::HarnessError;
use crate::expect::Expectation;
use crate::fixture::Harness;
use crate::repository::RepoUrlType;

/// Case name of [`sync_from_git_refspecs`].
pub const SYNC_FROM_GIT_REFSPECS: &str = "sync from git refspecs";
/// Revision only reachable through a non-default ref.
pub const HIDDEN_REVISION: &str = "hidden-gem";
/// Refspec keeping the default branch fetchable.
pub const MASTER_REFSPEC: &str = "+refs/heads/master:refs/remotes/origin/master";
/// Refspec exposing [`HIDDEN_REVISION`].
pub const HIDDEN_REFSPEC: &str = "+refs/hidden/gem:refs/remotes/origin/hidden-gem";
/// Error fragment the controller reports for an unfetchable revision.
pub const UNRESOLVED_REVISION: &str = "Unable to resolve 'hidden-gem' to a commit SHA";

/// A revision outside the default refspec is unresolvable until the
/// repository is reconfigured to fetch it.
///
/// The first round registers the SSH repository with the default refspec
/// and expects the create to be refused. The second round adds the hidden
/// ref, creates a fresh application, syncs it and waits for `Succeeded`.
///
/// # Errors
///
/// Returns the first [`HarnessError`] raised by any step.
pub async fn sync_from_git_refspecs(harness: &Harness) -> Result<(), HarnessError> {
    info!(case = SYNC_FROM_GIT_REFSPECS, "running scenario");

    harness
        .given(SYNC_FROM_GIT_REFSPECS)
        .ssh_repo_url_added(&[])
        .await?
        .repo_url_type(RepoUrlType::Ssh)
        .path(HIDDEN_REVISION)
        .revision(HIDDEN_REVISION)
        .when()?
        .ignore_errors()
        .create()
        .await?
        .then()
        .expect(Expectation::error_contains(UNRESOLVED_REVISION))
        .await?
        .given()
        .ssh_repo_url_added(&[MASTER_REFSPEC, HIDDEN_REFSPEC])
        .await?
        .when()?
        .create()
        .await?
        .sync()
        .await?
        .then()
        .expect(Expectation::operation_phase_is(OperationPhase::Succeeded))
        .await?
        .teardown()
        .await
}
