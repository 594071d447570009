//! Data models for control-plane requests and observations.
//!
//! Types prefixed with `Api` are wire shapes (serialisation targets for
//! requests, deserialisation targets for responses). They convert into the
//! public domain types the matcher and poller work with.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::{ApplicationName, ApplicationSpec};
use crate::repository::{RepositoryAuth, RepositoryCredential};

/// Phase of the controller's most recent sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationPhase {
    /// The operation is in progress.
    Running,
    /// The operation is being cancelled.
    Terminating,
    /// The operation failed because of the desired state (manifests, hooks).
    Failed,
    /// The operation failed because of an internal error.
    Error,
    /// The operation completed successfully.
    Succeeded,
}

impl OperationPhase {
    /// Label as reported by the control plane.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Terminating => "Terminating",
            Self::Failed => "Failed",
            Self::Error => "Error",
            Self::Succeeded => "Succeeded",
        }
    }

    /// True when the operation will not change phase again on its own.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Error | Self::Succeeded)
    }
}

impl fmt::Display for OperationPhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown enumerated status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unknown status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for OperationPhase {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [
            Self::Running,
            Self::Terminating,
            Self::Failed,
            Self::Error,
            Self::Succeeded,
        ]
        .into_iter()
        .find(|phase| phase.as_str().eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| UnknownStatus(value.to_owned()))
    }
}

/// Health of the deployed resources as assessed by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum HealthStatus {
    /// Resources are healthy.
    Healthy,
    /// Resources are not yet healthy but may become so.
    Progressing,
    /// Resources are unhealthy.
    Degraded,
    /// Resources are paused.
    Suspended,
    /// Resources do not exist in the cluster.
    Missing,
    /// Health could not be assessed.
    #[default]
    #[serde(other)]
    Unknown,
}

impl HealthStatus {
    /// Label as reported by the control plane.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::Progressing => "Progressing",
            Self::Degraded => "Degraded",
            Self::Suspended => "Suspended",
            Self::Missing => "Missing",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Comparison between live state and the desired revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum SyncStatus {
    /// Live state matches the target revision.
    Synced,
    /// Live state differs from the target revision.
    OutOfSync,
    /// Comparison has not completed.
    #[default]
    #[serde(other)]
    Unknown,
}

impl SyncStatus {
    /// Label as reported by the control plane.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "Synced",
            Self::OutOfSync => "OutOfSync",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Read-only snapshot of the most recent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationState {
    /// Operation phase.
    pub phase: OperationPhase,
    /// Message attached by the controller, empty when absent.
    pub message: String,
    /// When the harness fetched this snapshot.
    pub observed_at: DateTime<Utc>,
}

/// Everything the read endpoint reports about one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationSnapshot {
    /// Resource name.
    pub name: String,
    /// Most recent operation, if any operation has started.
    pub operation: Option<OperationState>,
    /// Sync comparison result.
    pub sync_status: SyncStatus,
    /// Aggregated resource health.
    pub health_status: HealthStatus,
}

impl ApplicationSnapshot {
    /// Phase of the most recent operation.
    #[must_use]
    pub fn phase(&self) -> Option<OperationPhase> {
        self.operation.as_ref().map(|operation| operation.phase)
    }
}

/// Result of one read: the application exists or it does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The application exists.
    Present(ApplicationSnapshot),
    /// The control plane reports no such application.
    Absent {
        /// Name that was looked up.
        name: String,
    },
}

impl Observation {
    /// Snapshot when the application exists.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&ApplicationSnapshot> {
        match self {
            Self::Present(snapshot) => Some(snapshot),
            Self::Absent { .. } => None,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent { name } => write!(formatter, "application '{name}' absent"),
            Self::Present(snapshot) => {
                let phase = snapshot
                    .operation
                    .as_ref()
                    .map_or("no operation", |operation| operation.phase.as_str());
                write!(
                    formatter,
                    "phase {phase}, sync {}, health {}",
                    snapshot.sync_status, snapshot.health_status
                )?;
                match snapshot.operation.as_ref() {
                    Some(operation) if !operation.message.is_empty() => {
                        write!(formatter, " ({})", operation.message)
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

/// Immediate acknowledgement of a state-changing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    /// Short description of what the control plane accepted.
    pub message: String,
}

/// Options for a sync request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Delete live resources no longer present in Git.
    pub prune: bool,
}

// --- wire shapes ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiRepositoryRequest<'a> {
    repo: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssh_private_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    insecure_ignore_host_key: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fetch_refspecs: Vec<&'a str>,
}

impl<'a> From<&'a RepositoryCredential> for ApiRepositoryRequest<'a> {
    fn from(credential: &'a RepositoryCredential) -> Self {
        let (ssh_private_key, username, password) = match credential.auth() {
            RepositoryAuth::Anonymous => (None, None, None),
            RepositoryAuth::SshKey { private_key } => (Some(private_key.as_str()), None, None),
            RepositoryAuth::Token { username, token } => {
                (None, Some(username.as_str()), Some(token.as_str()))
            }
        };

        Self {
            repo: credential.url().as_str(),
            kind: "git",
            ssh_private_key,
            username,
            password,
            insecure_ignore_host_key: credential.insecure_ignore_host_key(),
            fetch_refspecs: credential
                .refspecs()
                .iter()
                .map(|refspec| refspec.as_str())
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiApplicationRequest<'a> {
    metadata: ApiMetadataRequest<'a>,
    spec: ApiApplicationSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ApiMetadataRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiApplicationSpec<'a> {
    project: &'a str,
    source: ApiSource<'a>,
    destination: ApiDestination<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiSource<'a> {
    #[serde(rename = "repoURL")]
    repo_url: &'a str,
    path: &'a str,
    target_revision: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiDestination<'a> {
    server: &'a str,
    namespace: &'a str,
}

impl<'a> From<&'a ApplicationSpec> for ApiApplicationRequest<'a> {
    fn from(spec: &'a ApplicationSpec) -> Self {
        Self {
            metadata: ApiMetadataRequest {
                name: spec.name().as_str(),
            },
            spec: ApiApplicationSpec {
                project: spec.project(),
                source: ApiSource {
                    repo_url: spec.source_repo_url(),
                    path: spec.source_path(),
                    target_revision: spec.target_revision(),
                },
                destination: ApiDestination {
                    server: spec.destination().server.as_str(),
                    namespace: spec.destination().namespace.as_str(),
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiSyncRequest {
    pub(crate) prune: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiApplication {
    #[serde(default)]
    metadata: ApiMetadata,
    #[serde(default)]
    status: ApiApplicationStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ApiMetadata {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiApplicationStatus {
    operation_state: Option<ApiOperationState>,
    #[serde(default)]
    sync: ApiStatusField<SyncStatus>,
    #[serde(default)]
    health: ApiStatusField<HealthStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiStatusField<T: Default> {
    #[serde(default)]
    status: T,
}

#[derive(Debug, Deserialize)]
struct ApiOperationState {
    phase: OperationPhase,
    #[serde(default)]
    message: String,
}

impl ApiApplication {
    /// Converts the wire shape into a snapshot stamped with `observed_at`.
    pub(crate) fn into_snapshot(
        self,
        requested: &ApplicationName,
        observed_at: DateTime<Utc>,
    ) -> ApplicationSnapshot {
        let name = if self.metadata.name.is_empty() {
            requested.as_str().to_owned()
        } else {
            self.metadata.name
        };

        ApplicationSnapshot {
            name,
            operation: self
                .status
                .operation_state
                .map(|operation| OperationState {
                    phase: operation.phase,
                    message: operation.message,
                    observed_at,
                }),
            sync_status: self.status.sync.status,
            health_status: self.status.health.status,
        }
    }
}

/// grpc-gateway style error body: `{error, code, message}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub(crate) error: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) code: Option<i32>,
}
