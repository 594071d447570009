//! Control-plane API access.
//!
//! The [`ControlPlaneGateway`] trait is the seam between the harness and the
//! controller under test. State-changing calls return as soon as the control
//! plane acknowledges them; [`ControlPlaneGateway::application`] is the only
//! read and the only call the harness ever repeats.

mod client;
pub mod error;
mod error_mapping;
pub mod models;

use async_trait::async_trait;

pub use client::{ControlPlaneEndpoint, HttpControlPlane};
pub use error::ControlPlaneError;
pub use models::{
    Acknowledgement, ApplicationSnapshot, HealthStatus, Observation, OperationPhase,
    OperationState, SyncOptions, SyncStatus,
};

use crate::application::{ApplicationName, ApplicationSpec};
use crate::repository::RepositoryCredential;

/// Gateway to the control plane of the delivery controller under test.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlPlaneGateway: Send + Sync {
    /// Registers or replaces a repository and its fetch refspecs.
    async fn upsert_repository(
        &self,
        credential: &RepositoryCredential,
    ) -> Result<Acknowledgement, ControlPlaneError>;

    /// Creates an application from a frozen spec.
    async fn create_application(
        &self,
        spec: &ApplicationSpec,
    ) -> Result<Acknowledgement, ControlPlaneError>;

    /// Requests a sync of an existing application.
    async fn sync_application(
        &self,
        name: &ApplicationName,
        options: &SyncOptions,
    ) -> Result<Acknowledgement, ControlPlaneError>;

    /// Deletes an application, optionally cascading to its resources.
    async fn delete_application(
        &self,
        name: &ApplicationName,
        cascade: bool,
    ) -> Result<Acknowledgement, ControlPlaneError>;

    /// Reads the current state of an application.
    async fn application(&self, name: &ApplicationName) -> Result<Observation, ControlPlaneError>;
}
