//! Syncprobe library crate: declarative end-to-end tests for GitOps
//! delivery controllers.
//!
//! A test case provisions a source repository, builds an application that
//! points at it, drives actions through the controller's control plane and
//! polls the eventually consistent application state until an expectation
//! holds or a deadline passes. Cases are written as a typed
//! Given/When/Then chain starting from [`Harness::given`].

pub mod action;
pub mod application;
pub mod config;
pub mod control_plane;
pub mod error;
pub mod expect;
pub mod fixture;
pub mod poll;
pub mod report;
pub mod repository;
pub mod scenarios;

pub use action::{Action, ActionExecutor, ActionResult, ExecutionMode};
pub use application::{ApplicationDraft, ApplicationName, ApplicationSpec, Destination};
pub use config::{ReportTarget, SyncprobeConfig};
pub use control_plane::{
    ApplicationSnapshot, ControlPlaneEndpoint, ControlPlaneError, ControlPlaneGateway,
    HealthStatus, HttpControlPlane, Observation, OperationPhase, SyncStatus,
};
pub use error::HarnessError;
pub use expect::{Expectation, MatchKind, MatchResult, Verdict};
pub use fixture::{FixtureSettings, Given, Harness, RepositoryEndpoints, TestContext, Then, When};
pub use poll::{Clock, PollSettings, Poller, TokioClock};
pub use report::{NoopReportSink, ReportEvent, ReportSink, StderrJsonlReportSink};
pub use repository::{
    Git2RemoteProbe, Refspec, RemoteProbe, RepoUrlType, RepositoryAuth, RepositoryCredential,
    RepositoryProvisioner, RepositoryUrl,
};
