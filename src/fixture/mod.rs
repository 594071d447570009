//! Given/When/Then fixture.
//!
//! A test case is a chain of typed stages. [`Given`] collects preconditions
//! and application settings, [`When`] issues actions, and [`Then`] asserts
//! on outcomes. Each transition consumes the previous stage, so a stage can
//! only be used in order, and all per-case state travels in one
//! [`TestContext`] owned by the current stage.
//!
//! ```no_run
//! # async fn run(harness: syncprobe::Harness) -> Result<(), syncprobe::HarnessError> {
//! use syncprobe::{Expectation, OperationPhase};
//!
//! harness
//!     .given("sync from refspecs")
//!     .ssh_repo_url_added(&["+refs/hidden/gem:refs/remotes/origin/hidden-gem"])
//!     .await?
//!     .path("hidden-gem")
//!     .revision("hidden-gem")
//!     .when()?
//!     .create()
//!     .await?
//!     .sync()
//!     .await?
//!     .then()
//!     .expect(Expectation::operation_phase_is(OperationPhase::Succeeded))
//!     .await?
//!     .teardown()
//!     .await
//! # }
//! ```

mod given;
mod then;
mod when;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::warn;

pub use given::Given;
pub use then::Then;
pub use when::When;

use crate::action::{ActionResult, ExecutionMode};
use crate::application::{
    ApplicationDraft, ApplicationName, ApplicationSpec, DEFAULT_DESTINATION_SERVER,
    DEFAULT_PROJECT,
};
use crate::control_plane::{ControlPlaneGateway, Observation};
use crate::error::HarnessError;
use crate::poll::{Clock, PollSettings, Poller, TokioClock};
use crate::report::{NoopReportSink, ReportEvent, ReportSink, millis};
use crate::repository::{RemoteProbe, RepoUrlType, RepositoryAuth, RepositoryCredential};

/// Repository endpoints the `*_repo_url_added` shorthands register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEndpoints {
    /// SSH URL of the test repository.
    pub ssh_url: Option<String>,
    /// Credentials for the SSH URL.
    pub ssh_auth: RepositoryAuth,
    /// HTTPS URL of the test repository.
    pub https_url: Option<String>,
    /// Credentials for the HTTPS URL.
    pub https_auth: RepositoryAuth,
}

impl Default for RepositoryEndpoints {
    fn default() -> Self {
        Self {
            ssh_url: None,
            ssh_auth: RepositoryAuth::Anonymous,
            https_url: None,
            https_auth: RepositoryAuth::Anonymous,
        }
    }
}

impl RepositoryEndpoints {
    fn url_for(&self, url_type: RepoUrlType) -> Option<&str> {
        match url_type {
            RepoUrlType::Ssh => self.ssh_url.as_deref(),
            RepoUrlType::Https => self.https_url.as_deref(),
            RepoUrlType::File => None,
        }
    }
}

/// Settings shared by every case a [`Harness`] runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSettings {
    /// Polling policy for eventual expectations.
    pub poll: PollSettings,
    /// Repository endpoints for the shorthand provisioning steps.
    pub repositories: RepositoryEndpoints,
    /// Default destination cluster.
    pub destination_server: String,
    /// Default destination namespace.
    pub destination_namespace: String,
    /// Default project.
    pub project: String,
    /// Overall time a case may take; waits are cut short when it runs out.
    pub case_budget: Option<Duration>,
    /// Leave created applications in place on teardown.
    pub keep_resources: bool,
    /// Ask the controller to skip SSH host key verification.
    pub insecure_ignore_host_key: bool,
}

impl Default for FixtureSettings {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            repositories: RepositoryEndpoints::default(),
            destination_server: DEFAULT_DESTINATION_SERVER.to_owned(),
            destination_namespace: "default".to_owned(),
            project: DEFAULT_PROJECT.to_owned(),
            case_budget: None,
            keep_resources: false,
            insecure_ignore_host_key: false,
        }
    }
}

static HARNESSES: AtomicU64 = AtomicU64::new(0);

/// Entry point that starts test cases against one control plane.
///
/// A harness is cheap to share; every [`Harness::given`] call creates an
/// independent [`TestContext`]. Application names carry the harness run id
/// and a case number, so no two cases address the same application.
#[derive(Clone)]
pub struct Harness {
    gateway: Arc<dyn ControlPlaneGateway>,
    settings: FixtureSettings,
    clock: Arc<dyn Clock>,
    report: Arc<dyn ReportSink>,
    probe: Option<Arc<dyn RemoteProbe>>,
    run_id: String,
    cases: Arc<AtomicU64>,
}

impl Harness {
    /// Creates a harness driving `gateway`.
    #[must_use]
    pub fn new(gateway: Arc<dyn ControlPlaneGateway>, settings: FixtureSettings) -> Self {
        Self {
            gateway,
            settings,
            clock: Arc::new(TokioClock),
            report: Arc::new(NoopReportSink),
            probe: None,
            run_id: default_run_id(),
            cases: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replaces the run id prefixed to every case token.
    ///
    /// The default is derived from the wall clock and a process-wide
    /// counter. A fixed id gives predictable names, but names from two runs
    /// sharing an id collide.
    #[must_use]
    pub fn with_run_id(self, run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..self
        }
    }

    /// Replaces the clock used for polling and budgets.
    #[must_use]
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ..self }
    }

    /// Replaces the sink receiving per-case report events.
    #[must_use]
    pub fn with_report_sink(self, report: Arc<dyn ReportSink>) -> Self {
        Self { report, ..self }
    }

    /// Checks repository reachability before each registration.
    #[must_use]
    pub fn with_probe(self, probe: Arc<dyn RemoteProbe>) -> Self {
        Self {
            probe: Some(probe),
            ..self
        }
    }

    /// Settings new cases start from.
    #[must_use]
    pub const fn settings(&self) -> &FixtureSettings {
        &self.settings
    }

    /// Starts a test case named `case_name`.
    #[must_use]
    pub fn given(&self, case_name: &str) -> Given {
        let started_at = self.clock.now();
        // A budget too large to represent leaves the case unbounded.
        let budget_deadline = self
            .settings
            .case_budget
            .and_then(|budget| started_at.checked_add(budget));
        let case = self.cases.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        let token = format!("{}-{case}", self.run_id);
        let draft = ApplicationDraft::for_case(case_name, &token)
            .with_destination_server(self.settings.destination_server.clone())
            .with_destination_namespace(self.settings.destination_namespace.clone())
            .with_project(self.settings.project.clone());

        self.report.record(ReportEvent::CaseStarted {
            case: case_name.to_owned(),
        });

        Given::new(TestContext {
            case_name: case_name.to_owned(),
            gateway: Arc::clone(&self.gateway),
            settings: self.settings.clone(),
            clock: Arc::clone(&self.clock),
            report: Arc::clone(&self.report),
            probe: self.probe.clone(),
            started_at,
            budget_deadline,
            draft,
            explicit_repo_url: None,
            repo_url_type: None,
            provisioned: Vec::new(),
            spec: None,
            created: Vec::new(),
            last_action: None,
            last_observation: None,
            mode: ExecutionMode::Strict,
        })
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Harness")
            .field("settings", &self.settings)
            .field("clock", &self.clock)
            .field("probe", &self.probe.is_some())
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

fn default_run_id() -> String {
    let harness = HARNESSES.fetch_add(1, Ordering::Relaxed);
    let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    format!("{:08x}{harness:x}", millis & 0xffff_ffff)
}

/// Per-case state threaded through the stages.
pub struct TestContext {
    case_name: String,
    gateway: Arc<dyn ControlPlaneGateway>,
    settings: FixtureSettings,
    clock: Arc<dyn Clock>,
    report: Arc<dyn ReportSink>,
    probe: Option<Arc<dyn RemoteProbe>>,
    started_at: Instant,
    budget_deadline: Option<Instant>,
    draft: ApplicationDraft,
    explicit_repo_url: Option<String>,
    repo_url_type: Option<RepoUrlType>,
    provisioned: Vec<RepositoryCredential>,
    spec: Option<ApplicationSpec>,
    created: Vec<ApplicationName>,
    last_action: Option<ActionResult>,
    last_observation: Option<Observation>,
    mode: ExecutionMode,
}

impl TestContext {
    /// Name of the test case.
    #[must_use]
    pub fn case_name(&self) -> &str {
        &self.case_name
    }

    /// Settings in effect for this case.
    #[must_use]
    pub const fn settings(&self) -> &FixtureSettings {
        &self.settings
    }

    /// The draft the next `create` freezes.
    #[must_use]
    pub const fn draft(&self) -> &ApplicationDraft {
        &self.draft
    }

    /// Repositories registered during this case.
    #[must_use]
    pub fn provisioned(&self) -> &[RepositoryCredential] {
        &self.provisioned
    }

    /// The most recently frozen spec.
    #[must_use]
    pub const fn spec(&self) -> Option<&ApplicationSpec> {
        self.spec.as_ref()
    }

    /// Applications created and not yet deleted.
    #[must_use]
    pub fn created(&self) -> &[ApplicationName] {
        &self.created
    }

    /// Result of the most recent action in this round.
    #[must_use]
    pub const fn last_action(&self) -> Option<&ActionResult> {
        self.last_action.as_ref()
    }

    /// Observation that satisfied the most recent eventual expectation.
    #[must_use]
    pub const fn last_observation(&self) -> Option<&Observation> {
        self.last_observation.as_ref()
    }

    /// Time since the case started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn poller(&self) -> Poller<'_> {
        Poller::new(self.clock.as_ref(), self.settings.poll)
            .with_budget_deadline(self.budget_deadline)
    }

    fn current_spec(&self, step: &str) -> Result<ApplicationSpec, HarnessError> {
        self.spec.clone().ok_or_else(|| HarnessError::Stage {
            message: format!("{step} needs an application; call create first"),
        })
    }

    fn step_passed(&self, step: &str, started: Instant) {
        self.report.record(ReportEvent::StepPassed {
            case: self.case_name.clone(),
            step: step.to_owned(),
            elapsed_ms: millis(self.now().saturating_duration_since(started)),
        });
    }

    fn step_failed(&self, step: &str, started: Instant, error: HarnessError) -> HarnessError {
        let elapsed = self.now().saturating_duration_since(started);
        self.report.record(ReportEvent::case_failed(
            &self.case_name,
            step,
            &error,
            elapsed,
        ));
        if !self.created.is_empty() {
            let names: Vec<&str> = self.created.iter().map(ApplicationName::as_str).collect();
            warn!(
                case = %self.case_name,
                applications = ?names,
                "case failed; created applications left in place for inspection"
            );
        }
        error
    }
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TestContext")
            .field("case_name", &self.case_name)
            .field("draft", &self.draft)
            .field("spec", &self.spec)
            .field("created", &self.created)
            .field("last_action", &self.last_action)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
