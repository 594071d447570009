//! State-changing actions against the control plane.
//!
//! Every action returns as soon as the control plane acknowledges or rejects
//! it; reconciliation is observed later by the poller. State-changing calls
//! are never repeated. A `create` that fails ambiguously (the request may or
//! may not have landed) is resolved with a single read instead.

use std::fmt;

use tracing::{info, warn};

use crate::application::ApplicationSpec;
use crate::control_plane::{
    Acknowledgement, ControlPlaneError, ControlPlaneGateway, Observation, SyncOptions,
};
use crate::error::HarnessError;

/// A state-changing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create the application from the frozen spec.
    Create,
    /// Request a sync of the application.
    Sync {
        /// Delete resources no longer present in Git.
        prune: bool,
    },
    /// Delete the application.
    Delete {
        /// Also delete the resources the application deployed.
        cascade: bool,
    },
}

impl Action {
    /// Short verb used in logs and diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Sync { .. } => "sync",
            Self::Delete { .. } => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => formatter.write_str("create"),
            Self::Sync { prune: false } => formatter.write_str("sync"),
            Self::Sync { prune: true } => formatter.write_str("sync --prune"),
            Self::Delete { cascade: true } => formatter.write_str("delete"),
            Self::Delete { cascade: false } => formatter.write_str("delete --cascade=false"),
        }
    }
}

/// How a rejected action is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// A rejection fails the step.
    #[default]
    Strict,
    /// A rejection is captured in the [`ActionResult`] for later matching.
    Tolerant,
}

/// Immediate outcome of one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    action: Action,
    succeeded: bool,
    error_code: Option<i32>,
    error_message: Option<String>,
    output: String,
}

impl ActionResult {
    pub(crate) const fn accepted(action: Action, output: String) -> Self {
        Self {
            action,
            succeeded: true,
            error_code: None,
            error_message: None,
            output,
        }
    }

    pub(crate) fn rejected(action: Action, error: &ControlPlaneError) -> Self {
        Self {
            action,
            succeeded: false,
            error_code: error.code(),
            error_message: Some(error.message().to_owned()),
            output: error.to_string(),
        }
    }

    /// The action this result belongs to.
    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    /// True when the control plane accepted the request.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Control-plane error code of a rejection.
    #[must_use]
    pub const fn error_code(&self) -> Option<i32> {
        self.error_code
    }

    /// Error message of a rejection, as returned by the control plane.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Full human-readable output of the call.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }
}

/// Issues actions through a gateway and records their immediate result.
pub struct ActionExecutor<'gateway, Gateway>
where
    Gateway: ControlPlaneGateway + ?Sized,
{
    gateway: &'gateway Gateway,
}

impl<'gateway, Gateway> ActionExecutor<'gateway, Gateway>
where
    Gateway: ControlPlaneGateway + ?Sized,
{
    /// Creates an executor over `gateway`.
    #[must_use]
    pub const fn new(gateway: &'gateway Gateway) -> Self {
        Self { gateway }
    }

    /// Executes `action` for `spec`.
    ///
    /// # Errors
    ///
    /// In [`ExecutionMode::Strict`], returns [`HarnessError::ActionRejected`]
    /// when the control plane refuses the call or cannot be reached. In
    /// [`ExecutionMode::Tolerant`] the failure is returned inside the
    /// [`ActionResult`] instead.
    pub async fn execute(
        &self,
        action: Action,
        spec: &ApplicationSpec,
        mode: ExecutionMode,
    ) -> Result<ActionResult, HarnessError> {
        let outcome = match action {
            Action::Create => self.create(spec).await,
            Action::Sync { prune } => {
                self.gateway
                    .sync_application(spec.name(), &SyncOptions { prune })
                    .await
            }
            Action::Delete { cascade } => {
                self.gateway
                    .delete_application(spec.name(), cascade)
                    .await
            }
        };

        match outcome {
            Ok(ack) => {
                info!(action = %action, application = %spec.name(), "action accepted");
                Ok(ActionResult::accepted(action, ack.message))
            }
            Err(error) => {
                warn!(
                    action = %action,
                    application = %spec.name(),
                    code = ?error.code(),
                    error = %error,
                    "action rejected"
                );
                match mode {
                    ExecutionMode::Strict => Err(HarnessError::ActionRejected {
                        action: action.name().to_owned(),
                        code: error.code(),
                        message: error.message().to_owned(),
                    }),
                    ExecutionMode::Tolerant => Ok(ActionResult::rejected(action, &error)),
                }
            }
        }
    }

    async fn create(&self, spec: &ApplicationSpec) -> Result<Acknowledgement, ControlPlaneError> {
        let error = match self.gateway.create_application(spec).await {
            Ok(ack) => return Ok(ack),
            Err(error) if error.is_transient() => error,
            Err(error) => return Err(error),
        };

        // The request may have landed before the connection dropped.
        match self.gateway.application(spec.name()).await {
            Ok(Observation::Present(_)) => {
                warn!(
                    application = %spec.name(),
                    error = %error,
                    "create reported a transport failure but the application exists"
                );
                Ok(Acknowledgement {
                    message: format!("application '{}' created", spec.name()),
                })
            }
            Ok(Observation::Absent { .. }) | Err(_) => Err(error),
        }
    }
}
