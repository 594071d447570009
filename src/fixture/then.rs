//! The `Then` stage: assertions on action results and observed state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{Given, TestContext, When};
use crate::action::{ActionResult, ExecutionMode};
use crate::control_plane::{ApplicationSnapshot, ControlPlaneError, Observation};
use crate::error::HarnessError;
use crate::expect::Expectation;
use crate::report::{ReportEvent, millis};

const CUSTOM_ASSERTION: &str = "custom assertion";

/// Asserts on the outcome of the preceding actions.
#[derive(Debug)]
pub struct Then {
    context: TestContext,
}

impl Then {
    pub(super) const fn new(context: TestContext) -> Self {
        Self { context }
    }

    /// Checks `expectation`, polling when it concerns eventual state.
    ///
    /// Immediate expectations are matched once against the last action
    /// result. Eventual expectations are polled against the current
    /// application until they hold, are violated, or time runs out.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExpectationUnmet`], [`HarnessError::Timeout`],
    /// [`HarnessError::Cancelled`] or [`HarnessError::ObservationFailure`]
    /// describing why the expectation did not hold, and
    /// [`HarnessError::Stage`] when an eventual expectation is checked before
    /// anything was created.
    pub async fn expect(mut self, expectation: Expectation) -> Result<Self, HarnessError> {
        let started = self.context.now();
        let step = expectation.to_string();

        if expectation.is_immediate() {
            let result = expectation.check_action(self.context.last_action.as_ref());
            if result.passed {
                self.context.step_passed(&step, started);
                return Ok(self);
            }
            let error = HarnessError::ExpectationUnmet {
                expectation: step.clone(),
                expected: result.expected,
                actual: result.actual,
                elapsed: Duration::ZERO,
            };
            return Err(self.context.step_failed(&step, started, error));
        }

        let spec = match self.context.current_spec(&step) {
            Ok(spec) => spec,
            Err(error) => return Err(self.context.step_failed(&step, started, error)),
        };
        let gateway = Arc::clone(&self.context.gateway);
        let name = spec.name().clone();

        let outcome = self
            .context
            .poller()
            .await_condition(
                move || {
                    let gateway = Arc::clone(&gateway);
                    let name = name.clone();
                    async move { gateway.application(&name).await }
                },
                move |observation| expectation.check_observation(observation),
            )
            .await;

        match outcome {
            Ok(observation) => {
                self.context.step_passed(&step, started);
                self.context.last_observation = Some(observation);
                Ok(self)
            }
            Err(failure) => {
                let error = failure.into_harness_error(&step);
                Err(self.context.step_failed(&step, started, error))
            }
        }
    }

    /// Runs a custom assertion against a fresh read of the application.
    ///
    /// The closure returns `Err` with a description of what it found.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExpectationUnmet`] when the application is
    /// absent or the assertion fails, and
    /// [`HarnessError::ObservationFailure`] when it cannot be read.
    pub async fn and<Check>(mut self, check: Check) -> Result<Self, HarnessError>
    where
        Check: FnOnce(&ApplicationSnapshot) -> Result<(), String>,
    {
        let started = self.context.now();
        let spec = match self.context.current_spec(CUSTOM_ASSERTION) {
            Ok(spec) => spec,
            Err(error) => return Err(self.context.step_failed(CUSTOM_ASSERTION, started, error)),
        };

        let observation = match self.context.gateway.application(spec.name()).await {
            Ok(observation) => observation,
            Err(error) => {
                let failure = observation_failure(&error, self.context.now(), started);
                return Err(self.context.step_failed(CUSTOM_ASSERTION, started, failure));
            }
        };

        let verdict = match &observation {
            Observation::Present(snapshot) => check(snapshot),
            Observation::Absent { .. } => Err(observation.to_string()),
        };
        if let Err(actual) = verdict {
            let error = HarnessError::ExpectationUnmet {
                expectation: CUSTOM_ASSERTION.to_owned(),
                expected: "custom assertion to hold".to_owned(),
                actual,
                elapsed: self.context.now().saturating_duration_since(started),
            };
            return Err(self.context.step_failed(CUSTOM_ASSERTION, started, error));
        }

        self.context.step_passed(CUSTOM_ASSERTION, started);
        self.context.last_observation = Some(observation);
        Ok(self)
    }

    /// Runs a custom assertion against the last action result.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Stage`] when no action ran in this round and
    /// [`HarnessError::ExpectationUnmet`] when the assertion fails.
    pub fn and_action<Check>(self, check: Check) -> Result<Self, HarnessError>
    where
        Check: FnOnce(&ActionResult) -> Result<(), String>,
    {
        let started = self.context.now();
        let Some(result) = self.context.last_action.as_ref() else {
            let error = HarnessError::Stage {
                message: "no action ran before the assertion".to_owned(),
            };
            return Err(self.context.step_failed(CUSTOM_ASSERTION, started, error));
        };

        if let Err(actual) = check(result) {
            let error = HarnessError::ExpectationUnmet {
                expectation: CUSTOM_ASSERTION.to_owned(),
                expected: "custom assertion to hold".to_owned(),
                actual,
                elapsed: Duration::ZERO,
            };
            return Err(self.context.step_failed(CUSTOM_ASSERTION, started, error));
        }

        self.context.step_passed(CUSTOM_ASSERTION, started);
        Ok(self)
    }

    /// Per-case state accumulated so far.
    #[must_use]
    pub const fn context(&self) -> &TestContext {
        &self.context
    }

    /// Starts another round with the settings accumulated so far.
    ///
    /// The next `create` produces a new application; the last action result
    /// and observation are cleared and strict mode is restored.
    #[must_use]
    pub fn given(mut self) -> Given {
        self.context.last_action = None;
        self.context.last_observation = None;
        self.context.mode = ExecutionMode::Strict;
        Given::new(self.context)
    }

    /// Issues further actions against the current application.
    #[must_use]
    pub fn when(self) -> When {
        When::new(self.context)
    }

    /// Deletes the applications this case created, then reports the pass.
    ///
    /// Applications are kept when the settings ask for it. Every deletion is
    /// attempted even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ActionRejected`] for the first deletion the
    /// control plane refused.
    pub async fn teardown(self) -> Result<(), HarnessError> {
        let started = self.context.now();
        let context = self.context;

        if context.settings.keep_resources {
            info!(
                case = %context.case_name,
                applications = context.created.len(),
                "keeping created applications"
            );
        } else {
            let mut first_error = None;
            for name in &context.created {
                match context.gateway.delete_application(name, true).await {
                    Ok(_) | Err(ControlPlaneError::NotFound { .. }) => {}
                    Err(error) => {
                        warn!(application = %name, error = %error, "teardown delete failed");
                        first_error.get_or_insert(HarnessError::ActionRejected {
                            action: "delete".to_owned(),
                            code: error.code(),
                            message: error.message().to_owned(),
                        });
                    }
                }
            }
            if let Some(error) = first_error {
                return Err(context.step_failed("teardown", started, error));
            }
        }

        context.report.record(ReportEvent::CasePassed {
            case: context.case_name.clone(),
            elapsed_ms: millis(context.elapsed()),
        });
        Ok(())
    }
}

fn observation_failure(
    error: &ControlPlaneError,
    now: tokio::time::Instant,
    started: tokio::time::Instant,
) -> HarnessError {
    HarnessError::ObservationFailure {
        attempts: 1,
        message: error.to_string(),
        elapsed: now.saturating_duration_since(started),
    }
}
