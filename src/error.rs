//! Error types surfaced by the harness.
//!
//! Every failure in a Given/When/Then chain ends up as a [`HarnessError`].
//! The variants keep setup problems, rejected actions, unmet expectations,
//! timeouts and observation failures apart so that a failing test points at
//! either the controller under test or the harness infrastructure.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced while driving the control plane or asserting outcomes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HarnessError {
    /// Repository provisioning failed; the test cannot start.
    #[error("repository setup failed for {url}: {message}")]
    Setup {
        /// Repository URL being provisioned.
        url: String,
        /// Why provisioning failed.
        message: String,
    },

    /// The application spec failed validation before submission.
    #[error("application spec is invalid: {message}")]
    InvalidSpec {
        /// The violated constraint.
        message: String,
    },

    /// A stage was used out of order, e.g. syncing before anything was created.
    #[error("harness misuse: {message}")]
    Stage {
        /// What the caller attempted.
        message: String,
    },

    /// The control plane rejected a state-changing call in strict mode.
    #[error("{action} rejected by the control plane: {message}")]
    ActionRejected {
        /// Action name (`create`, `sync`, `delete`).
        action: String,
        /// Control-plane error code, when one was returned.
        code: Option<i32>,
        /// Error message returned by the control plane.
        message: String,
    },

    /// An expectation evaluated to a definite mismatch.
    #[error(
        "expectation '{expectation}' not met after {elapsed:?}: expected {expected}, \
         got {actual}"
    )]
    ExpectationUnmet {
        /// Human-readable description of the expectation.
        expectation: String,
        /// Expected value.
        expected: String,
        /// Observed value.
        actual: String,
        /// Time spent before the mismatch was reported.
        elapsed: Duration,
    },

    /// The awaited condition did not hold within the expectation timeout.
    #[error(
        "timed out after {elapsed:?} waiting for '{expectation}': expected {expected}, \
         last observed {last_observed}"
    )]
    Timeout {
        /// Human-readable description of the expectation.
        expectation: String,
        /// Expected value.
        expected: String,
        /// Last state observed before giving up.
        last_observed: String,
        /// Time spent polling.
        elapsed: Duration,
    },

    /// The control plane could not be observed while polling.
    #[error("could not observe the control plane after {attempts} attempts ({elapsed:?}): {message}")]
    ObservationFailure {
        /// Consecutive failed fetch attempts.
        attempts: u32,
        /// Last fetch error.
        message: String,
        /// Time spent polling.
        elapsed: Duration,
    },

    /// The test case budget ran out while waiting.
    #[error(
        "test case budget exhausted after {elapsed:?} waiting for '{expectation}'; \
         last observed {last_observed}"
    )]
    Cancelled {
        /// Human-readable description of the expectation.
        expectation: String,
        /// Last state observed before cancellation.
        last_observed: String,
        /// Time spent polling.
        elapsed: Duration,
    },

    /// Configuration could not be loaded or is incomplete.
    #[error("configuration error: {message}")]
    Configuration {
        /// Details about the configuration failure.
        message: String,
    },

    /// Local I/O operation failed.
    #[error("I/O error: {message}")]
    Io {
        /// Error detail from the underlying I/O operation.
        message: String,
    },
}

impl HarnessError {
    /// Returns true when the error points at harness infrastructure rather
    /// than at the behaviour of the controller under test.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Setup { .. }
                | Self::ObservationFailure { .. }
                | Self::Configuration { .. }
                | Self::Io { .. }
        )
    }
}
