//! Expectations and the matchers that evaluate them.
//!
//! Immediate expectations are checked once against the last
//! [`ActionResult`]. Eventual expectations are evaluated against each
//! [`Observation`] the poller fetches and report a [`Verdict`]: satisfied,
//! still pending, or violated for good.

use std::fmt;

use crate::action::ActionResult;
use crate::control_plane::{
    ApplicationSnapshot, HealthStatus, Observation, OperationPhase, SyncStatus,
};

/// How expected text is compared with actual text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Whole string equality.
    Exact,
    /// Actual starts with expected.
    Prefix,
    /// Actual contains expected.
    Substring,
}

impl MatchKind {
    const fn describe(self) -> &'static str {
        match self {
            Self::Exact => "equal to",
            Self::Prefix => "starting with",
            Self::Substring => "containing",
        }
    }
}

/// Outcome of a single comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Whether the comparison held.
    pub passed: bool,
    /// Expected value, rendered for diagnostics.
    pub expected: String,
    /// Actual value, rendered for diagnostics.
    pub actual: String,
}

impl MatchResult {
    fn new(passed: bool, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            passed,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// One-line explanation of the comparison.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let verdict = if self.passed { "matched" } else { "mismatch" };
        format!("{verdict}: expected {}, got {}", self.expected, self.actual)
    }
}

/// Compares text according to `kind`.
#[must_use]
pub fn match_text(kind: MatchKind, expected: &str, actual: &str) -> MatchResult {
    let passed = match kind {
        MatchKind::Exact => actual == expected,
        MatchKind::Prefix => actual.starts_with(expected),
        MatchKind::Substring => actual.contains(expected),
    };
    MatchResult::new(
        passed,
        format!("{} '{expected}'", kind.describe()),
        format!("'{actual}'"),
    )
}

/// Compares an operation phase; `None` means no operation has started.
#[must_use]
pub fn match_phase(expected: OperationPhase, actual: Option<OperationPhase>) -> MatchResult {
    MatchResult::new(
        actual == Some(expected),
        expected.as_str(),
        actual.map_or("no operation", OperationPhase::as_str),
    )
}

/// Result of evaluating an eventual expectation against one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The condition holds.
    Satisfied,
    /// The condition does not hold yet but still could.
    Pending(MatchResult),
    /// The condition can no longer hold.
    Violated(MatchResult),
}

/// A condition on the outcome of the steps so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// The last action was rejected with a matching error message.
    Error {
        /// Comparison used on the message.
        kind: MatchKind,
        /// Expected message or fragment.
        message: String,
    },
    /// The last action was rejected; its output and error both contain the
    /// given fragments.
    ErrorWith {
        /// Fragment of the full output.
        output: String,
        /// Fragment of the error message.
        error: String,
    },
    /// The last action succeeded and its output contains the fragment.
    Success {
        /// Fragment of the output.
        output: String,
    },
    /// The operation reached the given phase.
    OperationPhaseIs(OperationPhase),
    /// The operation reached any terminal phase.
    OperationPhaseTerminal,
    /// The operation message contains the fragment.
    OperationMessageContains(String),
    /// Aggregated health equals the given status.
    HealthIs(HealthStatus),
    /// Sync status equals the given status.
    SyncStatusIs(SyncStatus),
    /// The application no longer exists.
    DoesNotExist,
}

impl Expectation {
    /// The last action was rejected with exactly `message`.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            kind: MatchKind::Exact,
            message: message.into(),
        }
    }

    /// The last action was rejected with a message containing `fragment`.
    #[must_use]
    pub fn error_contains(fragment: impl Into<String>) -> Self {
        Self::Error {
            kind: MatchKind::Substring,
            message: fragment.into(),
        }
    }

    /// The last action was rejected with a message starting with `prefix`.
    #[must_use]
    pub fn error_prefix(prefix: impl Into<String>) -> Self {
        Self::Error {
            kind: MatchKind::Prefix,
            message: prefix.into(),
        }
    }

    /// The last action was rejected; output and error contain the fragments.
    #[must_use]
    pub fn error_with(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ErrorWith {
            output: output.into(),
            error: error.into(),
        }
    }

    /// The last action succeeded with output containing `output`.
    #[must_use]
    pub fn success(output: impl Into<String>) -> Self {
        Self::Success {
            output: output.into(),
        }
    }

    /// The operation reaches `phase`.
    #[must_use]
    pub const fn operation_phase_is(phase: OperationPhase) -> Self {
        Self::OperationPhaseIs(phase)
    }

    /// The operation reaches any terminal phase.
    #[must_use]
    pub const fn operation_phase_terminal() -> Self {
        Self::OperationPhaseTerminal
    }

    /// The operation message contains `fragment`.
    #[must_use]
    pub fn operation_message_contains(fragment: impl Into<String>) -> Self {
        Self::OperationMessageContains(fragment.into())
    }

    /// Health reaches `status`.
    #[must_use]
    pub const fn health_is(status: HealthStatus) -> Self {
        Self::HealthIs(status)
    }

    /// Sync status reaches `status`.
    #[must_use]
    pub const fn sync_status_is(status: SyncStatus) -> Self {
        Self::SyncStatusIs(status)
    }

    /// The application is gone.
    #[must_use]
    pub const fn does_not_exist() -> Self {
        Self::DoesNotExist
    }

    /// True for expectations checked once against the last action result.
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        matches!(
            self,
            Self::Error { .. } | Self::ErrorWith { .. } | Self::Success { .. }
        )
    }

    /// Checks an immediate expectation against the last action result.
    ///
    /// Eventual expectations never match here.
    #[must_use]
    pub fn check_action(&self, result: Option<&ActionResult>) -> MatchResult {
        let Some(result) = result else {
            return MatchResult::new(false, self.to_string(), "no action executed");
        };

        match self {
            Self::Error { kind, message } => match result.error_message() {
                Some(actual) => match_text(*kind, message, actual),
                None => MatchResult::new(
                    false,
                    format!("{} error {} '{message}'", result.action(), kind.describe()),
                    format!("success: {}", result.output()),
                ),
            },
            Self::ErrorWith { output, error } => {
                let actual_error = result.error_message().unwrap_or_default();
                let passed = !result.succeeded()
                    && result.output().contains(output.as_str())
                    && actual_error.contains(error.as_str());
                MatchResult::new(
                    passed,
                    format!("failure with output containing '{output}' and error containing '{error}'"),
                    describe_result(result),
                )
            }
            Self::Success { output } => MatchResult::new(
                result.succeeded() && result.output().contains(output.as_str()),
                format!("success with output containing '{output}'"),
                describe_result(result),
            ),
            _ => MatchResult::new(
                false,
                self.to_string(),
                "an action result; this expectation needs an observation",
            ),
        }
    }

    /// Evaluates an eventual expectation against one observation.
    ///
    /// Immediate expectations are always violated here.
    #[must_use]
    pub fn check_observation(&self, observation: &Observation) -> Verdict {
        let snapshot = match observation {
            Observation::Absent { .. } if matches!(self, Self::DoesNotExist) => {
                return Verdict::Satisfied;
            }
            // A freshly created application can be briefly unreadable.
            Observation::Absent { .. } => {
                return Verdict::Pending(MatchResult::new(
                    false,
                    self.to_string(),
                    observation.to_string(),
                ));
            }
            Observation::Present(snapshot) => snapshot,
        };

        match self {
            Self::OperationPhaseIs(expected) => check_phase(*expected, snapshot),
            Self::OperationPhaseTerminal => pending_unless(MatchResult::new(
                snapshot.phase().is_some_and(OperationPhase::is_terminal),
                "a terminal phase",
                snapshot.phase().map_or("no operation", OperationPhase::as_str),
            )),
            Self::OperationMessageContains(fragment) => {
                let message = snapshot
                    .operation
                    .as_ref()
                    .map_or("", |operation| operation.message.as_str());
                pending_unless(match_text(MatchKind::Substring, fragment, message))
            }
            Self::HealthIs(expected) => pending_unless(MatchResult::new(
                snapshot.health_status == *expected,
                expected.as_str(),
                snapshot.health_status.as_str(),
            )),
            Self::SyncStatusIs(expected) => pending_unless(MatchResult::new(
                snapshot.sync_status == *expected,
                expected.as_str(),
                snapshot.sync_status.as_str(),
            )),
            Self::DoesNotExist => Verdict::Pending(MatchResult::new(
                false,
                "application absent",
                observation.to_string(),
            )),
            Self::Error { .. } | Self::ErrorWith { .. } | Self::Success { .. } => {
                Verdict::Violated(MatchResult::new(
                    false,
                    self.to_string(),
                    "an observation; this expectation needs an action result",
                ))
            }
        }
    }
}

/// A terminal phase other than the expected one will not change on its own.
fn check_phase(expected: OperationPhase, snapshot: &ApplicationSnapshot) -> Verdict {
    let result = match_phase(expected, snapshot.phase());
    if result.passed {
        return Verdict::Satisfied;
    }
    match snapshot.phase() {
        Some(actual) if actual.is_terminal() => Verdict::Violated(result),
        _ => Verdict::Pending(result),
    }
}

fn pending_unless(result: MatchResult) -> Verdict {
    if result.passed {
        Verdict::Satisfied
    } else {
        Verdict::Pending(result)
    }
}

fn describe_result(result: &ActionResult) -> String {
    match result.error_message() {
        Some(error) => format!("{} failed: {} ({error})", result.action(), result.output()),
        None => format!("{} succeeded: {}", result.action(), result.output()),
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error { kind, message } => {
                write!(formatter, "error {} '{message}'", kind.describe())
            }
            Self::ErrorWith { output, error } => write!(
                formatter,
                "error with output containing '{output}' and error containing '{error}'"
            ),
            Self::Success { output } => {
                write!(formatter, "success with output containing '{output}'")
            }
            Self::OperationPhaseIs(phase) => write!(formatter, "operation phase is {phase}"),
            Self::OperationPhaseTerminal => formatter.write_str("operation phase is terminal"),
            Self::OperationMessageContains(fragment) => {
                write!(formatter, "operation message contains '{fragment}'")
            }
            Self::HealthIs(status) => write!(formatter, "health is {status}"),
            Self::SyncStatusIs(status) => write!(formatter, "sync status is {status}"),
            Self::DoesNotExist => formatter.write_str("application does not exist"),
        }
    }
}
