//! Per-case reporting events and sinks.
//!
//! Each test case emits a start event, one event per passed step, and a
//! final pass or fail event. Failure events carry the expected and actual
//! values together with the time spent waiting, so a report line alone is
//! enough to tell a slow controller from an unreachable one.

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// A structured reporting event for one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportEvent {
    /// A test case started.
    CaseStarted {
        /// Test case name.
        case: String,
    },
    /// A step (action or expectation) passed.
    StepPassed {
        /// Test case name.
        case: String,
        /// Step description, e.g. `sync` or `operation phase is Succeeded`.
        step: String,
        /// Time the step took, in milliseconds.
        elapsed_ms: u64,
    },
    /// A test case failed.
    CaseFailed {
        /// Test case name.
        case: String,
        /// Failing step.
        step: String,
        /// Error category, e.g. `timeout` or `observation_failure`.
        category: String,
        /// Expected value, when the failure compares values.
        expected: Option<String>,
        /// Actual or last observed value, when the failure compares values.
        actual: Option<String>,
        /// Time spent in the failing step, in milliseconds.
        elapsed_ms: u64,
        /// Full diagnostic message.
        message: String,
    },
    /// A test case passed.
    CasePassed {
        /// Test case name.
        case: String,
        /// Total time, in milliseconds.
        elapsed_ms: u64,
    },
}

impl ReportEvent {
    /// Builds the failure event for `error` raised while running `step`.
    #[must_use]
    pub fn case_failed(case: &str, step: &str, error: &HarnessError, elapsed: Duration) -> Self {
        let (category, expected, actual) = classify(error);
        Self::CaseFailed {
            case: case.to_owned(),
            step: step.to_owned(),
            category: category.to_owned(),
            expected,
            actual,
            elapsed_ms: millis(failure_elapsed(error).unwrap_or(elapsed)),
            message: error.to_string(),
        }
    }
}

fn classify(error: &HarnessError) -> (&'static str, Option<String>, Option<String>) {
    match error {
        HarnessError::Setup { .. } => ("setup", None, None),
        HarnessError::InvalidSpec { .. } => ("invalid_spec", None, None),
        HarnessError::Stage { .. } => ("stage", None, None),
        HarnessError::ActionRejected { message, .. } => {
            ("action_rejected", None, Some(message.clone()))
        }
        HarnessError::ExpectationUnmet {
            expected, actual, ..
        } => ("expectation_unmet", Some(expected.clone()), Some(actual.clone())),
        HarnessError::Timeout {
            expected,
            last_observed,
            ..
        } => ("timeout", Some(expected.clone()), Some(last_observed.clone())),
        HarnessError::ObservationFailure { message, .. } => {
            ("observation_failure", None, Some(message.clone()))
        }
        HarnessError::Cancelled { last_observed, .. } => {
            ("cancelled", None, Some(last_observed.clone()))
        }
        HarnessError::Configuration { .. } => ("configuration", None, None),
        HarnessError::Io { .. } => ("io", None, None),
    }
}

const fn failure_elapsed(error: &HarnessError) -> Option<Duration> {
    match error {
        HarnessError::ExpectationUnmet { elapsed, .. }
        | HarnessError::Timeout { elapsed, .. }
        | HarnessError::ObservationFailure { elapsed, .. }
        | HarnessError::Cancelled { elapsed, .. } => Some(*elapsed),
        _ => None,
    }
}

/// Milliseconds in `duration`, saturating.
#[must_use]
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A sink that records reporting events.
pub trait ReportSink: Send + Sync {
    /// Records a reporting event.
    fn record(&self, event: ReportEvent);
}

/// Report sink that drops all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReportSink;

impl ReportSink for NoopReportSink {
    fn record(&self, _event: ReportEvent) {}
}

/// Writes reporting events to stderr as JSON lines (JSONL).
#[derive(Debug, Default)]
pub struct StderrJsonlReportSink;

impl ReportSink for StderrJsonlReportSink {
    fn record(&self, event: ReportEvent) {
        let Ok(serialised) = serde_json::to_string(&event) else {
            return;
        };

        let _ignored = writeln_stderr(&serialised);
    }
}

fn writeln_stderr(message: &str) -> io::Result<()> {
    use io::Write;

    let mut stderr = io::stderr().lock();
    writeln!(stderr, "{message}")
}

/// Records events in memory for inspection by tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct RecordingReportSink {
    events: std::sync::Mutex<Vec<ReportEvent>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingReportSink {
    /// Drains the recorded events.
    #[must_use]
    pub fn take(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ReportSink for RecordingReportSink {
    fn record(&self, event: ReportEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}
