//! Polling until an eventual condition holds.
//!
//! The [`Poller`] is the only place the harness suspends. It repeatedly
//! fetches state, evaluates a predicate and stops on one of four outcomes:
//! the condition holds, the condition can no longer hold, the deadline
//! passes, or the control plane cannot be observed. Only the fetch is
//! repeated, so the loop never changes remote state.

mod clock;

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

#[cfg(any(test, feature = "test-support"))]
pub use clock::ManualClock;
pub use clock::{Clock, TokioClock};

use crate::control_plane::ControlPlaneError;
use crate::error::HarnessError;
use crate::expect::{MatchResult, Verdict};

/// Default time an eventual expectation may take.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default pause between fetches.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
/// Default bound on consecutive failed fetches.
pub const DEFAULT_MAX_OBSERVATION_FAILURES: u32 = 5;
/// Default first backoff after a failed fetch.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Default ceiling for the backoff between failed fetches.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(8);

/// Longest timeout or case budget accepted.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Timing policy for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// How long the condition may take to hold.
    pub timeout: Duration,
    /// Pause between successful fetches.
    pub interval: Duration,
    /// Consecutive failed fetches tolerated before giving up.
    pub max_observation_failures: u32,
    /// Backoff after the first failed fetch; doubles per further failure.
    pub backoff_base: Duration,
    /// Ceiling for the backoff.
    pub backoff_cap: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
            max_observation_failures: DEFAULT_MAX_OBSERVATION_FAILURES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl PollSettings {
    /// Returns a copy with a different timeout.
    #[must_use]
    pub const fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Checks the settings describe a loop that terminates and makes progress.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Configuration`] for a zero or excessive
    /// timeout, a zero interval, or a zero failure bound.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let problem = if self.timeout.is_zero() || self.timeout > MAX_TIMEOUT {
            Some(format!(
                "timeout must be between 1ms and {}s",
                MAX_TIMEOUT.as_secs()
            ))
        } else if self.interval.is_zero() {
            Some("poll interval must be positive".to_owned())
        } else if self.max_observation_failures == 0 {
            Some("max observation failures must be at least 1".to_owned())
        } else {
            None
        };

        problem.map_or(Ok(()), |message| {
            Err(HarnessError::Configuration { message })
        })
    }

    fn backoff(&self, failures: u32) -> Duration {
        let factor = 2_u32.saturating_pow(failures.saturating_sub(1));
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_cap)
    }
}

/// Why a wait ended without the condition holding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollFailure {
    /// The predicate reported the condition can no longer hold.
    Violated {
        /// The definite mismatch.
        result: MatchResult,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// The timeout passed while the condition was still pending.
    TimedOut {
        /// Last pending comparison, if anything was observed.
        last: Option<MatchResult>,
        /// Last fetch error, if the final attempts failed.
        last_error: Option<String>,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// The case budget ran out before the timeout.
    Cancelled {
        /// Last pending comparison, if anything was observed.
        last: Option<MatchResult>,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// Fetching failed too often in a row, or failed permanently.
    Observation {
        /// Consecutive failed fetches.
        attempts: u32,
        /// Last fetch error.
        message: String,
        /// Time spent waiting.
        elapsed: Duration,
    },
}

impl PollFailure {
    /// Converts the failure into the error reported for `expectation`.
    #[must_use]
    pub fn into_harness_error(self, expectation: &str) -> HarnessError {
        match self {
            Self::Violated { result, elapsed } => HarnessError::ExpectationUnmet {
                expectation: expectation.to_owned(),
                expected: result.expected,
                actual: result.actual,
                elapsed,
            },
            Self::TimedOut {
                last,
                last_error,
                elapsed,
            } => {
                let (expected, last_observed) = match last {
                    Some(result) => (result.expected, result.actual),
                    None => (expectation.to_owned(), nothing_observed(last_error)),
                };
                HarnessError::Timeout {
                    expectation: expectation.to_owned(),
                    expected,
                    last_observed,
                    elapsed,
                }
            }
            Self::Cancelled { last, elapsed } => HarnessError::Cancelled {
                expectation: expectation.to_owned(),
                last_observed: last.map_or_else(|| nothing_observed(None), |result| result.actual),
                elapsed,
            },
            Self::Observation {
                attempts,
                message,
                elapsed,
            } => HarnessError::ObservationFailure {
                attempts,
                message,
                elapsed,
            },
        }
    }
}

fn nothing_observed(last_error: Option<String>) -> String {
    last_error.map_or_else(
        || "nothing".to_owned(),
        |error| format!("nothing (last error: {error})"),
    )
}

/// Polls a fetch until a predicate is satisfied.
#[derive(Debug, Clone, Copy)]
pub struct Poller<'clock> {
    clock: &'clock dyn Clock,
    settings: PollSettings,
    budget_deadline: Option<Instant>,
}

impl<'clock> Poller<'clock> {
    /// Creates a poller with the given clock and settings.
    #[must_use]
    pub const fn new(clock: &'clock dyn Clock, settings: PollSettings) -> Self {
        Self {
            clock,
            settings,
            budget_deadline: None,
        }
    }

    /// Bounds every wait by the overall case deadline.
    #[must_use]
    pub const fn with_budget_deadline(self, deadline: Option<Instant>) -> Self {
        Self {
            budget_deadline: deadline,
            ..self
        }
    }

    /// Fetches until `predicate` is satisfied and returns the satisfying state.
    ///
    /// The wait ends no earlier than the timeout and, provided a fetch takes
    /// less than the interval, no later than one interval after it.
    ///
    /// # Errors
    ///
    /// Returns a [`PollFailure`] describing why the condition was not
    /// reached.
    pub async fn await_condition<T, Fetch, Fut, Predicate>(
        &self,
        mut fetch: Fetch,
        mut predicate: Predicate,
    ) -> Result<T, PollFailure>
    where
        Fetch: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ControlPlaneError>>,
        Predicate: FnMut(&T) -> Verdict,
    {
        let start = self.clock.now();
        // A timeout too large to represent never expires.
        let timeout_deadline = start.checked_add(self.settings.timeout);
        let (deadline, budget_binding) = match (self.budget_deadline, timeout_deadline) {
            (Some(budget), timeout) if timeout.is_none_or(|at| budget < at) => {
                (Some(budget), true)
            }
            (_, timeout) => (timeout, false),
        };

        let mut failures = 0_u32;
        let mut last: Option<MatchResult> = None;
        let mut last_error: Option<String>;

        loop {
            let pause = match fetch().await {
                Ok(state) => {
                    failures = 0;
                    last_error = None;
                    match predicate(&state) {
                        Verdict::Satisfied => return Ok(state),
                        Verdict::Violated(result) => {
                            return Err(PollFailure::Violated {
                                result,
                                elapsed: self.elapsed_since(start),
                            });
                        }
                        Verdict::Pending(result) => {
                            debug!(
                                expected = %result.expected,
                                actual = %result.actual,
                                "condition pending"
                            );
                            last = Some(result);
                        }
                    }
                    self.settings.interval
                }
                Err(error) if error.is_transient() => {
                    failures = failures.saturating_add(1);
                    warn!(attempt = failures, error = %error, "observation failed");
                    if failures >= self.settings.max_observation_failures {
                        return Err(PollFailure::Observation {
                            attempts: failures,
                            message: error.to_string(),
                            elapsed: self.elapsed_since(start),
                        });
                    }
                    last_error = Some(error.to_string());
                    self.settings.backoff(failures)
                }
                Err(error) => {
                    return Err(PollFailure::Observation {
                        attempts: failures.saturating_add(1),
                        message: error.to_string(),
                        elapsed: self.elapsed_since(start),
                    });
                }
            };

            let now = self.clock.now();
            let remaining = deadline.map(|at| at.saturating_duration_since(now));
            if remaining.is_some_and(|left| left.is_zero()) {
                let elapsed = self.elapsed_since(start);
                return Err(if budget_binding {
                    PollFailure::Cancelled { last, elapsed }
                } else {
                    PollFailure::TimedOut {
                        last,
                        last_error,
                        elapsed,
                    }
                });
            }
            self.clock
                .sleep(remaining.map_or(pause, |left| pause.min(left)))
                .await;
        }
    }

    fn elapsed_since(&self, start: Instant) -> Duration {
        self.clock.now().saturating_duration_since(start)
    }
}

#[cfg(test)]
mod tests;
