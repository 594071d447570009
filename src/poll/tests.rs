//! Tests for the outcome poller.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::{Clock, ManualClock, PollFailure, PollSettings, Poller, TokioClock};
use crate::control_plane::ControlPlaneError;
use crate::error::HarnessError;
use crate::expect::{MatchResult, Verdict};

#[fixture]
fn clock() -> ManualClock {
    ManualClock::new()
}

fn settings(timeout_secs: u64, interval_secs: u64) -> PollSettings {
    PollSettings {
        timeout: Duration::from_secs(timeout_secs),
        interval: Duration::from_secs(interval_secs),
        max_observation_failures: 3,
        backoff_base: Duration::from_millis(500),
        backoff_cap: Duration::from_secs(2),
    }
}

fn pending(actual: &str) -> Verdict {
    Verdict::Pending(MatchResult {
        passed: false,
        expected: "Succeeded".to_owned(),
        actual: actual.to_owned(),
    })
}

fn unavailable() -> ControlPlaneError {
    ControlPlaneError::Transient {
        message: "get application failed with status 503".to_owned(),
    }
}

#[rstest]
#[case(10, 3)]
#[case(10, 5)]
#[case(1, 30)]
#[tokio::test]
async fn never_satisfied_fails_between_timeout_and_one_interval_later(
    clock: ManualClock,
    #[case] timeout_secs: u64,
    #[case] interval_secs: u64,
) {
    let poll = settings(timeout_secs, interval_secs);
    let failure = Poller::new(&clock, poll)
        .await_condition(
            || async { Ok::<_, ControlPlaneError>("Running") },
            |phase| pending(phase),
        )
        .await
        .expect_err("condition never holds");

    let elapsed = clock.elapsed();
    assert!(elapsed >= poll.timeout, "failed early at {elapsed:?}");
    assert!(
        elapsed <= poll.timeout + poll.interval,
        "failed late at {elapsed:?}"
    );
    assert!(
        matches!(
            &failure,
            PollFailure::TimedOut { last: Some(result), .. } if result.actual == "Running"
        ),
        "got {failure:?}"
    );
}

#[rstest]
#[tokio::test]
async fn fetches_once_more_at_the_deadline(clock: ManualClock) {
    let mut fetches = 0_u32;
    let result = Poller::new(&clock, settings(10, 4))
        .await_condition(
            || {
                fetches += 1;
                let attempt = fetches;
                async move { Ok::<_, ControlPlaneError>(attempt) }
            },
            |attempt| {
                if *attempt == 4 {
                    Verdict::Satisfied
                } else {
                    pending("Running")
                }
            },
        )
        .await;

    // Fetches at 0s, 4s, 8s and the clamped final fetch at 10s.
    assert_eq!(result, Ok(4));
    assert_eq!(clock.elapsed(), Duration::from_secs(10));
}

#[rstest]
#[tokio::test]
async fn returns_satisfying_state(clock: ManualClock) {
    let phases = ["", "Running", "Running", "Succeeded"];
    let mut reads = phases.iter();
    let state = Poller::new(&clock, settings(60, 1))
        .await_condition(
            || {
                let phase = reads.next().copied().unwrap_or("Succeeded");
                async move { Ok::<_, ControlPlaneError>(phase) }
            },
            |phase| {
                if *phase == "Succeeded" {
                    Verdict::Satisfied
                } else {
                    pending(phase)
                }
            },
        )
        .await
        .expect("condition holds on the fourth read");

    assert_eq!(state, "Succeeded");
    assert_eq!(clock.elapsed(), Duration::from_secs(3));
}

#[rstest]
#[tokio::test]
async fn recovers_from_transient_failures(clock: ManualClock) {
    let mut reads = 0_u32;
    let state = Poller::new(&clock, settings(60, 1))
        .await_condition(
            || {
                reads += 1;
                let attempt = reads;
                async move {
                    // Unreachable for two reads, then running, then done.
                    match attempt {
                        1 | 2 => Err(unavailable()),
                        3 => Ok("Running"),
                        _ => Ok("Succeeded"),
                    }
                }
            },
            |phase| {
                if *phase == "Succeeded" {
                    Verdict::Satisfied
                } else {
                    pending(phase)
                }
            },
        )
        .await
        .expect("poller should ride out the outage");

    assert_eq!(state, "Succeeded");
    assert_eq!(reads, 4);
    // Backoff of 0.5s and 1s, then one interval.
    assert_eq!(clock.elapsed(), Duration::from_millis(2500));
}

#[rstest]
#[tokio::test]
async fn failure_counter_resets_after_a_successful_read(clock: ManualClock) {
    let mut reads = 0_u32;
    let state = Poller::new(&clock, settings(60, 1))
        .await_condition(
            || {
                reads += 1;
                let attempt = reads;
                async move {
                    match attempt {
                        1 | 2 | 4 | 5 => Err(unavailable()),
                        3 => Ok("Running"),
                        _ => Ok("Succeeded"),
                    }
                }
            },
            |phase| {
                if *phase == "Succeeded" {
                    Verdict::Satisfied
                } else {
                    pending(phase)
                }
            },
        )
        .await;

    assert_eq!(state, Ok("Succeeded"));
}

#[rstest]
#[tokio::test]
async fn exhausted_failures_are_distinct_from_timeout(clock: ManualClock) {
    let failure = Poller::new(&clock, settings(60, 1))
        .await_condition(
            || async { Err::<&str, _>(unavailable()) },
            |_| Verdict::Satisfied,
        )
        .await
        .expect_err("the control plane never answers");

    assert!(
        matches!(&failure, PollFailure::Observation { attempts: 3, message, .. } if message.contains("503")),
        "got {failure:?}"
    );
    let error = failure.into_harness_error("operation phase is Succeeded");
    assert!(error.is_infrastructure(), "{error}");
}

#[rstest]
#[tokio::test]
async fn permanent_fetch_error_fails_immediately(clock: ManualClock) {
    let failure = Poller::new(&clock, settings(60, 1))
        .await_condition(
            || async {
                Err::<&str, _>(ControlPlaneError::Authentication {
                    message: "token expired".to_owned(),
                })
            },
            |_| Verdict::Satisfied,
        )
        .await
        .expect_err("authentication failures are not retried");

    assert!(
        matches!(failure, PollFailure::Observation { attempts: 1, .. }),
        "got {failure:?}"
    );
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[rstest]
#[tokio::test]
async fn violated_condition_fails_without_waiting(clock: ManualClock) {
    let failure = Poller::new(&clock, settings(60, 1))
        .await_condition(
            || async { Ok::<_, ControlPlaneError>("Failed") },
            |phase| {
                Verdict::Violated(MatchResult {
                    passed: false,
                    expected: "Succeeded".to_owned(),
                    actual: (*phase).to_owned(),
                })
            },
        )
        .await
        .expect_err("terminal mismatch");

    assert_eq!(clock.elapsed(), Duration::ZERO);
    let error = failure.into_harness_error("operation phase is Succeeded");
    assert!(
        matches!(&error, HarnessError::ExpectationUnmet { actual, .. } if actual == "Failed"),
        "got {error:?}"
    );
}

#[rstest]
#[tokio::test]
async fn case_budget_cancels_the_wait(clock: ManualClock) {
    let budget = clock.now() + Duration::from_secs(5);
    let failure = Poller::new(&clock, settings(60, 2))
        .with_budget_deadline(Some(budget))
        .await_condition(
            || async { Ok::<_, ControlPlaneError>("Running") },
            |phase| pending(phase),
        )
        .await
        .expect_err("budget runs out first");

    assert_eq!(clock.elapsed(), Duration::from_secs(5));
    assert!(
        matches!(failure, PollFailure::Cancelled { .. }),
        "got {failure:?}"
    );
}

#[rstest]
#[tokio::test]
async fn unrepresentable_timeout_waits_until_the_condition_holds(clock: ManualClock) {
    let poll = PollSettings {
        timeout: Duration::MAX,
        ..settings(60, 1)
    };
    let mut reads = ["Running", "Running", "Succeeded"].into_iter();
    let state = Poller::new(&clock, poll)
        .await_condition(
            || {
                let phase = reads.next().unwrap_or("Succeeded");
                async move { Ok::<_, ControlPlaneError>(phase) }
            },
            |phase| {
                if *phase == "Succeeded" {
                    Verdict::Satisfied
                } else {
                    pending(phase)
                }
            },
        )
        .await
        .expect("no deadline to miss");

    assert_eq!(state, "Succeeded");
    assert_eq!(clock.elapsed(), Duration::from_secs(2));
}

#[rstest]
#[tokio::test]
async fn budget_bounds_an_unrepresentable_timeout(clock: ManualClock) {
    let poll = PollSettings {
        timeout: Duration::MAX,
        ..settings(60, 1)
    };
    let budget = clock.now() + Duration::from_secs(4);
    let failure = Poller::new(&clock, poll)
        .with_budget_deadline(Some(budget))
        .await_condition(
            || async { Ok::<_, ControlPlaneError>("Running") },
            |phase| pending(phase),
        )
        .await
        .expect_err("budget is the only deadline");

    assert_eq!(clock.elapsed(), Duration::from_secs(4));
    assert!(
        matches!(failure, PollFailure::Cancelled { .. }),
        "got {failure:?}"
    );
}

#[rstest]
#[tokio::test]
async fn later_budget_leaves_timeout_in_charge(clock: ManualClock) {
    let budget = clock.now() + Duration::from_secs(600);
    let failure = Poller::new(&clock, settings(5, 1))
        .with_budget_deadline(Some(budget))
        .await_condition(
            || async { Ok::<_, ControlPlaneError>("Running") },
            |phase| pending(phase),
        )
        .await
        .expect_err("timeout first");

    assert!(
        matches!(failure, PollFailure::TimedOut { .. }),
        "got {failure:?}"
    );
}

#[rstest]
#[tokio::test]
async fn timeout_during_outage_reports_last_error(clock: ManualClock) {
    let poll = PollSettings {
        max_observation_failures: 100,
        ..settings(3, 1)
    };
    let failure = Poller::new(&clock, poll)
        .await_condition(
            || async { Err::<&str, _>(unavailable()) },
            |_| Verdict::Satisfied,
        )
        .await
        .expect_err("never observed");

    let error = failure.into_harness_error("operation phase is Succeeded");
    assert!(
        matches!(&error, HarnessError::Timeout { last_observed, .. } if last_observed.contains("503")),
        "got {error:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn tokio_clock_follows_paused_time() {
    let clock = TokioClock;
    let start = clock.now();
    let failure = Poller::new(&clock, settings(4, 1))
        .await_condition(
            || async { Ok::<_, ControlPlaneError>("Running") },
            |phase| pending(phase),
        )
        .await;

    assert!(failure.is_err());
    assert_eq!(clock.now() - start, Duration::from_secs(4));
}

#[rstest]
#[case(PollSettings { timeout: Duration::ZERO, ..PollSettings::default() })]
#[case(PollSettings { interval: Duration::ZERO, ..PollSettings::default() })]
#[case(PollSettings { max_observation_failures: 0, ..PollSettings::default() })]
fn rejects_degenerate_settings(#[case] poll: PollSettings) {
    assert!(matches!(
        poll.validate(),
        Err(HarnessError::Configuration { .. })
    ));
}

#[rstest]
fn backoff_doubles_up_to_the_cap() {
    let poll = settings(60, 1);
    let waits: Vec<Duration> = (1..=5).map(|failures| poll.backoff(failures)).collect();
    assert_eq!(
        waits,
        vec![
            Duration::from_millis(500),
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(2),
            Duration::from_secs(2),
        ]
    );
}
