//! Scenario state for the refspec behavioural tests.

use std::sync::Arc;

use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use syncprobe::poll::ManualClock;
use syncprobe::report::RecordingReportSink;
use syncprobe::{Given, HarnessError, Then};
use wiremock::MockServer;

use crate::fake_control_plane::FakeControlPlane;
pub(crate) use crate::runtime::SharedRuntime;

#[derive(ScenarioState, Default)]
pub(crate) struct RefspecState {
    pub(crate) runtime: Slot<SharedRuntime>,
    pub(crate) server: Slot<MockServer>,
    pub(crate) fake: Slot<FakeControlPlane>,
    pub(crate) clock: Slot<Arc<ManualClock>>,
    pub(crate) report: Slot<Arc<RecordingReportSink>>,
    pub(crate) given: Slot<Given>,
    pub(crate) then: Slot<Then>,
}

/// Error for a step that ran before the state it needs was set up.
pub(crate) fn missing(what: &str) -> HarnessError {
    HarnessError::Stage {
        message: format!("{what} not initialised by an earlier step"),
    }
}

impl RefspecState {
    pub(crate) fn runtime(&self) -> Result<SharedRuntime, HarnessError> {
        self.runtime.get().ok_or_else(|| missing("runtime"))
    }

    pub(crate) fn fake(&self) -> Result<FakeControlPlane, HarnessError> {
        self.fake.get().ok_or_else(|| missing("fake control plane"))
    }
}
