//! The `When` stage: actions against the control plane.

use super::{TestContext, Then};
use crate::action::{Action, ActionExecutor, ExecutionMode};
use crate::error::HarnessError;

/// Issues actions for the application under construction.
#[derive(Debug)]
pub struct When {
    context: TestContext,
}

impl When {
    pub(super) const fn new(context: TestContext) -> Self {
        Self { context }
    }

    /// Captures rejections of the following actions instead of failing.
    #[must_use]
    pub fn ignore_errors(mut self) -> Self {
        self.context.mode = ExecutionMode::Tolerant;
        self
    }

    /// Fails on rejections of the following actions (the default).
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.context.mode = ExecutionMode::Strict;
        self
    }

    /// Freezes the draft into a new application and creates it.
    ///
    /// Every call allocates a new application name.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidSpec`] when the draft cannot be frozen
    /// and, in strict mode, [`HarnessError::ActionRejected`] when the control
    /// plane refuses the application.
    pub async fn create(mut self) -> Result<Self, HarnessError> {
        let started = self.context.now();
        let (spec, draft) = match self.context.draft.clone().freeze() {
            Ok(frozen) => frozen,
            Err(error) => return Err(self.context.step_failed("create", started, error)),
        };
        self.context.draft = draft;
        self.context.spec = Some(spec);

        self.run(Action::Create).await
    }

    /// Requests a sync of the current application.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Stage`] when nothing was created yet and, in
    /// strict mode, [`HarnessError::ActionRejected`] on rejection.
    pub async fn sync(self) -> Result<Self, HarnessError> {
        self.run(Action::Sync { prune: false }).await
    }

    /// Requests a sync that prunes resources no longer in Git.
    ///
    /// # Errors
    ///
    /// As for [`Self::sync`].
    pub async fn sync_with_prune(self) -> Result<Self, HarnessError> {
        self.run(Action::Sync { prune: true }).await
    }

    /// Deletes the current application.
    ///
    /// # Errors
    ///
    /// As for [`Self::sync`].
    pub async fn delete(self, cascade: bool) -> Result<Self, HarnessError> {
        self.run(Action::Delete { cascade }).await
    }

    async fn run(mut self, action: Action) -> Result<Self, HarnessError> {
        let started = self.context.now();
        let step = action.to_string();
        let spec = match self.context.current_spec(&step) {
            Ok(spec) => spec,
            Err(error) => return Err(self.context.step_failed(&step, started, error)),
        };

        let outcome = ActionExecutor::new(self.context.gateway.as_ref())
            .execute(action, &spec, self.context.mode)
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(error) => return Err(self.context.step_failed(&step, started, error)),
        };

        if result.succeeded() {
            match action {
                Action::Create => self.context.created.push(spec.name().clone()),
                Action::Delete { .. } => self.context.created.retain(|name| name != spec.name()),
                Action::Sync { .. } => {}
            }
        }
        self.context.step_passed(&step, started);
        self.context.last_action = Some(result);
        Ok(self)
    }

    /// Per-case state accumulated so far.
    #[must_use]
    pub const fn context(&self) -> &TestContext {
        &self.context
    }

    /// Moves to assertions.
    #[must_use]
    pub fn then(self) -> Then {
        Then::new(self.context)
    }
}
