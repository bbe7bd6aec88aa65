//! Payload lifecycle
//!
//! Drives a payload through its task batches and keeps track of how far it
//! got. Stages can't be skipped or repeated:
//!
//! ```text
//! NotStarted ──set_up_sources──► SourcesReady ──install──► Installed
//!     ▲                                                       │
//!     │                                                  post_install
//!     │                                                       ▼
//! TornDown ◄─────────────tear_down (from any stage)──── PostInstalled
//!
//! (a failing batch moves any stage to Failed)
//! ```
//!
//! Sources can be set up again after a teardown. From `Failed` only a
//! teardown is possible.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{PayloadError, Result};
use crate::payload::Payload;
use crate::task::{BoxedTask, TaskRunner};

/// Lifecycle stages in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleStage {
    NotStarted = 0,
    SourcesReady = 1,
    Installed = 2,
    PostInstalled = 3,
    TornDown = 4,
    /// A batch failed; see `PayloadLifecycle::failed_at`
    Failed = 255,
}

impl LifecycleStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns the stage a successful forward batch leads to.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted | Self::TornDown => Some(Self::SourcesReady),
            Self::SourcesReady => Some(Self::Installed),
            Self::Installed => Some(Self::PostInstalled),
            Self::PostInstalled | Self::Failed => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::SourcesReady => "Sources set up",
            Self::Installed => "Payload installed",
            Self::PostInstalled => "Post-installation done",
            Self::TornDown => "Torn down",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during stage transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleTransitionError {
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition {
        from: LifecycleStage,
        to: LifecycleStage,
    },

    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: LifecycleStage },

    #[error("The payload has failed, only a tear down is possible")]
    FromFailedState,
}

impl From<LifecycleTransitionError> for PayloadError {
    fn from(e: LifecycleTransitionError) -> Self {
        PayloadError::lifecycle(e.to_string())
    }
}

/// Coordinates the task batches of one payload.
pub struct PayloadLifecycle {
    payload: Arc<dyn Payload>,
    runner: TaskRunner,
    current: LifecycleStage,
    failed_at: Option<LifecycleStage>,
    history: Vec<LifecycleStage>,
}

impl PayloadLifecycle {
    pub fn new(payload: Arc<dyn Payload>) -> Self {
        Self::with_runner(payload, TaskRunner::new())
    }

    pub fn with_runner(payload: Arc<dyn Payload>, runner: TaskRunner) -> Self {
        Self {
            payload,
            runner,
            current: LifecycleStage::NotStarted,
            failed_at: None,
            history: vec![LifecycleStage::NotStarted],
        }
    }

    pub fn payload(&self) -> &Arc<dyn Payload> {
        &self.payload
    }

    pub fn current_stage(&self) -> LifecycleStage {
        self.current
    }

    /// The stage a failed batch was heading for.
    pub fn failed_at(&self) -> Option<LifecycleStage> {
        self.failed_at
    }

    pub fn stage_history(&self) -> &[LifecycleStage] {
        &self.history
    }

    /// Set up the payload sources.
    pub fn set_up_sources(&mut self) -> Result<()> {
        let tasks = vec![self.payload.set_up_sources_with_task()];
        self.run_batch(LifecycleStage::SourcesReady, tasks)
    }

    /// Install the payload.
    pub fn install(&mut self) -> Result<()> {
        let tasks = self.payload.install_with_tasks();
        self.run_batch(LifecycleStage::Installed, tasks)
    }

    /// Run the post-installation tasks of the payload.
    pub fn post_install(&mut self) -> Result<()> {
        let tasks = self.payload.post_install_with_tasks();
        self.run_batch(LifecycleStage::PostInstalled, tasks)
    }

    /// Tear down the payload. Possible from any stage.
    ///
    /// The stage is `TornDown` afterwards even if some teardown failed; the
    /// sources don't count as set up anymore either way.
    pub fn tear_down(&mut self) -> Result<()> {
        let tasks = self.payload.tear_down_with_tasks();
        tracing::info!("Tearing down the payload ({} tasks).", tasks.len());

        let result = self.runner.run_all(tasks);
        self.enter(LifecycleStage::TornDown);
        result
    }

    /// # Errors
    ///
    /// - `UnavailableValue` before the payload was installed
    pub fn kernel_version_list(&self) -> Result<Vec<String>> {
        self.payload.get_kernel_version_list()
    }

    pub fn required_space(&self) -> u64 {
        self.payload.sources().calculate_required_space()
    }

    pub fn is_network_required(&self) -> bool {
        self.payload.sources().is_network_required()
    }

    fn check_transition(
        &self,
        target: LifecycleStage,
    ) -> std::result::Result<(), LifecycleTransitionError> {
        if self.current == LifecycleStage::Failed {
            return Err(LifecycleTransitionError::FromFailedState);
        }

        if self.current == target {
            return Err(LifecycleTransitionError::AlreadyAtStage { stage: target });
        }

        if self.current.next() != Some(target) {
            return Err(LifecycleTransitionError::InvalidTransition {
                from: self.current,
                to: target,
            });
        }

        Ok(())
    }

    fn run_batch(&mut self, target: LifecycleStage, tasks: Vec<BoxedTask>) -> Result<()> {
        self.check_transition(target)?;
        tracing::info!("Running {} tasks towards '{}'.", tasks.len(), target);

        if let Err(e) = self.runner.run_all(tasks) {
            tracing::error!("Payload failed on the way to '{}': {}", target, e);
            self.failed_at = Some(target);
            self.enter(LifecycleStage::Failed);
            return Err(e);
        }

        self.enter(target);
        Ok(())
    }

    fn enter(&mut self, stage: LifecycleStage) {
        tracing::debug!("Payload stage: {} -> {}", self.current, stage);
        self.current = stage;
        self.history.push(stage);
    }
}
