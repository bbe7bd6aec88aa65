//! Software selection front-end logic
//!
//! Status and completeness rules of a software selection, and the controller
//! a front end drives: it edits the selection through a `SelectionCache`,
//! applies it to the payload and checks it on a background task.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use strum::{Display, EnumIter};

use crate::cache::SelectionCache;
use crate::error::Result;
use crate::payload::{PackagesPayload, Payload};
use crate::resolver::Resolver;
use crate::selection::PackagesSelectionData;
use crate::task::{ProgressReporter, Task, TaskHandle, TaskRegistry, TaskRunner};

/// Registry name of the background selection check.
pub const CHECK_SOFTWARE_TASK: &str = "check-software-selection";

/// Fixed status messages of the software selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum SoftwareStatus {
    #[strum(serialize = "Processing...")]
    Processing,
    #[strum(serialize = "Installation source not set up")]
    SourceNotSet,
    #[strum(serialize = "Source changed - please verify")]
    SourceChanged,
    #[strum(serialize = "Error checking software selection")]
    CheckErrors,
    #[strum(serialize = "Warning checking software selection")]
    CheckWarnings,
    #[strum(serialize = "Custom software selected")]
    CustomSoftware,
    #[strum(serialize = "Invalid environment specified in kickstart")]
    InvalidKickstartEnvironment,
    #[strum(serialize = "Please confirm software selection")]
    ConfirmSelection,
    #[strum(serialize = "Selected environment is not valid")]
    InvalidEnvironment,
}

/// Is the software selection complete?
///
/// An automated installation doesn't need an environment; otherwise the
/// environment has to be valid.
pub fn is_software_selection_complete(
    resolver: &dyn Resolver,
    selection: &PackagesSelectionData,
    kickstarted: bool,
) -> bool {
    if kickstarted && selection.environment.is_empty() {
        return true;
    }

    resolver.is_environment_valid(&selection.environment)
}

/// Status line of the software selection.
///
/// The name of the selected environment once it is valid.
pub fn get_software_selection_status(
    resolver: &dyn Resolver,
    selection: &PackagesSelectionData,
    kickstarted: bool,
) -> String {
    let environment = &selection.environment;

    if kickstarted {
        if environment.is_empty() {
            return SoftwareStatus::CustomSoftware.to_string();
        }
        if !resolver.is_environment_valid(environment) {
            return SoftwareStatus::InvalidKickstartEnvironment.to_string();
        }
    } else {
        if environment.is_empty() {
            return SoftwareStatus::ConfirmSelection.to_string();
        }
        // A valid environment stops being valid when the source changes.
        if !resolver.is_environment_valid(environment) {
            return SoftwareStatus::InvalidEnvironment.to_string();
        }
    }

    resolver
        .get_environment_data(environment)
        .map(|data| data.name)
        .unwrap_or_else(|| environment.clone())
}

// ============================================================================
// Controller
// ============================================================================

/// Result of the last selection check
#[derive(Debug, Clone, Default)]
struct CheckOutcome {
    errors: Vec<String>,
    warnings: Vec<String>,
    /// Payload tx id the check ran at
    tx_id: Option<u64>,
}

/// Background check of the payload selection
struct CheckSoftwareTask {
    payload: Arc<PackagesPayload>,
    outcome: Arc<Mutex<CheckOutcome>>,
}

impl Task for CheckSoftwareTask {
    type Output = ();

    fn name(&self) -> &str {
        CHECK_SOFTWARE_TASK
    }

    fn run(&mut self, progress: &ProgressReporter) -> Result<()> {
        progress.report(1, "Checking software dependencies...");
        // The check covers the sources as of now. A change made while it
        // runs bumps the id again and leaves the result stale.
        let tx_id = self.payload.bump_tx_id();

        let mut check = self.payload.check_selection_with_task();
        let report = check.run(progress)?;
        tracing::debug!("The selection has been checked: {}", report);

        let mut outcome = lock(&self.outcome);
        outcome.errors = report.error_messages;
        outcome.warnings = report.warning_messages;
        outcome.tx_id = Some(tx_id);
        Ok(())
    }
}

fn lock(outcome: &Mutex<CheckOutcome>) -> MutexGuard<'_, CheckOutcome> {
    outcome.lock().unwrap_or_else(|p| p.into_inner())
}

/// Drives the software selection of a packages payload.
pub struct SoftwareSelectionController {
    payload: Arc<PackagesPayload>,
    registry: TaskRegistry,
    runner: TaskRunner,
    cache: SelectionCache,
    kickstarted: bool,
    outcome: Arc<Mutex<CheckOutcome>>,
}

impl SoftwareSelectionController {
    pub fn new(payload: Arc<PackagesPayload>, registry: TaskRegistry) -> Self {
        let cache = SelectionCache::new(payload.resolver());

        Self {
            payload,
            registry,
            runner: TaskRunner::new(),
            cache,
            kickstarted: false,
            outcome: Arc::new(Mutex::new(CheckOutcome::default())),
        }
    }

    /// Forward the progress of background checks through `runner`.
    pub fn with_runner(mut self, runner: TaskRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Mark the payload selection as coming from a kickstart file.
    pub fn with_kickstarted(mut self, kickstarted: bool) -> Self {
        self.kickstarted = kickstarted;
        self
    }

    pub fn kickstarted(&self) -> bool {
        self.kickstarted
    }

    pub fn cache(&self) -> &SelectionCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut SelectionCache {
        &mut self.cache
    }

    /// Pick the initial selection and check it.
    ///
    /// Skipped while the sources aren't ready. Without a kickstarted
    /// selection the default environment is applied first.
    pub fn initialize(&mut self) -> Result<()> {
        if !self.payload.is_ready() {
            tracing::debug!("Skip the initialization of the software selection.");
            return Ok(());
        }

        if !self.kickstarted {
            let default_environment = self.payload.resolver().default_environment();
            self.cache
                .select_environment(default_environment.as_deref().unwrap_or_default())?;
            self.apply();
        }

        self.execute()?;
        self.wait(None);
        Ok(())
    }

    /// Reload the cache from the payload selection.
    pub fn refresh(&mut self) {
        self.cache = SelectionCache::new(self.payload.resolver());
        self.cache
            .apply_selection_data(&self.payload.packages_selection());
    }

    /// Store the cache in the payload. The selection is no longer the
    /// kickstarted one.
    pub fn apply(&mut self) {
        self.kickstarted = false;

        let selection = self.cache.get_selection_data();
        tracing::debug!("Setting new software selection: {:?}", selection);
        self.payload.set_packages_selection(selection);
    }

    /// Start checking the payload selection in the background.
    ///
    /// # Errors
    ///
    /// - `TaskAlreadyRunning` if a check is in flight
    pub fn execute(&self) -> Result<TaskHandle<()>> {
        let task = CheckSoftwareTask {
            payload: Arc::clone(&self.payload),
            outcome: Arc::clone(&self.outcome),
        };
        self.registry.spawn(task, self.runner.clone())
    }

    /// Wait for a running check. Returns false on timeout; the check keeps
    /// running.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.registry.wait(CHECK_SOFTWARE_TASK, timeout)
    }

    pub fn is_processing(&self) -> bool {
        self.registry.is_running(CHECK_SOFTWARE_TASK)
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.outcome).errors.clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        lock(&self.outcome).warnings.clone()
    }

    /// Did the sources change since the last check?
    pub fn source_has_changed(&self) -> bool {
        lock(&self.outcome).tx_id != Some(self.payload.tx_id())
    }

    pub fn ready(&self) -> bool {
        !self.is_processing() && self.payload.is_ready()
    }

    pub fn status(&self) -> String {
        if self.is_processing() {
            return SoftwareStatus::Processing.to_string();
        }
        if !self.payload.is_ready() {
            return SoftwareStatus::SourceNotSet.to_string();
        }
        if self.source_has_changed() {
            return SoftwareStatus::SourceChanged.to_string();
        }
        if !self.errors().is_empty() {
            return SoftwareStatus::CheckErrors.to_string();
        }
        if !self.warnings().is_empty() {
            return SoftwareStatus::CheckWarnings.to_string();
        }

        get_software_selection_status(
            self.payload.resolver().as_ref(),
            &self.payload.packages_selection(),
            self.kickstarted,
        )
    }

    pub fn completed(&self) -> bool {
        self.ready()
            && self.errors().is_empty()
            && !self.source_has_changed()
            && is_software_selection_complete(
                self.payload.resolver().as_ref(),
                &self.payload.packages_selection(),
                self.kickstarted,
            )
    }
}
