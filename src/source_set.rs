//! The ordered set of sources attached to a payload
//!
//! The list is replaced wholesale through `set_sources`, never patched in
//! place. Two checks guard every replacement:
//!
//! 1. Every new source must be of a type the payload supports.
//! 2. No currently attached source may be `Ready`; the caller has to tear
//!    the sources down first.
//!
//! The second check is a best-effort guard, not a lock. A setup task takes a
//! snapshot of the list when it is created; if it runs after the list was
//! replaced, it sets up the old sources.
//!
//! Observers registered with `subscribe` are called with the new list after
//! every successful replacement.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{PayloadError, Result};
use crate::source::Source;
use crate::task::{ProgressReporter, Task};
use crate::types::SourceType;

/// Callback invoked with the new source list after it changed
pub type SourcesObserver = Box<dyn Fn(&[Arc<Source>]) + Send + Sync>;

/// Sources of a single payload
pub struct PayloadSourceSet {
    supported_source_types: Vec<SourceType>,
    sources: Mutex<Vec<Arc<Source>>>,
    observers: Mutex<Vec<SourcesObserver>>,
}

impl PayloadSourceSet {
    /// Create an empty set accepting the given source types.
    pub fn new(supported_source_types: &[SourceType]) -> Self {
        Self {
            supported_source_types: supported_source_types.to_vec(),
            sources: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn supported_source_types(&self) -> &[SourceType] {
        &self.supported_source_types
    }

    /// Snapshot of the attached sources.
    pub fn sources(&self) -> Vec<Arc<Source>> {
        self.lock_sources().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_sources().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock_sources().len()
    }

    /// First attached source of the given type.
    pub fn get_source(&self, source_type: SourceType) -> Option<Arc<Source>> {
        self.lock_sources()
            .iter()
            .find(|s| s.source_type() == source_type)
            .cloned()
    }

    /// Register a callback for source list changes.
    pub fn subscribe(&self, observer: SourcesObserver) {
        self.observers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(observer);
    }

    /// Replace the attached sources.
    ///
    /// # Errors
    ///
    /// - `IncompatibleSource` if a new source has an unsupported type
    /// - `SourceSetup` if an attached source is `Ready`
    ///
    /// The list is unchanged on error.
    pub fn set_sources(&self, sources: Vec<Arc<Source>>) -> Result<()> {
        if let Some(source) = sources
            .iter()
            .find(|s| !self.supported_source_types.contains(&s.source_type()))
        {
            return Err(PayloadError::IncompatibleSource(source.source_type()));
        }

        let snapshot = {
            let mut current = self.lock_sources();

            if current.iter().any(|s| s.is_ready()) {
                return Err(PayloadError::source_setup(
                    "Can't change list of sources if there is at least one source \
                     initialized! Please tear down the sources first.",
                ));
            }

            *current = sources;
            current.clone()
        };

        tracing::debug!("New sources {:?} were added.", snapshot);
        self.notify(&snapshot);
        Ok(())
    }

    /// Append a source to the list (same checks as `set_sources`).
    pub fn add_source(&self, source: Arc<Source>) -> Result<()> {
        let mut sources = self.sources();
        sources.push(source);
        self.set_sources(sources)
    }

    /// Does any attached source require network?
    pub fn is_network_required(&self) -> bool {
        self.lock_sources().iter().any(|s| s.network_required())
    }

    /// Space in bytes the attached sources need.
    pub fn calculate_required_space(&self) -> u64 {
        self.lock_sources().iter().map(|s| s.required_space()).sum()
    }

    /// Task setting up the currently attached sources.
    pub fn set_up_sources_with_task(&self) -> SetUpSourcesTask {
        SetUpSourcesTask::new(self.sources())
    }

    /// Task tearing down the currently attached sources.
    pub fn tear_down_sources_with_task(&self) -> TearDownSourcesTask {
        TearDownSourcesTask::new(self.sources())
    }

    fn notify(&self, sources: &[Arc<Source>]) {
        let observers = self.observers.lock().unwrap_or_else(|p| p.into_inner());
        for observer in observers.iter() {
            observer(sources);
        }
    }

    fn lock_sources(&self) -> MutexGuard<'_, Vec<Arc<Source>>> {
        self.sources.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// ============================================================================
// Source Tasks
// ============================================================================

/// Set up a list of sources in order.
///
/// Sources that are already `Ready` are skipped. The first failure aborts the
/// task; sources set up before it stay `Ready` for the teardown to clean up.
pub struct SetUpSourcesTask {
    sources: Vec<Arc<Source>>,
}

impl SetUpSourcesTask {
    pub fn new(sources: Vec<Arc<Source>>) -> Self {
        Self { sources }
    }
}

impl Task for SetUpSourcesTask {
    type Output = ();

    fn name(&self) -> &str {
        "Set up installation sources"
    }

    fn run(&mut self, progress: &ProgressReporter) -> Result<()> {
        for (step, source) in self.sources.iter().enumerate() {
            progress.report(step as u32 + 1, format!("Setting up the source {}", source));

            if source.is_ready() {
                tracing::debug!("Skipping the source {}, it is already set up.", source);
                continue;
            }

            source.set_up()?;
        }

        Ok(())
    }
}

/// Tear down a list of sources.
///
/// Every source gets torn down even if an earlier one fails; the failures
/// are reported together at the end.
pub struct TearDownSourcesTask {
    sources: Vec<Arc<Source>>,
}

impl TearDownSourcesTask {
    pub fn new(sources: Vec<Arc<Source>>) -> Self {
        Self { sources }
    }
}

impl Task for TearDownSourcesTask {
    type Output = ();

    fn name(&self) -> &str {
        "Tear down installation sources"
    }

    fn run(&mut self, progress: &ProgressReporter) -> Result<()> {
        let mut errors = Vec::new();

        for (step, source) in self.sources.iter().enumerate() {
            progress.report(step as u32 + 1, format!("Tearing down the source {}", source));

            if let Err(e) = source.tear_down() {
                tracing::error!("{}", e);
                errors.push(e.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PayloadError::source_tear_down(errors.join("\n")))
        }
    }
}
