//! Payloads
//!
//! A payload owns its installation sources and hands out the tasks that
//! install it. `PackagesPayload` is the package based payload: it keeps the
//! software selection, checks it against a `Resolver` and installs it through
//! a `PackageInstaller`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::PayloadConfig;
use crate::error::{PayloadError, Result};
use crate::resolver::Resolver;
use crate::selection::PackagesSelectionData;
use crate::source::Source;
use crate::source_set::PayloadSourceSet;
use crate::task::{BoxedTask, ProgressReporter, Task};
use crate::types::{PayloadType, SourceState, SourceType};
use crate::validation::{ResolvePackagesTask, SelectionResolutionTask};

/// Performs the package transaction of a resolved selection.
pub trait PackageInstaller: Send + Sync {
    /// Install the packages the resolver selected last.
    ///
    /// Returns the versions of the installed kernels.
    fn install_packages(&self, progress: &ProgressReporter) -> anyhow::Result<Vec<String>>;
}

/// Kernel versions produced by the installation, shared with the task that
/// fills them in.
#[derive(Debug, Clone, Default)]
pub struct KernelVersions {
    inner: Arc<Mutex<Option<Vec<String>>>>,
}

impl KernelVersions {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// - `UnavailableValue` until `set` was called
    pub fn get(&self) -> Result<Vec<String>> {
        self.lock()
            .clone()
            .ok_or_else(|| PayloadError::unavailable("The kernel version list is not available."))
    }

    pub fn set(&self, kernels: Vec<String>) {
        tracing::debug!("The kernel version list is set to: {:?}", kernels);
        *self.lock() = Some(kernels);
    }

    fn lock(&self) -> MutexGuard<'_, Option<Vec<String>>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// A payload of the installation
pub trait Payload: Send + Sync {
    fn payload_type(&self) -> PayloadType;

    /// The attached sources.
    fn sources(&self) -> &PayloadSourceSet;

    /// Kernel versions installed by this payload.
    fn kernel_versions(&self) -> &KernelVersions;

    /// Tasks installing the payload.
    fn install_with_tasks(&self) -> Vec<BoxedTask>;

    /// Tasks finishing the installation after the payload is installed.
    fn post_install_with_tasks(&self) -> Vec<BoxedTask> {
        Vec::new()
    }

    fn supported_source_types(&self) -> &[SourceType] {
        self.sources().supported_source_types()
    }

    /// Task setting up the attached sources.
    fn set_up_sources_with_task(&self) -> BoxedTask {
        Box::new(self.sources().set_up_sources_with_task())
    }

    /// Tasks cleaning up after the payload.
    ///
    /// Without sources there is nothing to tear down.
    fn tear_down_with_tasks(&self) -> Vec<BoxedTask> {
        let mut tasks: Vec<BoxedTask> = Vec::new();

        if !self.sources().is_empty() {
            tasks.push(Box::new(self.sources().tear_down_sources_with_task()));
        }

        tasks
    }

    /// # Errors
    ///
    /// - `UnavailableValue` before the installation produced the list
    fn get_kernel_version_list(&self) -> Result<Vec<String>> {
        self.kernel_versions().get()
    }

    fn set_kernel_version_list(&self, kernels: Vec<String>) {
        self.kernel_versions().set(kernels);
    }

    /// Are the sources usable?
    ///
    /// True when at least one source is attached and none is waiting for setup.
    fn is_ready(&self) -> bool {
        let sources = self.sources().sources();
        !sources.is_empty() && sources.iter().all(|s| s.get_state() != SourceState::Unready)
    }
}

// ============================================================================
// Packages Payload
// ============================================================================

/// The package based payload
pub struct PackagesPayload {
    resolver: Arc<dyn Resolver>,
    installer: Arc<dyn PackageInstaller>,
    config: PayloadConfig,
    sources: PayloadSourceSet,
    selection: Mutex<PackagesSelectionData>,
    tx_id: Arc<AtomicU64>,
    kernels: KernelVersions,
}

impl PackagesPayload {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        installer: Arc<dyn PackageInstaller>,
        config: PayloadConfig,
    ) -> Self {
        let sources = PayloadSourceSet::new(PayloadType::Dnf.supported_source_types());
        let tx_id = Arc::new(AtomicU64::new(0));

        // New sources invalidate any selection check done so far.
        let observed = Arc::clone(&tx_id);
        sources.subscribe(Box::new(move |_: &[Arc<Source>]| {
            observed.fetch_add(1, Ordering::SeqCst);
        }));

        Self {
            resolver,
            installer,
            config,
            sources,
            selection: Mutex::new(PackagesSelectionData::default()),
            tx_id,
            kernels: KernelVersions::new(),
        }
    }

    pub fn resolver(&self) -> Arc<dyn Resolver> {
        Arc::clone(&self.resolver)
    }

    pub fn config(&self) -> &PayloadConfig {
        &self.config
    }

    pub fn packages_selection(&self) -> PackagesSelectionData {
        self.lock_selection().clone()
    }

    pub fn set_packages_selection(&self, selection: PackagesSelectionData) {
        tracing::debug!("Packages selection set to: {:?}", selection);
        *self.lock_selection() = selection;
    }

    /// Counter of source changes. A selection checked at an older id is stale.
    pub fn tx_id(&self) -> u64 {
        self.tx_id.load(Ordering::SeqCst)
    }

    pub fn bump_tx_id(&self) -> u64 {
        self.tx_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Task checking the current software selection.
    pub fn check_selection_with_task(&self) -> SelectionResolutionTask {
        SelectionResolutionTask::new(
            Arc::clone(&self.resolver),
            self.packages_selection(),
            &self.config,
        )
    }

    fn lock_selection(&self) -> MutexGuard<'_, PackagesSelectionData> {
        self.selection.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Payload for PackagesPayload {
    fn payload_type(&self) -> PayloadType {
        PayloadType::Dnf
    }

    fn sources(&self) -> &PayloadSourceSet {
        &self.sources
    }

    fn kernel_versions(&self) -> &KernelVersions {
        &self.kernels
    }

    fn install_with_tasks(&self) -> Vec<BoxedTask> {
        let resolve: BoxedTask = Box::new(ResolvePackagesTask::new(
            Arc::clone(&self.resolver),
            self.packages_selection(),
            self.config.clone(),
        ));
        let install: BoxedTask = Box::new(InstallPackagesTask::new(
            Arc::clone(&self.installer),
            self.kernels.clone(),
        ));

        vec![resolve, install]
    }
}

/// Run the package transaction and record the installed kernels.
pub struct InstallPackagesTask {
    installer: Arc<dyn PackageInstaller>,
    kernels: KernelVersions,
}

impl InstallPackagesTask {
    pub fn new(installer: Arc<dyn PackageInstaller>, kernels: KernelVersions) -> Self {
        Self { installer, kernels }
    }
}

impl Task for InstallPackagesTask {
    type Output = ();

    fn name(&self) -> &str {
        "Install the packages"
    }

    fn run(&mut self, progress: &ProgressReporter) -> Result<()> {
        let kernels = self
            .installer
            .install_packages(progress)
            .map_err(|e| PayloadError::installation(format!("{:#}", e)))?;

        self.kernels.set(kernels);
        Ok(())
    }
}
