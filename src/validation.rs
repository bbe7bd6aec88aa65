//! Software selection resolution
//!
//! Both tasks here drive the same pipeline against a `Resolver`:
//!
//! 1. clear the previous selection,
//! 2. expand the selection into include/exclude specs,
//! 3. add the kernel package on hardware targets,
//! 4. disable modules, enable modules, apply specs, resolve.
//!
//! Each step of (4) runs even if an earlier one failed. Missing specs end up
//! as warnings, broken specs and invalid selections as errors. Any other
//! resolver failure aborts the run.
//!
//! `SelectionResolutionTask` hands the report back to the caller.
//! `ResolvePackagesTask` is the install-time variant and turns a bad report
//! into a `PayloadInstallation` error.

use std::sync::Arc;

use crate::config::PayloadConfig;
use crate::error::{PayloadError, Result};
use crate::resolver::{Resolver, ResolverError};
use crate::selection::{
    PackagesSelectionData, ValidationReport, get_installation_specs, get_kernel_package,
};
use crate::task::{ProgressReporter, Task};

/// What to do with broken specs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrokenSpecs {
    Report,
    Ignore,
}

/// One resolution run: the collected specs and the resolver calls.
struct Resolution<'a> {
    resolver: &'a dyn Resolver,
    selection: &'a PackagesSelectionData,
    kernel_package: Option<&'a str>,
    broken_specs: BrokenSpecs,
    include_list: Vec<String>,
    exclude_list: Vec<String>,
}

impl<'a> Resolution<'a> {
    fn new(
        resolver: &'a dyn Resolver,
        selection: &'a PackagesSelectionData,
        kernel_package: Option<&'a str>,
        broken_specs: BrokenSpecs,
    ) -> Self {
        Self {
            resolver,
            selection,
            kernel_package,
            broken_specs,
            include_list: Vec::new(),
            exclude_list: Vec::new(),
        }
    }

    fn run(mut self, progress: &ProgressReporter) -> Result<ValidationReport> {
        progress.report(1, "Clearing the previous selection");
        self.resolver.clear_selection();

        progress.report(2, "Collecting the software specs");
        self.collect_selected_specs();
        self.collect_required_specs();

        progress.report(3, "Resolving the software selection");
        self.resolve_selection()
    }

    fn collect_selected_specs(&mut self) {
        tracing::debug!("Collecting selected specs.");
        let default_environment = self.resolver.default_environment();

        let (include_list, exclude_list) =
            get_installation_specs(self.selection, default_environment.as_deref());

        self.include_list.extend(include_list);
        self.exclude_list.extend(exclude_list);
    }

    fn collect_required_specs(&mut self) {
        tracing::debug!("Collecting required specs.");

        let Some(kernel_package) = self.kernel_package else {
            tracing::info!("Not installing onto hardware, skipping the kernel package.");
            return;
        };

        if let Some(kernel) = get_kernel_package(kernel_package, &self.exclude_list) {
            self.include_list.push(kernel);
        }
    }

    fn resolve_selection(&self) -> Result<ValidationReport> {
        tracing::debug!("Resolving the software selection.");
        let mut report = ValidationReport::new();

        let result = self.resolver.disable_modules(&self.selection.disabled_modules);
        self.report_error(&mut report, result)?;

        let result = self.resolver.enable_modules(&self.selection.modules);
        self.report_error(&mut report, result)?;

        let result = self.resolver.apply_specs(&self.include_list, &self.exclude_list);
        self.report_error(&mut report, result)?;

        let result = self.resolver.resolve_selection();
        self.report_error(&mut report, result)?;

        tracing::debug!("Resolving has been completed: {}", report);
        Ok(report)
    }

    /// Add a failed step to the report. Failures the report can't carry are
    /// returned.
    fn report_error(
        &self,
        report: &mut ValidationReport,
        result: std::result::Result<(), ResolverError>,
    ) -> Result<()> {
        match result {
            Ok(()) => {}
            Err(ResolverError::MissingSpecs(msg)) => report.warning_messages.push(msg),
            Err(ResolverError::BrokenSpecs(msg)) if self.broken_specs == BrokenSpecs::Ignore => {
                tracing::warn!("Ignoring broken specs: {}", msg);
            }
            Err(ResolverError::BrokenSpecs(msg)) => report.error_messages.push(msg),
            Err(ResolverError::InvalidSelection(msg)) => report.error_messages.push(msg),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Validation task to check the software selection
pub struct SelectionResolutionTask {
    resolver: Arc<dyn Resolver>,
    selection: PackagesSelectionData,
    kernel_package: Option<String>,
}

impl SelectionResolutionTask {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        selection: PackagesSelectionData,
        config: &PayloadConfig,
    ) -> Self {
        Self {
            resolver,
            selection,
            kernel_package: config.kernel_spec().map(str::to_string),
        }
    }
}

impl Task for SelectionResolutionTask {
    type Output = ValidationReport;

    fn name(&self) -> &str {
        "Check the software selection"
    }

    fn run(&mut self, progress: &ProgressReporter) -> Result<ValidationReport> {
        Resolution::new(
            self.resolver.as_ref(),
            &self.selection,
            self.kernel_package.as_deref(),
            BrokenSpecs::Report,
        )
        .run(progress)
    }
}

/// Resolve the packages before they are installed
pub struct ResolvePackagesTask {
    resolver: Arc<dyn Resolver>,
    selection: PackagesSelectionData,
    config: PayloadConfig,
}

impl ResolvePackagesTask {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        selection: PackagesSelectionData,
        config: PayloadConfig,
    ) -> Self {
        Self {
            resolver,
            selection,
            config,
        }
    }
}

impl Task for ResolvePackagesTask {
    type Output = ();

    fn name(&self) -> &str {
        "Resolve packages"
    }

    /// # Errors
    ///
    /// - `PayloadInstallation` if the report has errors
    /// - `PayloadInstallation` if the report has warnings and missing
    ///   packages are not ignored
    fn run(&mut self, progress: &ProgressReporter) -> Result<()> {
        let broken_specs = if self.config.ignore_broken_packages() {
            BrokenSpecs::Ignore
        } else {
            BrokenSpecs::Report
        };

        let report = Resolution::new(
            self.resolver.as_ref(),
            &self.selection,
            self.config.kernel_spec(),
            broken_specs,
        )
        .run(progress)?;

        if !report.error_messages.is_empty() {
            return Err(PayloadError::installation(report.error_messages.join("\n\n")));
        }

        if !report.warning_messages.is_empty() {
            let message = report.warning_messages.join("\n\n");

            if !self.config.missing_ignored {
                return Err(PayloadError::installation(message));
            }

            tracing::warn!("Ignoring missing packages: {}", message);
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
