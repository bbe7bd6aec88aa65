//! Anaconda Payloads Library
//!
//! Software selection resolution and installation source lifecycle of an
//! operating system installer payload.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metadata;
pub mod payload;
pub mod resolver;
pub mod selection;
pub mod software;
pub mod source;
pub mod source_set;
pub mod task;
pub mod types;
pub mod validation;

// Re-export main types for convenience
pub use cache::SelectionCache;
pub use config::PayloadConfig;
pub use error::{PayloadError, Result};
pub use lifecycle::{LifecycleStage, LifecycleTransitionError, PayloadLifecycle};
pub use metadata::{GroupRecord, MetadataResolver, ModuleRecord, PackageRecord, RepositoryMetadata};
pub use payload::{InstallPackagesTask, KernelVersions, PackageInstaller, PackagesPayload, Payload};
pub use resolver::{EnvironmentData, GroupData, Resolver, ResolverError};
pub use selection::{
    PackagesSelectionData, ValidationReport, get_installation_specs, get_kernel_package,
};
pub use software::{
    CHECK_SOFTWARE_TASK, SoftwareSelectionController, SoftwareStatus,
    get_software_selection_status, is_software_selection_complete,
};
pub use source::{NoopBackend, Source, SourceBackend};
pub use source_set::{PayloadSourceSet, SetUpSourcesTask, SourcesObserver, TearDownSourcesTask};
pub use task::{
    BoxedTask, ProgressReporter, ProgressUpdate, Task, TaskHandle, TaskRegistry, TaskRunner,
};
pub use types::{GroupPackageType, PayloadType, SourceState, SourceType};
pub use validation::{ResolvePackagesTask, SelectionResolutionTask};
