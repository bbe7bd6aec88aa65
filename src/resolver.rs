//! Package metadata and dependency resolver boundary
//!
//! The payload never resolves dependencies itself. Everything it needs from
//! the package manager goes through the `Resolver` trait: comps metadata
//! queries (environments and groups) and the four fallible steps of a
//! resolution run (disable modules, enable modules, apply specs, resolve).
//!
//! The fallible steps report one of three domain failures that the
//! resolution task turns into validation messages. Anything else is
//! `ResolverError::Other` and is never downgraded.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single resolver step
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Some specs are not available in the enabled repositories
    #[error("{0}")]
    MissingSpecs(String),

    /// Some specs are broken or conflict with each other
    #[error("{0}")]
    BrokenSpecs(String),

    /// The selection as a whole can't be satisfied
    #[error("{0}")]
    InvalidSelection(String),

    /// Not a selection problem (corrupted metadata, backend crash, ...)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResolverError {
    /// Create an unclassified resolver error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(anyhow::anyhow!(msg.into()))
    }

    /// Is this one of the failures a validation report can carry?
    pub fn is_reportable(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// Metadata of a comps environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentData {
    pub id: String,
    pub name: String,
    pub description: String,
    pub default_groups: Vec<String>,
    pub optional_groups: Vec<String>,
    pub visible_groups: Vec<String>,
}

impl EnvironmentData {
    /// Groups that can be selected within this environment.
    ///
    /// Sorted union of the default, optional and user visible groups.
    pub fn get_available_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self
            .optional_groups
            .iter()
            .chain(&self.default_groups)
            .chain(&self.visible_groups)
            .cloned()
            .collect();
        groups.sort();
        groups.dedup();
        groups
    }
}

/// Metadata of a comps group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupData {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// The package manager as seen by the payload.
///
/// Implementations are shared between the foreground controller and
/// background resolution tasks, so every method takes `&self` and the
/// implementation owns whatever locking it needs.
pub trait Resolver: Send + Sync {
    /// Drop everything a previous resolution run left behind.
    fn clear_selection(&self);

    /// The environment the repositories mark as default, if any.
    fn default_environment(&self) -> Option<String>;

    /// Ids of all environments known to the repositories.
    fn environments(&self) -> Vec<String>;

    /// Is the id a known environment?
    fn is_environment_valid(&self, environment: &str) -> bool;

    /// Can the given id, name or alias be resolved to an environment?
    fn resolve_environment(&self, environment: &str) -> bool;

    /// Can the given id, name or alias be resolved to a group?
    fn resolve_group(&self, group: &str) -> bool;

    fn get_environment_data(&self, environment: &str) -> Option<EnvironmentData>;

    fn get_group_data(&self, group: &str) -> Option<GroupData>;

    fn disable_modules(&self, modules: &[String]) -> Result<(), ResolverError>;

    fn enable_modules(&self, modules: &[String]) -> Result<(), ResolverError>;

    /// Mark the include specs for installation and the exclude specs as excluded.
    fn apply_specs(&self, include: &[String], exclude: &[String]) -> Result<(), ResolverError>;

    /// Resolve the dependencies of everything applied so far.
    fn resolve_selection(&self) -> Result<(), ResolverError>;
}
