//! JSON metadata resolver
//!
//! A `Resolver` over repository metadata stored as a single JSON document.
//! It knows environments, groups, packages and modules, and checks a
//! selection for existence, broken packages, unmet requirements and
//! conflicts. It doesn't pick versions or providers.
//!
//! # Document Layout
//!
//! ```json
//! {
//!   "default_environment": "minimal",
//!   "environments": [{"id": "minimal", "name": "Minimal Install", "default_groups": ["core"]}],
//!   "groups": [{"id": "core", "name": "Core", "mandatory_packages": ["bash"]}],
//!   "packages": [{"name": "bash", "requires": ["glibc"]}, {"name": "glibc"}],
//!   "modules": [{"name": "nodejs", "streams": ["18", "20"]}]
//! }
//! ```
//!
//! # Resolution Rules
//!
//! | Step | Fails with |
//! |------|------------|
//! | `enable_modules` | unknown module/stream: `MissingSpecs`; module disabled in the same selection: `BrokenSpecs` |
//! | `disable_modules` | unknown module: `MissingSpecs` |
//! | `apply_specs` | broken package or unknown group member: `BrokenSpecs`; unknown spec: `MissingSpecs` |
//! | `resolve_selection` | unmet requirement or conflict: `InvalidSelection` |
//!
//! Specs found in the metadata are applied even if others are missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::resolver::{EnvironmentData, GroupData, Resolver, ResolverError};
use crate::types::GroupPackageType;

// ============================================================================
// Metadata Records
// ============================================================================

/// A comps group with its package lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub mandatory_packages: Vec<String>,
    pub default_packages: Vec<String>,
    pub optional_packages: Vec<String>,
    pub conditional_packages: Vec<String>,
}

impl GroupRecord {
    /// Packages installed for the given package types.
    ///
    /// No types means the comps default: mandatory and default packages.
    pub fn packages(&self, types: &[GroupPackageType]) -> Vec<&str> {
        let types = if types.is_empty() {
            &[GroupPackageType::Mandatory, GroupPackageType::Default][..]
        } else {
            types
        };

        types
            .iter()
            .flat_map(|t| match t {
                GroupPackageType::Mandatory => &self.mandatory_packages,
                GroupPackageType::Default => &self.default_packages,
                GroupPackageType::Optional => &self.optional_packages,
                GroupPackageType::Conditional => &self.conditional_packages,
            })
            .map(String::as_str)
            .collect()
    }

    fn to_group_data(&self) -> GroupData {
        GroupData {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// A package with its relations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageRecord {
    pub name: String,
    pub requires: Vec<String>,
    pub conflicts: Vec<String>,
    /// Package is known to be uninstallable
    pub broken: bool,
}

/// A module with its streams
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleRecord {
    pub name: String,
    pub streams: Vec<String>,
}

/// Repository metadata document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryMetadata {
    pub default_environment: Option<String>,
    pub environments: Vec<EnvironmentData>,
    pub groups: Vec<GroupRecord>,
    pub packages: Vec<PackageRecord>,
    pub modules: Vec<ModuleRecord>,
}

impl RepositoryMetadata {
    /// Load metadata from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).with_context(|| {
            format!("Failed to read repository metadata from {:?}", path.as_ref())
        })?;

        serde_json::from_str(&content).context("Failed to parse repository metadata JSON")
    }

    fn environment(&self, pattern: &str) -> Option<&EnvironmentData> {
        self.environments
            .iter()
            .find(|e| e.id == pattern || e.name == pattern)
    }

    fn group(&self, pattern: &str) -> Option<&GroupRecord> {
        self.groups
            .iter()
            .find(|g| g.id == pattern || g.name == pattern)
    }

    fn package(&self, name: &str) -> Option<&PackageRecord> {
        self.packages.iter().find(|p| p.name == name)
    }

    fn module(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.iter().find(|m| m.name == name)
    }
}

// ============================================================================
// Module Specs
// ============================================================================

/// `name[:stream][/profile]`
#[derive(Debug, Clone, PartialEq, Eq)]
struct ModuleSpec<'a> {
    name: &'a str,
    stream: Option<&'a str>,
}

impl<'a> ModuleSpec<'a> {
    fn parse(spec: &'a str) -> Self {
        let without_profile = spec.split('/').next().unwrap_or(spec);

        match without_profile.split_once(':') {
            Some((name, stream)) if !stream.is_empty() => Self {
                name,
                stream: Some(stream),
            },
            Some((name, _)) => Self { name, stream: None },
            None => Self {
                name: without_profile,
                stream: None,
            },
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Debug, Default)]
struct SelectionState {
    disabled_modules: BTreeSet<String>,
    /// module name -> stream
    enabled_modules: BTreeMap<String, Option<String>>,
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
    resolved: Vec<String>,
}

/// Resolver backed by a `RepositoryMetadata` document
#[derive(Debug)]
pub struct MetadataResolver {
    metadata: RepositoryMetadata,
    state: Mutex<SelectionState>,
}

impl MetadataResolver {
    pub fn new(metadata: RepositoryMetadata) -> Self {
        Self {
            metadata,
            state: Mutex::new(SelectionState::default()),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(RepositoryMetadata::load_from_file(path)?))
    }

    pub fn metadata(&self) -> &RepositoryMetadata {
        &self.metadata
    }

    /// Packages of the last successful `resolve_selection`, sorted.
    pub fn resolved_packages(&self) -> Vec<String> {
        self.lock().resolved.clone()
    }

    /// Enabled module streams as `name:stream`, sorted.
    pub fn enabled_modules(&self) -> Vec<String> {
        self.lock()
            .enabled_modules
            .iter()
            .map(|(name, stream)| match stream {
                Some(stream) => format!("{}:{}", name, stream),
                None => name.clone(),
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, SelectionState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Expand one spec into package names.
    fn expand_spec(&self, spec: &str) -> std::result::Result<Vec<String>, SpecProblem> {
        let Some(group_spec) = spec.strip_prefix('@') else {
            return match self.metadata.package(spec) {
                Some(package) if package.broken => Err(SpecProblem::Broken(spec.to_string())),
                Some(_) => Ok(vec![spec.to_string()]),
                None => Err(SpecProblem::Missing(spec.to_string())),
            };
        };

        let (id, types) = match group_spec.split_once('/') {
            Some((id, types)) => (id, parse_package_types(types)),
            None => (group_spec, Vec::new()),
        };

        if let Some(environment) = self.metadata.environment(id) {
            let mut packages = Vec::new();
            for group in &environment.default_groups {
                packages.extend(self.expand_group(group, &[])?);
            }
            return Ok(packages);
        }

        self.expand_group(id, &types)
    }

    fn expand_group(
        &self,
        id: &str,
        types: &[GroupPackageType],
    ) -> std::result::Result<Vec<String>, SpecProblem> {
        let group = self
            .metadata
            .group(id)
            .ok_or_else(|| SpecProblem::Missing(format!("@{}", id)))?;

        let mut packages = Vec::new();
        for name in group.packages(types) {
            match self.metadata.package(name) {
                Some(package) if !package.broken => packages.push(name.to_string()),
                _ => return Err(SpecProblem::Broken(format!("@{}", group.id))),
            }
        }
        Ok(packages)
    }
}

enum SpecProblem {
    Missing(String),
    Broken(String),
}

fn parse_package_types(types: &str) -> Vec<GroupPackageType> {
    types
        .split(',')
        .filter_map(|t| t.trim().parse().ok())
        .collect()
}

impl Resolver for MetadataResolver {
    fn clear_selection(&self) {
        tracing::debug!("Clearing the resolver selection.");
        *self.lock() = SelectionState::default();
    }

    fn default_environment(&self) -> Option<String> {
        self.metadata
            .default_environment
            .clone()
            .or_else(|| self.metadata.environments.first().map(|e| e.id.clone()))
    }

    fn environments(&self) -> Vec<String> {
        self.metadata.environments.iter().map(|e| e.id.clone()).collect()
    }

    fn is_environment_valid(&self, environment: &str) -> bool {
        self.metadata.environment(environment).is_some()
    }

    fn resolve_environment(&self, environment: &str) -> bool {
        self.metadata.environment(environment).is_some()
    }

    fn resolve_group(&self, group: &str) -> bool {
        self.metadata.group(group).is_some()
    }

    fn get_environment_data(&self, environment: &str) -> Option<EnvironmentData> {
        self.metadata.environment(environment).cloned()
    }

    fn get_group_data(&self, group: &str) -> Option<GroupData> {
        self.metadata.group(group).map(GroupRecord::to_group_data)
    }

    fn disable_modules(&self, modules: &[String]) -> std::result::Result<(), ResolverError> {
        let mut state = self.lock();
        let mut missing = Vec::new();

        for spec in modules {
            let parsed = ModuleSpec::parse(spec);
            if self.metadata.module(parsed.name).is_none() {
                missing.push(spec.as_str());
                continue;
            }
            state.disabled_modules.insert(parsed.name.to_string());
        }

        if !missing.is_empty() {
            return Err(ResolverError::MissingSpecs(format!(
                "No match for modules to disable: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    fn enable_modules(&self, modules: &[String]) -> std::result::Result<(), ResolverError> {
        let mut state = self.lock();
        let mut missing = Vec::new();
        let mut broken = Vec::new();

        for spec in modules {
            let parsed = ModuleSpec::parse(spec);

            let Some(module) = self.metadata.module(parsed.name) else {
                missing.push(spec.as_str());
                continue;
            };

            if let Some(stream) = parsed.stream {
                if !module.streams.iter().any(|s| s == stream) {
                    missing.push(spec.as_str());
                    continue;
                }
            }

            if state.disabled_modules.contains(parsed.name) {
                broken.push(spec.as_str());
                continue;
            }

            state
                .enabled_modules
                .insert(parsed.name.to_string(), parsed.stream.map(str::to_string));
        }

        if !broken.is_empty() {
            return Err(ResolverError::BrokenSpecs(format!(
                "Modular dependency problems: disabled modules can't be enabled: {}",
                broken.join(", ")
            )));
        }

        if !missing.is_empty() {
            return Err(ResolverError::MissingSpecs(format!(
                "No match for modules to enable: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    fn apply_specs(
        &self,
        include: &[String],
        exclude: &[String],
    ) -> std::result::Result<(), ResolverError> {
        tracing::debug!("Applying specs: include={:?} exclude={:?}", include, exclude);
        let mut state = self.lock();
        let mut missing = Vec::new();
        let mut broken = Vec::new();

        // Excluded specs that aren't known have nothing to exclude.
        for spec in exclude {
            if let Ok(packages) = self.expand_spec(spec) {
                state.exclude.extend(packages);
            }
        }

        for spec in include {
            match self.expand_spec(spec) {
                Ok(packages) => state.include.extend(packages),
                Err(SpecProblem::Missing(spec)) => missing.push(spec),
                Err(SpecProblem::Broken(spec)) => broken.push(spec),
            }
        }

        if !broken.is_empty() {
            return Err(ResolverError::BrokenSpecs(format!(
                "Some packages, groups or modules are broken: {}",
                broken.join(", ")
            )));
        }

        if !missing.is_empty() {
            return Err(ResolverError::MissingSpecs(format!(
                "Some packages, groups or modules are missing: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    fn resolve_selection(&self) -> std::result::Result<(), ResolverError> {
        let mut state = self.lock();
        let mut problems = Vec::new();

        // Requirement closure over the included packages
        let mut selected: BTreeSet<String> =
            state.include.difference(&state.exclude).cloned().collect();
        let mut queue: Vec<String> = selected.iter().cloned().collect();

        while let Some(name) = queue.pop() {
            let Some(package) = self.metadata.package(&name) else {
                continue;
            };

            for required in &package.requires {
                if selected.contains(required) {
                    continue;
                }

                let available = self.metadata.package(required).is_some_and(|p| !p.broken);
                if !available || state.exclude.contains(required) {
                    problems.push(format!(
                        "nothing provides {} needed by {}",
                        required, package.name
                    ));
                    continue;
                }

                selected.insert(required.clone());
                queue.push(required.clone());
            }
        }

        for name in &selected {
            let Some(package) = self.metadata.package(name) else {
                continue;
            };

            for conflict in &package.conflicts {
                if selected.contains(conflict) {
                    problems.push(format!("package {} conflicts with {}", name, conflict));
                }
            }
        }

        if !problems.is_empty() {
            problems.sort();
            problems.dedup();
            return Err(ResolverError::InvalidSelection(format!(
                "The following software marked for installation has errors.\n{}",
                problems.join("\n")
            )));
        }

        state.resolved = selected.into_iter().collect();
        tracing::info!("The selection resolves to {} packages.", state.resolved.len());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
