//! Software selection transfer objects
//!
//! `PackagesSelectionData` is the flat form of a software selection exchanged
//! with front ends and the kickstart layer. `ValidationReport` is what a
//! resolution run hands back.
//!
//! The expansion rules below translate a selection into the include and
//! exclude spec lists the resolver understands:
//!
//! | Selection field               | Spec |
//! |-------------------------------|------|
//! | default environment / `environment` | `@<env>` include |
//! | `core_group_enabled`          | `@core` include, or exclude when disabled |
//! | `groups`                      | `@<group>` or `@<group>/<types>` include |
//! | `excluded_groups`             | `@<group>` exclude |
//! | `packages` / `excluded_packages` | plain package specs |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::GroupPackageType;

/// Flat software selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesSelectionData {
    /// Install the environment the repositories mark as default
    pub default_environment_enabled: bool,
    /// Install the @core group
    pub core_group_enabled: bool,
    /// Environment id, empty when unset
    pub environment: String,
    pub groups: Vec<String>,
    /// Package types to install per group (defaults to the comps default)
    pub groups_package_types: BTreeMap<String, Vec<GroupPackageType>>,
    pub excluded_groups: Vec<String>,
    pub packages: Vec<String>,
    pub excluded_packages: Vec<String>,
    /// Module specs to enable (`name:stream/profile`)
    pub modules: Vec<String>,
    pub disabled_modules: Vec<String>,
}

impl Default for PackagesSelectionData {
    fn default() -> Self {
        Self {
            default_environment_enabled: false,
            core_group_enabled: true,
            environment: String::new(),
            groups: Vec::new(),
            groups_package_types: BTreeMap::new(),
            excluded_groups: Vec::new(),
            packages: Vec::new(),
            excluded_packages: Vec::new(),
            modules: Vec::new(),
            disabled_modules: Vec::new(),
        }
    }
}

impl PackagesSelectionData {
    /// Selection of an environment and a list of groups.
    pub fn new(environment: impl Into<String>, groups: &[&str]) -> Self {
        Self {
            environment: environment.into(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// Outcome of a software selection check.
///
/// Empty lists mean the selection resolved cleanly. Warnings don't block the
/// installation, errors do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationReport {
    pub error_messages: Vec<String>,
    pub warning_messages: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when there are no errors (warnings are allowed).
    pub fn is_valid(&self) -> bool {
        self.error_messages.is_empty()
    }

    /// True when there is nothing to report at all.
    pub fn is_empty(&self) -> bool {
        self.error_messages.is_empty() && self.warning_messages.is_empty()
    }

    /// All messages, errors first.
    pub fn get_messages(&self) -> Vec<String> {
        self.error_messages
            .iter()
            .chain(&self.warning_messages)
            .cloned()
            .collect()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ValidationReport(errors={:?}, warnings={:?})",
            self.error_messages, self.warning_messages
        )
    }
}

// ============================================================================
// Spec Expansion
// ============================================================================

/// Translate a selection into `(include, exclude)` spec lists.
///
/// `default_environment` is only used when the selection asks for the
/// default environment; an explicit `environment` is ignored in that case.
pub fn get_installation_specs(
    selection: &PackagesSelectionData,
    default_environment: Option<&str>,
) -> (Vec<String>, Vec<String>) {
    let mut include_list = Vec::new();
    let mut exclude_list = Vec::new();

    // 1. Environment
    match default_environment {
        Some(env) if selection.default_environment_enabled && !env.is_empty() => {
            tracing::info!("Selecting default environment '{}'.", env);
            include_list.push(format!("@{}", env));
        }
        _ if !selection.environment.is_empty() => {
            include_list.push(format!("@{}", selection.environment));
        }
        _ => {}
    }

    // 2. Core group
    if selection.core_group_enabled {
        include_list.push("@core".to_string());
    } else {
        tracing::info!("Skipping @core group.");
        exclude_list.push("@core".to_string());
    }

    // 3. Groups
    for group in &selection.excluded_groups {
        exclude_list.push(format!("@{}", group));
    }

    for group in &selection.groups {
        match selection.groups_package_types.get(group) {
            Some(types) if !types.is_empty() => {
                let types: Vec<String> = types.iter().map(|t| t.to_string()).collect();
                include_list.push(format!("@{}/{}", group, types.join(",")));
            }
            _ => include_list.push(format!("@{}", group)),
        }
    }

    // 4. Packages
    exclude_list.extend(selection.excluded_packages.iter().cloned());
    include_list.extend(selection.packages.iter().cloned());

    (include_list, exclude_list)
}

/// The kernel spec to add to a selection, unless the user excluded it.
pub fn get_kernel_package(kernel_package: &str, exclude_list: &[String]) -> Option<String> {
    if kernel_package.is_empty() {
        tracing::error!("Kernel: no package selected");
        return None;
    }

    if exclude_list.iter().any(|spec| spec == kernel_package) {
        tracing::info!("Kernel: {} is excluded", kernel_package);
        return None;
    }

    tracing::info!("Kernel: selected {}", kernel_package);
    Some(kernel_package.to_string())
}

// ============================================================================
// Tests
// ============================================================================
