//! Software selection cache
//!
//! Working copy of a software selection while the user edits it. The cache
//! remembers three layers of groups on top of the selected environment:
//!
//! - **default** groups of the environment,
//! - groups **selected** explicitly by the user,
//! - groups **deselected** explicitly by the user.
//!
//! A group is selected if it is available in the environment, not
//! deselected, and either a default or selected group. Deselection always
//! wins, and groups outside the environment are ignored:
//!
//! ```text
//! selected(g) = g ∈ available ∧ g ∉ deselected ∧ (g ∈ default ∨ g ∈ selected)
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{PayloadError, Result};
use crate::resolver::Resolver;
use crate::selection::PackagesSelectionData;

/// The cache of the user software selection
pub struct SelectionCache {
    resolver: Arc<dyn Resolver>,
    environment: String,
    available_groups: BTreeSet<String>,
    default_groups: BTreeSet<String>,
    selected_groups: BTreeSet<String>,
    deselected_groups: BTreeSet<String>,
}

impl SelectionCache {
    /// Create an empty cache backed by the given resolver.
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            environment: String::new(),
            available_groups: BTreeSet::new(),
            default_groups: BTreeSet::new(),
            selected_groups: BTreeSet::new(),
            deselected_groups: BTreeSet::new(),
        }
    }

    /// The selected environment id, empty when unset.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Environments offered by the repositories.
    pub fn available_environments(&self) -> Vec<String> {
        self.resolver.environments()
    }

    /// Effective groups, sorted.
    pub fn groups(&self) -> Vec<String> {
        self.available_groups
            .iter()
            .filter(|g| self.is_group_selected(g))
            .cloned()
            .collect()
    }

    /// Groups of the selected environment, sorted.
    pub fn available_groups(&self) -> Vec<String> {
        self.available_groups.iter().cloned().collect()
    }

    /// Select the environment and load its default and available groups.
    ///
    /// An empty id clears the environment. Explicit group selections and
    /// deselections survive an environment change.
    ///
    /// # Errors
    ///
    /// - `UnknownEnvironment` if the resolver has no data for the id; the
    ///   cache is left without an environment
    pub fn select_environment(&mut self, environment: &str) -> Result<()> {
        tracing::debug!("Selecting the '{}' environment.", environment);

        self.environment.clear();
        self.default_groups.clear();
        self.available_groups.clear();

        if environment.is_empty() {
            return Ok(());
        }

        let data = self
            .resolver
            .get_environment_data(environment)
            .ok_or_else(|| PayloadError::UnknownEnvironment(environment.to_string()))?;

        self.environment = data.id.clone();
        self.default_groups = data.default_groups.iter().cloned().collect();
        self.available_groups = data.get_available_groups().into_iter().collect();
        Ok(())
    }

    pub fn is_environment_selected(&self, environment: &str) -> bool {
        environment == self.environment
    }

    /// Mark the group as selected.
    pub fn select_group(&mut self, group: &str) {
        tracing::debug!("Selecting the '{}' group.", group);
        let id = self.canonical_group_id(group);

        self.deselected_groups.remove(&id);

        // Default groups are selected already.
        if !self.default_groups.contains(&id) {
            self.selected_groups.insert(id);
        }
    }

    /// Mark the group as deselected.
    ///
    /// The selected and default layers are left alone; deselection takes
    /// priority when the selection is queried.
    pub fn deselect_group(&mut self, group: &str) {
        tracing::debug!("Deselecting the '{}' group.", group);
        let id = self.canonical_group_id(group);
        self.deselected_groups.insert(id);
    }

    /// Is the group part of the effective selection?
    pub fn is_group_selected(&self, group: &str) -> bool {
        // Not available in the current environment.
        if !self.available_groups.contains(group) {
            return false;
        }

        // Explicitly deselected by the user.
        if self.deselected_groups.contains(group) {
            return false;
        }

        self.default_groups.contains(group) || self.selected_groups.contains(group)
    }

    /// Load a flat selection into the cache.
    ///
    /// Groups are selected, then excluded groups are deselected. An
    /// environment that can't be resolved is replaced by the default
    /// environment, and groups that can't be resolved are skipped. Both are
    /// logged as warnings; this never fails.
    pub fn apply_selection_data(&mut self, selection: &PackagesSelectionData) {
        if self.resolver.resolve_environment(&selection.environment) {
            self.select_environment_or_clear(&selection.environment);
        } else {
            tracing::warn!(
                "The '{}' environment couldn't be selected.",
                selection.environment
            );
            let fallback = self.resolver.default_environment().unwrap_or_default();
            self.select_environment_or_clear(&fallback);
        }

        self.selected_groups.clear();
        self.deselected_groups.clear();

        for group in &selection.groups {
            if self.resolver.resolve_group(group) {
                self.select_group(group);
                continue;
            }

            tracing::warn!("The '{}' group couldn't be selected.", group);
        }

        for group in &selection.excluded_groups {
            if self.resolver.resolve_group(group) {
                self.deselect_group(group);
                continue;
            }

            tracing::warn!("The '{}' group couldn't be deselected.", group);
        }
    }

    /// Flat form of the current selection.
    ///
    /// Default groups the user deselected are stored as excluded groups,
    /// otherwise the environment would bring them back.
    pub fn get_selection_data(&self) -> PackagesSelectionData {
        PackagesSelectionData {
            environment: self.environment.clone(),
            groups: self.groups(),
            excluded_groups: self.excluded_groups(),
            ..Default::default()
        }
    }

    /// Deselected default groups of the environment, sorted.
    fn excluded_groups(&self) -> Vec<String> {
        self.default_groups
            .iter()
            .filter(|g| self.available_groups.contains(*g) && self.deselected_groups.contains(*g))
            .cloned()
            .collect()
    }

    fn select_environment_or_clear(&mut self, environment: &str) {
        if let Err(e) = self.select_environment(environment) {
            tracing::warn!("{}", e);
        }
    }

    fn canonical_group_id(&self, group: &str) -> String {
        self.resolver
            .get_group_data(group)
            .map(|data| data.id)
            .unwrap_or_else(|| group.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
