//! Structural hashing and equality over plugin coordinates.
//!
//! Every cache key in the plugin layer embeds a [`PluginCoordinate`] and must
//! agree on what "the same plugin" means. These functions are that single
//! definition: field-for-field comparison including the dependency list and
//! each dependency's exclusions.
//!
//! Both lists are compared **in order**. Two coordinates declaring the same
//! dependencies in a different order are different keys.

use std::hash::{DefaultHasher, Hash, Hasher};

use crate::coordinate::{Dependency, Exclusion, PluginCoordinate};

/// Feed a plugin coordinate into a hasher.
pub fn hash_plugin<H: Hasher>(plugin: &PluginCoordinate, state: &mut H) {
    plugin.group_id.hash(state);
    plugin.artifact_id.hash(state);
    plugin.version.hash(state);
    plugin.extensions.hash(state);
    state.write_usize(plugin.dependencies.len());
    for dependency in &plugin.dependencies {
        hash_dependency(dependency, state);
    }
}

/// Feed a dependency (including its ordered exclusions) into a hasher.
pub fn hash_dependency<H: Hasher>(dependency: &Dependency, state: &mut H) {
    dependency.group_id.hash(state);
    dependency.artifact_id.hash(state);
    dependency.version.hash(state);
    dependency.kind.hash(state);
    dependency.classifier.hash(state);
    dependency.scope.hash(state);
    state.write_usize(dependency.exclusions.len());
    for exclusion in &dependency.exclusions {
        exclusion.group_id.hash(state);
        exclusion.artifact_id.hash(state);
    }
}

/// Stable 64-bit structural hash of a plugin coordinate.
#[must_use]
pub fn plugin_hash_code(plugin: &PluginCoordinate) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_plugin(plugin, &mut hasher);
    hasher.finish()
}

/// Field-for-field equality of two plugin coordinates.
#[must_use]
pub fn plugin_equals(a: &PluginCoordinate, b: &PluginCoordinate) -> bool {
    a.group_id == b.group_id
        && a.artifact_id == b.artifact_id
        && a.version == b.version
        && a.extensions == b.extensions
        && dependencies_equal(&a.dependencies, &b.dependencies)
}

/// Ordered equality of two dependency lists.
#[must_use]
pub fn dependencies_equal(a: &[Dependency], b: &[Dependency]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| dependency_equals(x, y))
}

/// Field-for-field equality of two dependencies.
#[must_use]
pub fn dependency_equals(a: &Dependency, b: &Dependency) -> bool {
    a.group_id == b.group_id
        && a.artifact_id == b.artifact_id
        && a.version == b.version
        && a.kind == b.kind
        && a.classifier == b.classifier
        && a.scope == b.scope
        && exclusions_equal(&a.exclusions, &b.exclusions)
}

/// Ordered equality of two exclusion lists.
#[must_use]
pub fn exclusions_equal(a: &[Exclusion], b: &[Exclusion]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.group_id == y.group_id && x.artifact_id == y.artifact_id)
}
