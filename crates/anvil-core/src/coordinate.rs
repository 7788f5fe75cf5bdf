//! Plugin and dependency coordinates.
//!
//! A [`PluginCoordinate`] is what a project declares: the plugin's
//! `groupId:artifactId:version`, whether it contributes build extensions, and
//! an ordered list of dependency overrides. These values are the semantic core
//! of every cache key, so equality and hashing are delegated to
//! [`crate::equality`] rather than derived.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::equality;

/// Default artifact type for dependencies that do not declare one.
pub const DEFAULT_TYPE: &str = "jar";

/// A `groupId:artifactId` pair excluded from a dependency's transitive closure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Exclusion {
    /// Excluded group id (`*` matches any group).
    pub group_id: String,
    /// Excluded artifact id (`*` matches any artifact).
    pub artifact_id: String,
}

impl Exclusion {
    /// Create a new exclusion.
    #[must_use]
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
        }
    }

    /// Whether this exclusion matches the given `groupId`/`artifactId`.
    #[must_use]
    pub fn matches(&self, group_id: &str, artifact_id: &str) -> bool {
        (self.group_id == "*" || self.group_id == group_id)
            && (self.artifact_id == "*" || self.artifact_id == artifact_id)
    }
}

/// A declared dependency, either of a project or a plugin override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    /// Group id.
    pub group_id: String,
    /// Artifact id.
    pub artifact_id: String,
    /// Version or version range.
    pub version: Option<String>,
    /// Artifact type (`jar`, `pom`, ...).
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
    /// Optional classifier.
    #[serde(default)]
    pub classifier: Option<String>,
    /// Dependency scope (`compile`, `runtime`, `test`, ...).
    #[serde(default)]
    pub scope: Option<String>,
    /// Ordered exclusions.
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
    /// Whether the dependency is optional.
    #[serde(default)]
    pub optional: bool,
}

fn default_type() -> String {
    DEFAULT_TYPE.to_string()
}

impl Dependency {
    /// Create a dependency with the default type and no scope.
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: Some(version.into()),
            kind: default_type(),
            classifier: None,
            scope: None,
            exclusions: Vec::new(),
            optional: false,
        }
    }

    /// Set the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set the classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// Append an exclusion.
    #[must_use]
    pub fn with_exclusion(mut self, exclusion: Exclusion) -> Self {
        self.exclusions.push(exclusion);
        self
    }

    /// The `groupId:artifactId` management key.
    #[must_use]
    pub fn management_key(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    /// Whether any exclusion on this dependency matches the coordinates.
    #[must_use]
    pub fn excludes(&self, group_id: &str, artifact_id: &str) -> bool {
        self.exclusions
            .iter()
            .any(|e| e.matches(group_id, artifact_id))
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        equality::dependency_equals(self, other)
    }
}

impl Eq for Dependency {}

impl Hash for Dependency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        equality::hash_dependency(self, state);
    }
}

/// A plugin as declared by a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginCoordinate {
    /// Group id.
    pub group_id: String,
    /// Artifact id.
    pub artifact_id: String,
    /// Version or version range. Version resolution happens upstream.
    #[serde(default)]
    pub version: Option<String>,
    /// Whether the plugin contributes build extensions.
    #[serde(default)]
    pub extensions: bool,
    /// Ordered dependency overrides.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

impl PluginCoordinate {
    /// Create a plugin coordinate without dependency overrides.
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: Some(version.into()),
            extensions: false,
            dependencies: Vec::new(),
        }
    }

    /// Append a dependency override.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Mark the plugin as contributing build extensions.
    #[must_use]
    pub fn with_extensions(mut self, extensions: bool) -> Self {
        self.extensions = extensions;
        self
    }

    /// The version-less `groupId:artifactId` key.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    /// The full `groupId:artifactId:version` id.
    #[must_use]
    pub fn id(&self) -> String {
        format!(
            "{}:{}:{}",
            self.group_id,
            self.artifact_id,
            self.version.as_deref().unwrap_or("")
        )
    }
}

impl fmt::Display for PluginCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl PartialEq for PluginCoordinate {
    fn eq(&self, other: &Self) -> bool {
        equality::plugin_equals(self, other)
    }
}

impl Eq for PluginCoordinate {}

impl Hash for PluginCoordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        equality::hash_plugin(self, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_wildcards() {
        let any = Exclusion::new("*", "*");
        assert!(any.matches("org.example", "lib"));

        let group = Exclusion::new("org.example", "*");
        assert!(group.matches("org.example", "lib"));
        assert!(!group.matches("org.other", "lib"));
    }

    #[test]
    fn test_plugin_ids() {
        let plugin = PluginCoordinate::new("org.anvil.plugins", "anvil-compiler", "3.1.0");
        assert_eq!(plugin.key(), "org.anvil.plugins:anvil-compiler");
        assert_eq!(plugin.id(), "org.anvil.plugins:anvil-compiler:3.1.0");
        assert_eq!(plugin.to_string(), plugin.id());
    }

    #[test]
    fn test_dependency_defaults_from_toml() {
        let dep: Dependency = toml::from_str(
            r#"
            group_id = "org.example"
            artifact_id = "lib"
            version = "1.0"
            "#,
        )
        .unwrap();
        assert_eq!(dep.kind, "jar");
        assert!(dep.scope.is_none());
        assert!(dep.exclusions.is_empty());
    }
}
