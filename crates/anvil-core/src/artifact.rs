//! Resolved artifacts.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::coordinate::{DEFAULT_TYPE, Dependency, PluginCoordinate};
use crate::version;

/// A binary artifact, optionally resolved to a file location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Artifact {
    /// Group id.
    pub group_id: String,
    /// Artifact id.
    pub artifact_id: String,
    /// Concrete version (may be a timestamped snapshot).
    pub version: String,
    /// Artifact type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional classifier.
    pub classifier: Option<String>,
    /// Scope the artifact was resolved in.
    pub scope: Option<String>,
    /// Local file or directory once resolved.
    pub file: Option<PathBuf>,
}

impl Artifact {
    /// Create an unresolved artifact with the default type.
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            kind: DEFAULT_TYPE.to_string(),
            classifier: None,
            scope: None,
            file: None,
        }
    }

    /// The artifact a plugin coordinate points at, if its version is known.
    #[must_use]
    pub fn from_plugin(plugin: &PluginCoordinate) -> Option<Self> {
        plugin
            .version
            .as_ref()
            .map(|v| Self::new(&plugin.group_id, &plugin.artifact_id, v))
    }

    /// The artifact a dependency points at, if its version is known.
    #[must_use]
    pub fn from_dependency(dependency: &Dependency) -> Option<Self> {
        dependency.version.as_ref().map(|v| Self {
            group_id: dependency.group_id.clone(),
            artifact_id: dependency.artifact_id.clone(),
            version: v.clone(),
            kind: dependency.kind.clone(),
            classifier: dependency.classifier.clone(),
            scope: dependency.scope.clone(),
            file: None,
        })
    }

    /// Attach a resolved file location.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
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

    /// The `groupId:artifactId` key.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    /// The snapshot-normalized version.
    #[must_use]
    pub fn base_version(&self) -> String {
        version::to_snapshot_version(&self.version)
    }

    /// `groupId:artifactId:type[:classifier]:version`.
    #[must_use]
    pub fn id(&self) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}:{}:{}:{c}:{}",
                self.group_id, self.artifact_id, self.kind, self.version
            ),
            None => format!(
                "{}:{}:{}:{}",
                self.group_id, self.artifact_id, self.kind, self.version
            ),
        }
    }

    /// Whether another artifact has the same identity, ignoring file and scope.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.group_id == other.group_id
            && self.artifact_id == other.artifact_id
            && self.version == other.version
            && self.kind == other.kind
            && self.classifier == other.classifier
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_id_format() {
        let a = Artifact::new("org.example", "lib", "1.0");
        assert_eq!(a.id(), "org.example:lib:jar:1.0");
        let a = a.with_classifier("tests");
        assert_eq!(a.id(), "org.example:lib:jar:tests:1.0");
    }

    #[test]
    fn test_base_version() {
        let a = Artifact::new("org.example", "lib", "1.0-20240115.103000-7");
        assert_eq!(a.base_version(), "1.0-SNAPSHOT");
    }

    #[test]
    fn test_from_plugin_requires_version() {
        let mut plugin = PluginCoordinate::new("g", "a", "1");
        assert!(Artifact::from_plugin(&plugin).is_some());
        plugin.version = None;
        assert!(Artifact::from_plugin(&plugin).is_none());
    }

    #[test]
    fn test_same_identity_ignores_file() {
        let a = Artifact::new("g", "a", "1").with_file("/tmp/a");
        let b = Artifact::new("g", "a", "1");
        assert!(a.same_identity(&b));
        assert_ne!(a, b);
    }
}
