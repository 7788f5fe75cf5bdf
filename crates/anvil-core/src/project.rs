//! Built project model.
//!
//! Model building (inheritance, interpolation, profiles) happens upstream;
//! this module only carries the already-built result and exposes it to
//! expression evaluation.

use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::config_node::ConfigNode;
use crate::coordinate::{Dependency, PluginCoordinate};
use crate::value::{PropertyAccess, PropertyResult, PropertyTable, Value, string_map};

/// Build directories of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Root build directory (`target`).
    pub directory: PathBuf,
    /// Main class output directory.
    pub output_directory: PathBuf,
    /// Test class output directory.
    pub test_output_directory: PathBuf,
    /// Main source directory.
    pub source_directory: PathBuf,
    /// Final artifact name without extension.
    pub final_name: String,
    /// Declared build plugins.
    #[serde(default)]
    pub plugins: Vec<PluginDeclaration>,
}

impl Build {
    /// Conventional layout rooted at `basedir`.
    #[must_use]
    pub fn conventional(basedir: &Path, final_name: impl Into<String>) -> Self {
        let directory = basedir.join("target");
        Self {
            output_directory: directory.join("classes"),
            test_output_directory: directory.join("test-classes"),
            source_directory: basedir.join("src").join("main").join("java"),
            directory,
            final_name: final_name.into(),
            plugins: Vec::new(),
        }
    }

    /// Declaration of the plugin with the given `groupId:artifactId` key.
    #[must_use]
    pub fn plugin(&self, key: &str) -> Option<&PluginDeclaration> {
        self.plugins.iter().find(|p| p.coordinate.key() == key)
    }
}

/// A plugin declared in a project's build section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDeclaration {
    /// Plugin coordinate.
    pub coordinate: PluginCoordinate,
    /// Plugin-level configuration.
    #[serde(default)]
    pub configuration: Option<ConfigNode>,
    /// Declared executions.
    #[serde(default)]
    pub executions: Vec<PluginExecutionDeclaration>,
}

impl PluginDeclaration {
    /// Declare a plugin without configuration or executions.
    #[must_use]
    pub fn new(coordinate: PluginCoordinate) -> Self {
        Self {
            coordinate,
            configuration: None,
            executions: Vec::new(),
        }
    }

    /// Execution declaration by id.
    #[must_use]
    pub fn execution(&self, id: &str) -> Option<&PluginExecutionDeclaration> {
        self.executions.iter().find(|e| e.id == id)
    }
}

/// An `<execution>` block of a plugin declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginExecutionDeclaration {
    /// Execution id.
    pub id: String,
    /// Lifecycle phase the execution binds to.
    #[serde(default)]
    pub phase: Option<String>,
    /// Goals run by this execution.
    #[serde(default)]
    pub goals: Vec<String>,
    /// Execution-level configuration.
    #[serde(default)]
    pub configuration: Option<ConfigNode>,
    /// Goal-specific configuration, keyed by goal name.
    #[serde(default)]
    pub goal_configurations: BTreeMap<String, ConfigNode>,
}

/// An attached artifact with the same identity but a different file
/// already exists on the project.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate artifact attachment {artifact} (existing file {existing}, new file {new})")]
pub struct DuplicateArtifactAttachment {
    /// Artifact id being attached.
    pub artifact: String,
    /// File of the existing attachment.
    pub existing: String,
    /// File of the rejected attachment.
    pub new: String,
}

/// A built project.
#[derive(Debug)]
pub struct Project {
    /// Group id.
    pub group_id: String,
    /// Artifact id.
    pub artifact_id: String,
    /// Version.
    pub version: String,
    /// Packaging.
    pub packaging: String,
    /// Display name.
    pub name: Option<String>,
    /// Project base directory.
    pub basedir: PathBuf,
    /// Build section.
    pub build: Build,
    /// Effective project properties.
    pub properties: BTreeMap<String, String>,
    /// Declared dependencies.
    pub dependencies: Vec<Dependency>,
    attached: Mutex<Vec<Artifact>>,
}

impl Project {
    /// Create a project with a conventional build layout.
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        basedir: impl Into<PathBuf>,
    ) -> Self {
        let artifact_id = artifact_id.into();
        let version = version.into();
        let basedir = basedir.into();
        let build = Build::conventional(&basedir, format!("{artifact_id}-{version}"));
        Self {
            group_id: group_id.into(),
            artifact_id,
            version,
            packaging: "jar".to_string(),
            name: None,
            basedir,
            build,
            properties: BTreeMap::new(),
            dependencies: Vec::new(),
            attached: Mutex::new(Vec::new()),
        }
    }

    /// Set a project property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Append a declared dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Append a build plugin declaration.
    #[must_use]
    pub fn with_plugin(mut self, plugin: PluginDeclaration) -> Self {
        self.build.plugins.push(plugin);
        self
    }

    /// `groupId:artifactId:version`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }

    /// Attach a secondary artifact produced by the build.
    ///
    /// Re-attaching the same file is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateArtifactAttachment`] if an artifact with the same
    /// identity is already attached with a different file.
    pub fn attach_artifact(&self, artifact: Artifact) -> Result<(), DuplicateArtifactAttachment> {
        let mut attached = self.attached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = attached.iter().find(|a| a.same_identity(&artifact)) {
            if existing.file == artifact.file {
                return Ok(());
            }
            return Err(DuplicateArtifactAttachment {
                artifact: artifact.id(),
                existing: display_file(existing.file.as_deref()),
                new: display_file(artifact.file.as_deref()),
            });
        }
        attached.push(artifact);
        Ok(())
    }

    /// Snapshot of the attached artifacts.
    #[must_use]
    pub fn attached_artifacts(&self) -> Vec<Artifact> {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn display_file(file: Option<&Path>) -> String {
    file.map_or_else(|| "<none>".to_string(), |f| f.display().to_string())
}

static PROJECT: LazyLock<PropertyTable<Project>> = LazyLock::new(|| {
    PropertyTable::<Project>::new("anvil.project.Project")
        .property("groupId", |p| Some(Value::from(&p.group_id)))
        .property("artifactId", |p| Some(Value::from(&p.artifact_id)))
        .property("version", |p| Some(Value::from(&p.version)))
        .property("packaging", |p| Some(Value::from(&p.packaging)))
        .property("name", |p| p.name.as_ref().map(Value::from))
        .property("id", |p| Some(Value::Str(p.id())))
        .property("basedir", |p| Some(Value::from(p.basedir.as_path())))
        .property("build", |p| {
            Some(Value::Object(std::sync::Arc::new(p.build.clone())))
        })
        .property("properties", |p| Some(string_map(&p.properties)))
        .property("dependencies", |p| {
            Some(Value::List(
                p.dependencies
                    .iter()
                    .map(|d| Value::Object(std::sync::Arc::new(d.clone())))
                    .collect(),
            ))
        })
        .property("attachedArtifacts", |p| {
            Some(Value::List(
                p.attached_artifacts()
                    .into_iter()
                    .map(|a| Value::Object(std::sync::Arc::new(a)))
                    .collect(),
            ))
        })
});

impl PropertyAccess for Project {
    fn class_name(&self) -> &str {
        PROJECT.class_name()
    }

    fn property(&self, name: &str) -> PropertyResult {
        PROJECT.get(self, name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

static BUILD: LazyLock<PropertyTable<Build>> = LazyLock::new(|| {
    PropertyTable::<Build>::new("anvil.model.Build")
        .property("directory", |b| Some(Value::from(b.directory.as_path())))
        .property("outputDirectory", |b| {
            Some(Value::from(b.output_directory.as_path()))
        })
        .property("testOutputDirectory", |b| {
            Some(Value::from(b.test_output_directory.as_path()))
        })
        .property("sourceDirectory", |b| {
            Some(Value::from(b.source_directory.as_path()))
        })
        .property("finalName", |b| Some(Value::from(&b.final_name)))
});

impl PropertyAccess for Build {
    fn class_name(&self) -> &str {
        BUILD.class_name()
    }

    fn property(&self, name: &str) -> PropertyResult {
        BUILD.get(self, name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

static DEPENDENCY: LazyLock<PropertyTable<Dependency>> = LazyLock::new(|| {
    PropertyTable::<Dependency>::new("anvil.model.Dependency")
        .property("groupId", |d| Some(Value::from(&d.group_id)))
        .property("artifactId", |d| Some(Value::from(&d.artifact_id)))
        .property("version", |d| d.version.as_ref().map(Value::from))
        .property("type", |d| Some(Value::from(&d.kind)))
        .property("classifier", |d| d.classifier.as_ref().map(Value::from))
        .property("scope", |d| d.scope.as_ref().map(Value::from))
        .property("optional", |d| Some(Value::Bool(d.optional)))
});

impl PropertyAccess for Dependency {
    fn class_name(&self) -> &str {
        DEPENDENCY.class_name()
    }

    fn property(&self, name: &str) -> PropertyResult {
        DEPENDENCY.get(self, name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

static ARTIFACT: LazyLock<PropertyTable<Artifact>> = LazyLock::new(|| {
    PropertyTable::<Artifact>::new("anvil.artifact.Artifact")
        .property("groupId", |a| Some(Value::from(&a.group_id)))
        .property("artifactId", |a| Some(Value::from(&a.artifact_id)))
        .property("version", |a| Some(Value::from(&a.version)))
        .property("baseVersion", |a| Some(Value::Str(a.base_version())))
        .property("type", |a| Some(Value::from(&a.kind)))
        .property("classifier", |a| a.classifier.as_ref().map(Value::from))
        .property("scope", |a| a.scope.as_ref().map(Value::from))
        .property("file", |a| a.file.as_deref().map(Value::from))
        .property("id", |a| Some(Value::Str(a.id())))
});

impl PropertyAccess for Artifact {
    fn class_name(&self) -> &str {
        ARTIFACT.class_name()
    }

    fn property(&self, name: &str) -> PropertyResult {
        ARTIFACT.get(self, name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
