//! Plugin and mojo descriptors.
//!
//! A plugin artifact carries its descriptor at [`PLUGIN_DESCRIPTOR_PATH`].
//! The parsed [`PluginDescriptor`] is the *raw* form: it holds no realm and
//! can be cached and shared freely. [`RuntimePluginDescriptor`] binds a raw
//! descriptor to the artifacts and realm it was set up with.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, LazyLock};

use anvil_core::{Artifact, ConfigNode, PropertyAccess, PropertyResult, PropertyTable, Value};
use serde::{Deserialize, Serialize};

use crate::realm::ClassRealm;

/// Location of the plugin descriptor inside a plugin artifact.
pub const PLUGIN_DESCRIPTOR_PATH: &str = "META-INF/anvil/plugin.toml";

/// Location of the extension descriptor inside an extension artifact.
pub const EXTENSION_DESCRIPTOR_PATH: &str = "META-INF/anvil/extension.toml";

/// Attribute carrying a parameter's default value in a configuration tree.
pub const DEFAULT_VALUE_ATTRIBUTE: &str = "default-value";

/// Declared type of a mojo parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParamType {
    /// Text.
    #[default]
    String,
    /// `true`/`false`.
    Boolean,
    /// Signed integer.
    Int,
    /// Filesystem path, resolved against the project base directory.
    Path,
    /// List of strings built from child nodes.
    List,
    /// String map built from child nodes.
    Map,
    /// A host object of the named class.
    Object(String),
}

impl ParamType {
    /// Whether an evaluated value can be assigned without coercion.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::Str(_) | Value::Path(_) | Value::Int(_) | Value::Bool(_))
            | (Self::Boolean, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Path, Value::Path(_))
            | (Self::List, Value::List(_))
            | (Self::Map, Value::Map(_)) => true,
            (Self::Object(class), Value::Object(o)) => o.class_name() == class,
            _ => false,
        }
    }
}

impl From<String> for ParamType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "string" => Self::String,
            "boolean" => Self::Boolean,
            "int" => Self::Int,
            "path" => Self::Path,
            "list" => Self::List,
            "map" => Self::Map,
            _ => Self::Object(s),
        }
    }
}

impl From<ParamType> for String {
    fn from(t: ParamType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Boolean => f.write_str("boolean"),
            Self::Int => f.write_str("int"),
            Self::Path => f.write_str("path"),
            Self::List => f.write_str("list"),
            Self::Map => f.write_str("map"),
            Self::Object(class) => f.write_str(class),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A configurable field of a mojo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Field name.
    pub name: String,
    /// Alternative element name accepted in configuration.
    #[serde(default)]
    pub alias: Option<String>,
    /// Declared type.
    #[serde(default, rename = "type")]
    pub kind: ParamType,
    /// Whether the mojo cannot run without a value.
    #[serde(default)]
    pub required: bool,
    /// Whether users may set the parameter directly.
    #[serde(default = "default_true")]
    pub editable: bool,
    /// Expression supplying the value when configuration does not.
    #[serde(default)]
    pub expression: Option<String>,
    /// Value used when neither configuration nor expression yields one.
    #[serde(default)]
    pub default_value: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl Parameter {
    /// A string parameter with no expression.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            alias: None,
            kind,
            required: false,
            editable: true,
            expression: None,
            default_value: None,
            description: None,
        }
    }

    /// Mark the parameter required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the expression.
    #[must_use]
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Set the default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Set the alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The `-D` property name the expression reads, if it is a bare
    /// `${name}` expression.
    #[must_use]
    pub fn property_name(&self) -> Option<&str> {
        let expr = self.expression.as_deref()?;
        let inner = expr.strip_prefix("${")?.strip_suffix('}')?;
        (!inner.contains("${")).then_some(inner)
    }
}

/// One goal of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MojoDescriptor {
    /// Goal name.
    pub goal: String,
    /// Implementation class name, looked up in the plugin realm.
    pub implementation: String,
    /// Lifecycle phase the goal binds to by default.
    #[serde(default)]
    pub phase: Option<String>,
    /// Name of the configurator; the basic configurator when absent.
    #[serde(default)]
    pub configurator: Option<String>,
    /// Whether the goal needs a current project.
    #[serde(default = "default_true")]
    pub requires_project: bool,
    /// Whether the goal may run in parallel builds.
    #[serde(default)]
    pub thread_safe: bool,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Configurable fields.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl MojoDescriptor {
    /// A goal with no parameters.
    #[must_use]
    pub fn new(goal: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            implementation: implementation.into(),
            phase: None,
            configurator: None,
            requires_project: true,
            thread_safe: false,
            description: None,
            parameters: Vec::new(),
        }
    }

    /// Append a parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Set the configurator name.
    #[must_use]
    pub fn with_configurator(mut self, name: impl Into<String>) -> Self {
        self.configurator = Some(name.into());
        self
    }

    /// Parameter by name or alias.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| p.name == name || p.alias.as_deref() == Some(name))
    }

    /// `prefix:goal`.
    #[must_use]
    pub fn full_goal_name(&self, prefix: &str) -> String {
        format!("{prefix}:{}", self.goal)
    }

    /// Configuration implied by the parameters' expressions and defaults.
    ///
    /// Each parameter with an expression or default becomes a child named
    /// after it, valued with the expression and carrying the default in a
    /// `default-value` attribute.
    #[must_use]
    pub fn default_configuration(&self) -> ConfigNode {
        let mut root = ConfigNode::new("configuration");
        for parameter in &self.parameters {
            if parameter.expression.is_none() && parameter.default_value.is_none() {
                continue;
            }
            let mut child = ConfigNode::new(&parameter.name);
            child.value.clone_from(&parameter.expression);
            if let Some(default) = &parameter.default_value {
                child = child.with_attribute(DEFAULT_VALUE_ATTRIBUTE, default);
            }
            root = root.with_child(child);
        }
        root
    }
}

/// A plugin as described by its own descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Group id.
    pub group_id: String,
    /// Artifact id.
    pub artifact_id: String,
    /// Version.
    pub version: String,
    /// Goal prefix; derived from the artifact id when absent.
    #[serde(default)]
    pub goal_prefix: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether every project gets its own realm for this plugin.
    #[serde(default)]
    pub isolated_realm: bool,
    /// Semver requirement on the running tool.
    #[serde(default)]
    pub required_runtime_version: Option<String>,
    /// Goals.
    #[serde(default)]
    pub mojos: Vec<MojoDescriptor>,
    /// Where the descriptor was read from.
    #[serde(skip)]
    pub source: Option<String>,
}

impl PluginDescriptor {
    /// A descriptor with no goals.
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
            goal_prefix: None,
            description: None,
            isolated_realm: false,
            required_runtime_version: None,
            mojos: Vec::new(),
            source: None,
        }
    }

    /// Append a goal.
    #[must_use]
    pub fn with_mojo(mut self, mojo: MojoDescriptor) -> Self {
        self.mojos.push(mojo);
        self
    }

    /// Set the runtime requirement.
    #[must_use]
    pub fn with_required_runtime_version(mut self, requirement: impl Into<String>) -> Self {
        self.required_runtime_version = Some(requirement.into());
        self
    }

    /// `groupId:artifactId:version`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }

    /// `groupId:artifactId`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    /// Declared goal prefix, or one derived from the artifact id.
    #[must_use]
    pub fn goal_prefix(&self) -> String {
        self.goal_prefix
            .clone()
            .unwrap_or_else(|| goal_prefix_from_artifact_id(&self.artifact_id))
    }

    /// Goal by name.
    #[must_use]
    pub fn mojo(&self, goal: &str) -> Option<&MojoDescriptor> {
        self.mojos.iter().find(|m| m.goal == goal)
    }

    /// All goal names, in declaration order.
    #[must_use]
    pub fn goals(&self) -> Vec<String> {
        self.mojos.iter().map(|m| m.goal.clone()).collect()
    }

    /// Check the descriptor against the artifact it was read from.
    ///
    /// # Errors
    ///
    /// Returns every problem found.
    pub fn validate(&self, artifact: &Artifact) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        let declared_version = anvil_core::version::to_snapshot_version(&self.version);
        let artifact_version = artifact.base_version();
        let expected = [
            ("group_id", &self.group_id, &artifact.group_id),
            ("artifact_id", &self.artifact_id, &artifact.artifact_id),
            ("version", &declared_version, &artifact_version),
        ];
        for (field, declared, actual) in expected {
            if declared != actual {
                problems.push(format!(
                    "{field} '{declared}' does not match plugin artifact '{actual}'"
                ));
            }
        }

        let mut goals = BTreeSet::new();
        for (index, mojo) in self.mojos.iter().enumerate() {
            if mojo.goal.trim().is_empty() {
                problems.push(format!("mojo #{index} has no goal"));
            } else if !goals.insert(mojo.goal.as_str()) {
                problems.push(format!("goal '{}' is declared more than once", mojo.goal));
            }
            if mojo.implementation.trim().is_empty() {
                problems.push(format!("goal '{}' has no implementation", mojo.goal));
            }
            let mut names = BTreeSet::new();
            for parameter in &mojo.parameters {
                if !names.insert(parameter.name.as_str()) {
                    problems.push(format!(
                        "goal '{}' declares parameter '{}' more than once",
                        mojo.goal, parameter.name
                    ));
                }
            }
        }

        if problems.is_empty() { Ok(()) } else { Err(problems) }
    }
}

/// `anvil-foo-plugin`, `foo-anvil-plugin` and `foo-plugin` all become `foo`.
#[must_use]
pub fn goal_prefix_from_artifact_id(artifact_id: &str) -> String {
    let id = artifact_id;
    if let Some(inner) = id
        .strip_prefix("anvil-")
        .and_then(|rest| rest.strip_suffix("-plugin"))
    {
        return inner.to_string();
    }
    if let Some(inner) = id.strip_suffix("-anvil-plugin") {
        return inner.to_string();
    }
    if let Some(inner) = id.strip_suffix("-plugin") {
        return inner.to_string();
    }
    id.to_string()
}

/// Turns descriptor bytes into a [`PluginDescriptor`].
pub trait DescriptorParser: Send + Sync + fmt::Debug {
    /// Parse a descriptor.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message if the bytes are not a valid
    /// descriptor.
    fn parse(&self, bytes: &[u8], source: &str) -> Result<PluginDescriptor, String>;
}

/// Parser for TOML plugin descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlDescriptorParser;

impl DescriptorParser for TomlDescriptorParser {
    fn parse(&self, bytes: &[u8], source: &str) -> Result<PluginDescriptor, String> {
        let text = std::str::from_utf8(bytes).map_err(|e| format!("not UTF-8: {e}"))?;
        let mut descriptor: PluginDescriptor = toml::from_str(text).map_err(|e| e.to_string())?;
        descriptor.source = Some(source.to_string());
        Ok(descriptor)
    }
}

/// What a build extension exports to plugin realms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    /// Class and package patterns (`pkg.*`) visible to plugins.
    #[serde(default)]
    pub exported_packages: Vec<String>,
    /// `groupId:artifactId` keys the extension provides.
    #[serde(default)]
    pub exported_artifacts: Vec<String>,
}

impl ExtensionDescriptor {
    /// Parse an extension descriptor.
    ///
    /// # Errors
    ///
    /// Returns a message if the bytes are not valid TOML for this shape.
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let text = std::str::from_utf8(bytes).map_err(|e| format!("not UTF-8: {e}"))?;
        toml::from_str(text).map_err(|e| e.to_string())
    }
}

/// A raw descriptor bound to the realm it runs in.
#[derive(Debug, Clone)]
pub struct RuntimePluginDescriptor {
    /// The cached raw descriptor.
    pub raw: Arc<PluginDescriptor>,
    /// Resolved plugin artifact.
    pub plugin_artifact: Artifact,
    /// Full resolved closure, plugin artifact first.
    pub artifacts: Vec<Artifact>,
    /// Realm built from `artifacts`.
    pub realm: Arc<ClassRealm>,
}

impl RuntimePluginDescriptor {
    /// Resolved artifacts by `groupId:artifactId`.
    #[must_use]
    pub fn artifact_map(&self) -> BTreeMap<String, &Artifact> {
        self.artifacts.iter().map(|a| (a.key(), a)).collect()
    }
}

static PLUGIN_DESCRIPTOR: LazyLock<PropertyTable<RuntimePluginDescriptor>> = LazyLock::new(|| {
    PropertyTable::<RuntimePluginDescriptor>::new("anvil.plugin.PluginDescriptor")
        .property("groupId", |d| Some(Value::from(&d.raw.group_id)))
        .property("artifactId", |d| Some(Value::from(&d.raw.artifact_id)))
        .property("version", |d| Some(Value::from(&d.raw.version)))
        .property("id", |d| Some(Value::Str(d.raw.id())))
        .property("goalPrefix", |d| Some(Value::Str(d.raw.goal_prefix())))
        .property("pluginArtifact", |d| {
            Some(Value::Object(Arc::new(d.plugin_artifact.clone())))
        })
        .property("artifacts", |d| {
            Some(Value::List(
                d.artifacts
                    .iter()
                    .map(|a| Value::Object(Arc::new(a.clone())))
                    .collect(),
            ))
        })
        .property("artifactMap", |d| {
            Some(Value::Map(
                d.artifact_map()
                    .into_iter()
                    .map(|(k, a)| (k, Value::Object(Arc::new(a.clone()))))
                    .collect(),
            ))
        })
        .property("realm", |d| Some(Value::from(d.realm.id().as_str())))
});

impl PropertyAccess for RuntimePluginDescriptor {
    fn class_name(&self) -> &str {
        PLUGIN_DESCRIPTOR.class_name()
    }

    fn property(&self, name: &str) -> PropertyResult {
        PLUGIN_DESCRIPTOR.get(self, name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

static MOJO_DESCRIPTOR: LazyLock<PropertyTable<MojoDescriptor>> = LazyLock::new(|| {
    PropertyTable::<MojoDescriptor>::new("anvil.plugin.MojoDescriptor")
        .property("goal", |m| Some(Value::from(&m.goal)))
        .property("implementation", |m| Some(Value::from(&m.implementation)))
        .property("phase", |m| m.phase.as_ref().map(Value::from))
        .property("requiresProject", |m| Some(Value::Bool(m.requires_project)))
        .property("threadSafe", |m| Some(Value::Bool(m.thread_safe)))
        .property("parameters", |m| {
            Some(Value::List(
                m.parameters.iter().map(|p| Value::from(&p.name)).collect(),
            ))
        })
});

impl PropertyAccess for MojoDescriptor {
    fn class_name(&self) -> &str {
        MOJO_DESCRIPTOR.class_name()
    }

    fn property(&self, name: &str) -> PropertyResult {
        MOJO_DESCRIPTOR.get(self, name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"
group_id = "org.example"
artifact_id = "anvil-compiler-plugin"
version = "1.0"
required_runtime_version = ">=0.1"

[[mojos]]
goal = "compile"
implementation = "org.example.CompileMojo"
phase = "compile"

[[mojos.parameters]]
name = "outputDirectory"
type = "path"
required = true
expression = "${project.build.outputDirectory}"

[[mojos.parameters]]
name = "verbose"
type = "boolean"
expression = "${compiler.verbose}"
default_value = "false"

[[mojos.parameters]]
name = "project"
type = "anvil.project.Project"
expression = "${project}"
editable = false
"#;

    fn parse() -> PluginDescriptor {
        TomlDescriptorParser
            .parse(DESCRIPTOR.as_bytes(), PLUGIN_DESCRIPTOR_PATH)
            .unwrap()
    }

    #[test]
    fn test_parse_descriptor() {
        let d = parse();
        assert_eq!(d.id(), "org.example:anvil-compiler-plugin:1.0");
        assert_eq!(d.goal_prefix(), "compiler");
        assert_eq!(d.source.as_deref(), Some(PLUGIN_DESCRIPTOR_PATH));
        let compile = d.mojo("compile").unwrap();
        assert!(compile.requires_project);
        assert_eq!(compile.parameters[0].kind, ParamType::Path);
        assert_eq!(
            compile.parameters[2].kind,
            ParamType::Object("anvil.project.Project".into())
        );
        assert!(!compile.parameters[2].editable);
        assert_eq!(compile.parameters[1].property_name(), Some("compiler.verbose"));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = TomlDescriptorParser.parse(b"group_id = ", "x").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let d = PluginDescriptor::new("org.example", "p", "2.0")
            .with_mojo(MojoDescriptor::new("run", ""))
            .with_mojo(
                MojoDescriptor::new("run", "org.example.Run")
                    .with_parameter(Parameter::new("x", ParamType::String))
                    .with_parameter(Parameter::new("x", ParamType::Int)),
            );
        let problems = d.validate(&Artifact::new("org.example", "p", "1.0")).unwrap_err();
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(parse()
            .validate(&Artifact::new("org.example", "anvil-compiler-plugin", "1.0"))
            .is_ok());
    }

    #[test]
    fn test_goal_prefix_derivation() {
        assert_eq!(goal_prefix_from_artifact_id("anvil-surefire-plugin"), "surefire");
        assert_eq!(goal_prefix_from_artifact_id("jetty-anvil-plugin"), "jetty");
        assert_eq!(goal_prefix_from_artifact_id("exec-plugin"), "exec");
        assert_eq!(goal_prefix_from_artifact_id("tools"), "tools");
    }

    #[test]
    fn test_default_configuration() {
        let d = parse();
        let config = d.mojo("compile").unwrap().default_configuration();
        let verbose = config.child("verbose").unwrap();
        assert_eq!(verbose.value.as_deref(), Some("${compiler.verbose}"));
        assert_eq!(verbose.attribute(DEFAULT_VALUE_ATTRIBUTE), Some("false"));
        assert_eq!(config.children.len(), 3);
    }

    #[test]
    fn test_param_type_accepts() {
        assert!(ParamType::String.accepts(&Value::Int(1)));
        assert!(!ParamType::Boolean.accepts(&Value::from("true")));
        assert!(ParamType::Path.accepts(&Value::from(std::path::PathBuf::from("/tmp"))));
        assert!(!ParamType::List.accepts(&Value::from("a")));
    }

    #[test]
    fn test_extension_descriptor() {
        let ext = ExtensionDescriptor::parse(
            br#"exported_packages = ["org.example.ext.*"]
exported_artifacts = ["org.example:ext"]"#,
        )
        .unwrap();
        assert_eq!(ext.exported_packages, vec!["org.example.ext.*"]);
        assert!(ExtensionDescriptor::parse(b"").unwrap().exported_packages.is_empty());
    }
}
