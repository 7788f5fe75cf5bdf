//! Populating mojo fields from a configuration tree.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anvil_core::{ConfigNode, Value};
use dashmap::DashMap;

use crate::descriptor::{DEFAULT_VALUE_ATTRIBUTE, MojoDescriptor, ParamType, Parameter};
use crate::error::{PluginError, PluginResult};
use crate::expression::ExpressionEvaluator;
use crate::mojo::{Mojo, MojoError};
use crate::realm::ClassRealm;

/// Name of the configurator used when a mojo does not ask for one.
pub const BASIC_CONFIGURATOR: &str = "basic";

/// Everything a configurator needs besides the mojo itself.
#[derive(Debug, Clone, Copy)]
pub struct ConfigurationContext<'a> {
    /// Plugin id, for error messages.
    pub plugin: &'a str,
    /// Goal prefix, for error messages.
    pub goal_prefix: &'a str,
    /// The goal being configured.
    pub mojo: &'a MojoDescriptor,
    /// Merged configuration; `None` when nothing was configured.
    pub configuration: Option<&'a ConfigNode>,
    /// Evaluator for `${...}` values.
    pub evaluator: &'a ExpressionEvaluator<'a>,
    /// Realm the mojo was loaded from.
    pub realm: &'a Arc<ClassRealm>,
    /// The host realm.
    pub core: &'a Arc<ClassRealm>,
}

impl ConfigurationContext<'_> {
    fn error(&self, message: impl Into<String>) -> PluginError {
        PluginError::Configuration {
            plugin: self.plugin.to_string(),
            goal: Some(self.mojo.goal.clone()),
            message: message.into(),
            diagnostics: None,
        }
    }

    fn realm_diagnostics(&self) -> String {
        format!("{}\n{}", self.realm.dump(), self.core.dump())
    }
}

/// Assigns configured values to a mojo's fields.
pub trait ComponentConfigurator: Send + Sync + fmt::Debug {
    /// Configure `mojo`.
    ///
    /// # Errors
    ///
    /// [`PluginError::Configuration`] if a parameter cannot be satisfied.
    fn configure(&self, mojo: &mut dyn Mojo, context: &ConfigurationContext<'_>) -> PluginResult<()>;
}

/// Configurators by name.
#[derive(Debug, Clone)]
pub struct ConfiguratorRegistry {
    configurators: Arc<DashMap<String, Arc<dyn ComponentConfigurator>>>,
}

impl Default for ConfiguratorRegistry {
    fn default() -> Self {
        let registry = Self {
            configurators: Arc::default(),
        };
        registry.register(BASIC_CONFIGURATOR, Arc::new(BasicConfigurator));
        registry
    }
}

impl ConfiguratorRegistry {
    /// A registry holding the basic configurator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a configurator under `name`.
    pub fn register(&self, name: impl Into<String>, configurator: Arc<dyn ComponentConfigurator>) {
        self.configurators.insert(name.into(), configurator);
    }

    /// The configurator a goal asks for, or the basic one.
    ///
    /// # Errors
    ///
    /// [`PluginError::Configuration`] if the named configurator is unknown.
    pub fn lookup(&self, plugin: &str, mojo: &MojoDescriptor) -> PluginResult<Arc<dyn ComponentConfigurator>> {
        let name = mojo.configurator.as_deref().unwrap_or(BASIC_CONFIGURATOR);
        self.configurators
            .get(name)
            .map(|c| c.value().clone())
            .ok_or_else(|| PluginError::Configuration {
                plugin: plugin.to_string(),
                goal: Some(mojo.goal.clone()),
                message: format!("no component configurator named '{name}'"),
                diagnostics: None,
            })
    }
}

/// Field-by-field configurator.
///
/// For each parameter: take the configuration element named after it (or
/// its alias), evaluate its value, fall back to the `default-value`
/// attribute, coerce to the declared type and hand it to the mojo. Missing
/// required parameters are reported together.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicConfigurator;

impl ComponentConfigurator for BasicConfigurator {
    fn configure(&self, mojo: &mut dyn Mojo, context: &ConfigurationContext<'_>) -> PluginResult<()> {
        let mut missing = Vec::new();

        for parameter in &context.mojo.parameters {
            check_linkage(parameter, context)?;
            let node = context.configuration.and_then(|c| element_for(c, parameter));
            if let Some(node) = node {
                check_editable(parameter, node, context)?;
            }

            let value = match node {
                Some(node) => configured_value(node, parameter, context)?,
                None => None,
            };
            let value = match value {
                Some(v) => Some(v),
                None => default_value(node, parameter, context)?,
            };

            let Some(value) = value else {
                if parameter.required {
                    missing.push(parameter);
                }
                continue;
            };

            let value = coerce(value, parameter, &context.evaluator.base_directory())
                .map_err(|message| context.error(message))?;

            tracing::trace!(
                goal = %context.mojo.goal,
                parameter = %parameter.name,
                kind = value.kind(),
                "Configuring field"
            );
            mojo.configure_field(&parameter.name, value)
                .map_err(|e| field_error(e, context))?;
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(context.error(missing_message(&missing, context)))
        }
    }
}

fn element_for<'c>(configuration: &'c ConfigNode, parameter: &Parameter) -> Option<&'c ConfigNode> {
    configuration.child(&parameter.name).or_else(|| {
        parameter
            .alias
            .as_deref()
            .and_then(|alias| configuration.child(alias))
    })
}

fn check_editable(
    parameter: &Parameter,
    node: &ConfigNode,
    context: &ConfigurationContext<'_>,
) -> PluginResult<()> {
    if parameter.editable || node.value == parameter.expression {
        return Ok(());
    }
    Err(context.error(format!(
        "parameter '{}' is read-only and cannot be set in the configuration",
        parameter.name
    )))
}

fn configured_value(
    node: &ConfigNode,
    parameter: &Parameter,
    context: &ConfigurationContext<'_>,
) -> PluginResult<Option<Value>> {
    match parameter.kind {
        ParamType::List if !node.children.is_empty() => {
            let mut items = Vec::with_capacity(node.children.len());
            for child in &node.children {
                if let Some(text) = &child.value
                    && let Some(value) = context.evaluator.evaluate(text, None)?
                {
                    items.push(value);
                }
            }
            Ok(Some(Value::List(items)))
        },
        ParamType::Map if !node.children.is_empty() => {
            let mut entries = BTreeMap::new();
            for child in &node.children {
                let text = child.value.as_deref().unwrap_or_default();
                if let Some(value) = context.evaluator.evaluate(text, None)? {
                    entries.insert(child.name.clone(), value);
                }
            }
            Ok(Some(Value::Map(entries)))
        },
        _ => match &node.value {
            Some(text) => context.evaluator.evaluate(text, Some(&parameter.kind)),
            None => Ok(None),
        },
    }
}

fn default_value(
    node: Option<&ConfigNode>,
    parameter: &Parameter,
    context: &ConfigurationContext<'_>,
) -> PluginResult<Option<Value>> {
    let default = node
        .and_then(|n| n.attribute(DEFAULT_VALUE_ATTRIBUTE))
        .or(parameter.default_value.as_deref());
    match default {
        Some(text) => context.evaluator.evaluate(text, Some(&parameter.kind)),
        None => Ok(None),
    }
}

fn align(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Convert an evaluated value to the parameter's declared type.
fn coerce(value: Value, parameter: &Parameter, base: &Path) -> Result<Value, String> {
    let mismatch = |value: &Value| {
        format!(
            "parameter '{}' expects a {} but got a {} ({})",
            parameter.name,
            parameter.kind,
            value.kind(),
            value.to_text()
        )
    };
    match (&parameter.kind, value) {
        (ParamType::String, Value::Str(s)) => Ok(Value::Str(s)),
        (ParamType::String, v @ (Value::Bool(_) | Value::Int(_) | Value::Path(_))) => {
            Ok(Value::Str(v.to_text()))
        },
        (ParamType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (ParamType::Boolean, Value::Str(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch(&Value::Str(s))),
        },
        (ParamType::Int, Value::Int(i)) => Ok(Value::Int(i)),
        (ParamType::Int, Value::Str(s)) => s
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| mismatch(&Value::Str(s))),
        (ParamType::Path, Value::Path(p)) => Ok(Value::Path(align(&p, base))),
        (ParamType::Path, Value::Str(s)) => Ok(Value::Path(align(Path::new(&s), base))),
        (ParamType::List, Value::List(items)) => Ok(Value::List(items)),
        (ParamType::List, Value::Str(s)) => Ok(Value::List(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(Value::from)
                .collect(),
        )),
        (ParamType::Map, Value::Map(map)) => Ok(Value::Map(map)),
        (ParamType::Object(class), Value::Object(o)) if o.class_name() == class => {
            Ok(Value::Object(o))
        },
        (_, other) => Err(mismatch(&other)),
    }
}

/// An object parameter's class must come from the host realm; a copy
/// bundled with the plugin is a different class.
fn check_linkage(parameter: &Parameter, context: &ConfigurationContext<'_>) -> PluginResult<()> {
    let ParamType::Object(class) = &parameter.kind else {
        return Ok(());
    };
    match context.realm.load_class(class) {
        Some(loaded) if loaded.realm != *context.core.id() => Err(PluginError::Configuration {
            plugin: context.plugin.to_string(),
            goal: Some(context.mojo.goal.clone()),
            message: format!(
                "class {class} for parameter '{}' is loaded from {} in realm {} instead of the host realm {}; \
                 the plugin bundles an incompatible copy of a host API",
                parameter.name,
                loaded.location.display(),
                loaded.realm,
                context.core.id()
            ),
            diagnostics: Some(context.realm_diagnostics()),
        }),
        _ => Ok(()),
    }
}

fn field_error(error: MojoError, context: &ConfigurationContext<'_>) -> PluginError {
    match error {
        MojoError::Linkage { class_name, message } => PluginError::Configuration {
            plugin: context.plugin.to_string(),
            goal: Some(context.mojo.goal.clone()),
            message: format!("class {class_name} could not be linked: {message}"),
            diagnostics: Some(context.realm_diagnostics()),
        },
        other => context.error(other.to_string()),
    }
}

fn missing_message(missing: &[&Parameter], context: &ConfigurationContext<'_>) -> String {
    let names: Vec<String> = missing.iter().map(|p| format!("'{}'", p.name)).collect();
    let mut message = format!(
        "the parameters {} for goal {} are missing or invalid",
        names.join(", "),
        context.mojo.full_goal_name(context.goal_prefix)
    );
    for parameter in missing {
        message.push_str(&format!(
            "\n  - '{}': add <configuration><{}>VALUE</{}></configuration> to the plugin declaration",
            parameter.name, parameter.name, parameter.name
        ));
        if let Some(property) = parameter.property_name() {
            message.push_str(&format!(" or pass -D{property}=VALUE on the command line"));
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use anvil_core::{
        ExecutionRequest, LocalRepository, PluginCoordinate, Project, RepositoryContext, Session,
        Settings,
    };

    use super::*;
    use crate::execution::MojoExecution;
    use crate::mojo::MojoContext;
    use crate::realm::{ClassRealmBuilder, ClasspathEntry, RealmId, class_resource};

    #[derive(Default)]
    struct Fields(BTreeMap<String, Value>);

    impl Mojo for Fields {
        fn execute(&mut self, _context: &MojoContext<'_>) -> Result<(), MojoError> {
            Ok(())
        }

        fn configure_field(&mut self, name: &str, value: Value) -> Result<(), MojoError> {
            if name == "broken" {
                return Err(MojoError::Linkage {
                    class_name: "org.lib.Thing".into(),
                    message: "loader constraint violation".into(),
                });
            }
            self.0.insert(name.to_string(), value);
            Ok(())
        }
    }

    fn session() -> Session {
        Session::new(
            ExecutionRequest::new("/work").with_user_property("compiler.debug", "false"),
            Settings::new("/repo"),
            RepositoryContext::new(LocalRepository::new("/repo")),
        )
        .with_projects(vec![Arc::new(Project::new("g", "app", "1", "/work/app"))])
    }

    fn realm(id: &str, classes: &[&str]) -> Arc<ClassRealm> {
        let names: BTreeSet<String> = classes.iter().map(|c| class_resource(c)).collect();
        Arc::new(
            ClassRealmBuilder::new(RealmId::new(id))
                .with_entry(ClasspathEntry::new(format!("/jars/{id}.jar"), Arc::new(names)))
                .build(),
        )
    }

    fn run(
        mojo: &MojoDescriptor,
        configuration: Option<&ConfigNode>,
        plugin_realm: &Arc<ClassRealm>,
        core: &Arc<ClassRealm>,
    ) -> PluginResult<Fields> {
        let session = session();
        let evaluator = ExpressionEvaluator::new(&session);
        let context = ConfigurationContext {
            plugin: "g:p:1",
            goal_prefix: "p",
            mojo,
            configuration,
            evaluator: &evaluator,
            realm: plugin_realm,
            core,
        };
        let mut fields = Fields::default();
        BasicConfigurator.configure(&mut fields, &context)?;
        Ok(fields)
    }

    fn compile_mojo() -> MojoDescriptor {
        MojoDescriptor::new("compile", "org.example.Compile")
            .with_parameter(
                Parameter::new("debug", ParamType::Boolean)
                    .with_expression("${compiler.debug}")
                    .with_default("true"),
            )
            .with_parameter(Parameter::new("outputDirectory", ParamType::Path).with_default("target/classes"))
            .with_parameter(Parameter::new("includes", ParamType::List).with_alias("include"))
            .with_parameter(Parameter::new("level", ParamType::Int))
    }

    #[test]
    fn test_configures_typed_fields() {
        let mojo = compile_mojo();
        let configuration = ConfigNode::merge(
            Some(
                &ConfigNode::new("configuration")
                    .with_child(
                        ConfigNode::new("include")
                            .with_child(ConfigNode::leaf("include", "**/*.rs"))
                            .with_child(ConfigNode::leaf("include", "**/*.toml")),
                    )
                    .with_child(ConfigNode::leaf("level", "3")),
            ),
            Some(&mojo.default_configuration()),
        );
        let core = realm("core", &[]);
        let fields = run(&mojo, configuration.as_ref(), &core, &core).unwrap();
        assert_eq!(fields.0["debug"], Value::Bool(false));
        assert_eq!(
            fields.0["outputDirectory"],
            Value::Path(PathBuf::from("/work/app/target/classes"))
        );
        assert_eq!(
            fields.0["includes"],
            Value::List(vec![Value::from("**/*.rs"), Value::from("**/*.toml")])
        );
        assert_eq!(fields.0["level"], Value::Int(3));
    }

    #[test]
    fn test_alias_survives_finalized_configuration() {
        let mojo = Arc::new(
            MojoDescriptor::new("compile", "org.example.Compile").with_parameter(
                Parameter::new("includes", ParamType::List)
                    .with_alias("include")
                    .with_expression("${includes}"),
            ),
        );
        let mut execution = MojoExecution::new(PluginCoordinate::new("g", "p", "1"), "compile")
            .with_configuration(
                ConfigNode::new("configuration").with_child(ConfigNode::leaf("include", "**/*.rs")),
            );
        execution.finalize_configuration(mojo.clone());

        let configuration = execution.configuration.as_ref().unwrap();
        assert!(configuration.child("include").is_none());
        assert_eq!(
            configuration.child("includes").unwrap().value.as_deref(),
            Some("**/*.rs")
        );

        let core = realm("core", &[]);
        let fields = run(&mojo, Some(configuration), &core, &core).unwrap();
        assert_eq!(fields.0["includes"], Value::List(vec![Value::from("**/*.rs")]));
    }

    #[test]
    fn test_name_wins_over_alias() {
        let mojo = Arc::new(
            MojoDescriptor::new("compile", "org.example.Compile")
                .with_parameter(Parameter::new("level", ParamType::Int).with_alias("lvl")),
        );
        let mut execution = MojoExecution::new(PluginCoordinate::new("g", "p", "1"), "compile")
            .with_configuration(
                ConfigNode::new("configuration")
                    .with_child(ConfigNode::leaf("lvl", "1"))
                    .with_child(ConfigNode::leaf("level", "2")),
            );
        execution.finalize_configuration(mojo.clone());

        let core = realm("core", &[]);
        let fields = run(&mojo, execution.configuration.as_ref(), &core, &core).unwrap();
        assert_eq!(fields.0["level"], Value::Int(2));
    }

    #[test]
    fn test_missing_required_names_sources() {
        let mojo = MojoDescriptor::new("deploy", "org.example.Deploy").with_parameter(
            Parameter::new("url", ParamType::String)
                .required()
                .with_expression("${deploy.url}"),
        );
        let configuration = mojo.default_configuration();
        let core = realm("core", &[]);
        let Err(PluginError::Configuration { message, .. }) =
            run(&mojo, Some(&configuration), &core, &core)
        else {
            panic!("expected a configuration error");
        };
        assert!(message.contains("'url'"));
        assert!(message.contains("p:deploy"));
        assert!(message.contains("-Ddeploy.url"));
        assert!(message.contains("<configuration><url>"));
    }

    #[test]
    fn test_type_mismatch() {
        let mojo = MojoDescriptor::new("run", "org.example.Run")
            .with_parameter(Parameter::new("level", ParamType::Int));
        let configuration = ConfigNode::new("configuration").with_child(ConfigNode::leaf("level", "high"));
        let core = realm("core", &[]);
        let err = run(&mojo, Some(&configuration), &core, &core).err().unwrap();
        assert!(err.to_string().contains("expects a int"));
    }

    #[test]
    fn test_read_only_parameter() {
        let mojo = MojoDescriptor::new("run", "org.example.Run").with_parameter(Parameter {
            editable: false,
            ..Parameter::new("basedir", ParamType::Path).with_expression("${basedir}")
        });
        let configuration = ConfigNode::new("configuration").with_child(ConfigNode::leaf("basedir", "/elsewhere"));
        let core = realm("core", &[]);
        let err = run(&mojo, Some(&configuration), &core, &core).err().unwrap();
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_bundled_api_copy_reports_diagnostics() {
        let core = realm("core", &["anvil.api.Thing"]);
        let plugin = realm("plugin", &["anvil.api.Thing"]);
        let mojo = MojoDescriptor::new("run", "org.example.Run").with_parameter(
            Parameter::new("thing", ParamType::Object("anvil.api.Thing".into())).with_expression("${thing}"),
        );
        let Err(PluginError::Configuration { diagnostics, .. }) =
            run(&mojo, Some(&mojo.default_configuration()), &plugin, &core)
        else {
            panic!("expected a configuration error");
        };
        let diagnostics = diagnostics.unwrap();
        assert!(diagnostics.contains("/jars/plugin.jar"));
        assert!(diagnostics.contains("/jars/core.jar"));
    }

    #[test]
    fn test_field_linkage_error_carries_diagnostics() {
        let mojo = MojoDescriptor::new("run", "org.example.Run")
            .with_parameter(Parameter::new("broken", ParamType::String));
        let configuration = ConfigNode::new("configuration").with_child(ConfigNode::leaf("broken", "x"));
        let core = realm("core", &[]);
        let err = run(&mojo, Some(&configuration), &core, &core).err().unwrap();
        assert!(err.diagnostics().is_some());
    }

    #[test]
    fn test_unknown_configurator() {
        let registry = ConfiguratorRegistry::new();
        let mojo = MojoDescriptor::new("run", "org.example.Run").with_configurator("fancy");
        assert!(matches!(
            registry.lookup("g:p:1", &mojo),
            Err(PluginError::Configuration { .. })
        ));
        assert!(registry.lookup("g:p:1", &MojoDescriptor::new("run", "x")).is_ok());
    }
}
