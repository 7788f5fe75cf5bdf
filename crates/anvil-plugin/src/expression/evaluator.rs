//! Evaluation of parameter expressions against the build model.

use std::path::PathBuf;
use std::sync::Arc;

use anvil_core::{Project, Session, Value};

use super::ast::{PropertyPath, Segment, TemplatePart, parse_path, parse_template};
use crate::descriptor::{MojoDescriptor, ParamType, RuntimePluginDescriptor};
use crate::error::{PluginError, PluginResult};
use crate::execution::MojoExecution;

/// Deepest chain of expressions resolving to further expressions.
pub const MAX_EXPRESSION_DEPTH: usize = 32;

/// How unresolved expressions are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvaluationMode {
    /// An unresolved expression yields no value.
    #[default]
    Standard,
    /// An unresolved expression yields its own `${...}` text.
    Legacy,
}

/// Resolves `${...}` expressions for one mojo execution.
///
/// Roots: `session`, `project` (alias `pom`), `executedProject`,
/// `mojoExecution`, `mojo`, `plugin`, `settings`, `basedir`,
/// `localRepository` and `reactorProjects`. Expressions that do not start
/// with a root, or whose walk yields nothing usable, fall back to user,
/// then system, then project properties.
#[derive(Debug, Clone)]
pub struct ExpressionEvaluator<'a> {
    session: &'a Session,
    project: Option<Arc<Project>>,
    execution: Option<Arc<MojoExecution>>,
    mojo: Option<Arc<MojoDescriptor>>,
    plugin: Option<Arc<RuntimePluginDescriptor>>,
    mode: EvaluationMode,
}

impl<'a> ExpressionEvaluator<'a> {
    /// An evaluator over `session` and its current project.
    #[must_use]
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            project: session.current_project().cloned(),
            execution: None,
            mojo: None,
            plugin: None,
            mode: EvaluationMode::Standard,
        }
    }

    /// Evaluate against another project.
    #[must_use]
    pub fn with_project(mut self, project: Option<Arc<Project>>) -> Self {
        self.project = project;
        self
    }

    /// Expose the execution as `mojoExecution`.
    #[must_use]
    pub fn with_execution(mut self, execution: Arc<MojoExecution>) -> Self {
        self.execution = Some(execution);
        self
    }

    /// Expose the goal's descriptor as `mojo`.
    #[must_use]
    pub fn with_mojo(mut self, mojo: Arc<MojoDescriptor>) -> Self {
        self.mojo = Some(mojo);
        self
    }

    /// Expose the plugin as `plugin`.
    #[must_use]
    pub fn with_plugin(mut self, plugin: Arc<RuntimePluginDescriptor>) -> Self {
        self.plugin = Some(plugin);
        self
    }

    /// Set the evaluation mode.
    #[must_use]
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// The evaluation mode.
    #[must_use]
    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    /// Directory relative paths are resolved against: the project base
    /// directory, or the build's root directory without a project.
    #[must_use]
    pub fn base_directory(&self) -> PathBuf {
        self.project.as_ref().map_or_else(
            || self.session.execution_root_directory().clone(),
            |p| p.basedir.clone(),
        )
    }

    /// Evaluate a configuration value.
    ///
    /// Text without expressions comes back unchanged apart from `$$`
    /// collapsing to `$`. A value that is exactly one expression yields the
    /// expression's value, which may be any [`Value`]; `expected` lets a
    /// walk result of the wrong type be discarded in favor of the property
    /// fallback. Mixed text renders every resolved expression as text.
    ///
    /// # Errors
    ///
    /// [`PluginError::ExpressionEvaluation`] if a property getter fails or
    /// expressions nest deeper than [`MAX_EXPRESSION_DEPTH`].
    pub fn evaluate(&self, text: &str, expected: Option<&ParamType>) -> PluginResult<Option<Value>> {
        self.evaluate_at(text, expected, 0)
    }

    fn evaluate_at(
        &self,
        text: &str,
        expected: Option<&ParamType>,
        depth: usize,
    ) -> PluginResult<Option<Value>> {
        if depth > MAX_EXPRESSION_DEPTH {
            return Err(PluginError::ExpressionEvaluation {
                expression: text.to_string(),
                message: format!("expressions nest deeper than {MAX_EXPRESSION_DEPTH} levels"),
            });
        }

        let parts = parse_template(text);
        match parts.as_slice() {
            [TemplatePart::Literal(literal)] => Ok(Some(Value::Str(literal.clone()))),
            [TemplatePart::Expression(expression)] => {
                let value = self.resolve(expression, expected, depth)?;
                Ok(match (value, self.mode) {
                    (Some(v), _) => Some(v),
                    (None, EvaluationMode::Standard) => None,
                    (None, EvaluationMode::Legacy) => Some(Value::Str(text.to_string())),
                })
            },
            _ => {
                let mut rendered = String::new();
                for part in &parts {
                    match part {
                        TemplatePart::Literal(literal) => rendered.push_str(literal),
                        TemplatePart::Expression(expression) => {
                            match self.resolve(expression, None, depth)? {
                                Some(value) => rendered.push_str(&value.to_text()),
                                None => {
                                    rendered.push_str("${");
                                    rendered.push_str(expression);
                                    rendered.push('}');
                                },
                            }
                        },
                    }
                }
                Ok(Some(Value::Str(rendered)))
            },
        }
    }

    fn resolve(
        &self,
        expression: &str,
        expected: Option<&ParamType>,
        depth: usize,
    ) -> PluginResult<Option<Value>> {
        if let Some(path) = parse_path(expression)
            && let Some(root) = self.root(&path.root)
        {
            match walk(root, &path, expression)? {
                Some(value)
                    if matches!(value, Value::Str(_))
                        || expected.is_none_or(|t| t.accepts(&value)) =>
                {
                    return self.nested(value, expected, depth);
                },
                Some(value) => {
                    tracing::debug!(
                        expression,
                        found = value.kind(),
                        expected = %expected.map(ToString::to_string).unwrap_or_default(),
                        "Discarding expression value of the wrong type"
                    );
                },
                None => {},
            }
        }

        let property = self
            .session
            .user_properties()
            .get(expression)
            .or_else(|| self.session.system_properties().get(expression))
            .or_else(|| self.project.as_ref().and_then(|p| p.properties.get(expression)));
        match property {
            Some(value) => self.nested(Value::Str(value.clone()), expected, depth),
            None => Ok(None),
        }
    }

    fn nested(
        &self,
        value: Value,
        expected: Option<&ParamType>,
        depth: usize,
    ) -> PluginResult<Option<Value>> {
        match value {
            Value::Str(s) if s.contains("${") => {
                self.evaluate_at(&s, expected, depth.saturating_add(1))
            },
            other => Ok(Some(other)),
        }
    }

    fn root(&self, name: &str) -> Option<Value> {
        match name {
            "session" => Some(Value::Object(Arc::new(self.session.clone()))),
            "project" | "pom" | "executedProject" => {
                self.project.clone().map(|p| Value::Object(p))
            },
            "mojoExecution" => self.execution.clone().map(|e| Value::Object(e)),
            "mojo" => self.mojo.clone().map(|m| Value::Object(m)),
            "plugin" => self.plugin.clone().map(|p| Value::Object(p)),
            "settings" => Some(Value::Object(self.session.settings().clone())),
            "basedir" => Some(Value::Path(self.base_directory())),
            "localRepository" => Some(Value::Object(Arc::new(
                self.session.repositories().local.clone(),
            ))),
            "reactorProjects" => Some(Value::List(
                self.session
                    .projects()
                    .iter()
                    .map(|p| Value::Object(p.clone()))
                    .collect(),
            )),
            _ => None,
        }
    }
}

fn walk(root: Value, path: &PropertyPath, expression: &str) -> PluginResult<Option<Value>> {
    let mut current = root;
    for segment in &path.segments {
        let next = match (segment, &current) {
            (Segment::Property(name) | Segment::Key(name), Value::Object(object)) => object
                .property(name)
                .map_err(|e| PluginError::ExpressionEvaluation {
                    expression: format!("${{{expression}}}"),
                    message: e.to_string(),
                })?,
            (Segment::Property(name) | Segment::Key(name), Value::Map(map)) => map.get(name).cloned(),
            (Segment::Index(index), Value::List(items)) => items.get(*index).cloned(),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}
