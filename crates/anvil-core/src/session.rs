//! Build session state shared by every mojo execution of one build.

use std::any::Any;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use crate::project::Project;
use crate::repository::{LocalRepository, RepositoryContext};
use crate::settings::Settings;
use crate::value::{PropertyAccess, PropertyResult, PropertyTable, Value, string_map};

/// Per-(plugin, project) scratch space shared between mojos of one plugin.
pub type PluginContext = DashMap<String, Value>;

/// What the user asked the build to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionRequest {
    /// Properties given on the command line (`-Dkey=value`).
    pub user_properties: BTreeMap<String, String>,
    /// Process environment and runtime properties.
    pub system_properties: BTreeMap<String, String>,
    /// Directory the build was started in.
    pub base_directory: PathBuf,
    /// Requested goals and phases.
    pub goals: Vec<String>,
}

impl ExecutionRequest {
    /// A request rooted at `base_directory`.
    #[must_use]
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
            ..Self::default()
        }
    }

    /// Set a user property.
    #[must_use]
    pub fn with_user_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_properties.insert(key.into(), value.into());
        self
    }

    /// Set a system property.
    #[must_use]
    pub fn with_system_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.system_properties.insert(key.into(), value.into());
        self
    }
}

/// A build session.
///
/// Cloning is cheap; clones made with [`Session::with_current_project`]
/// share the plugin context store with the original.
#[derive(Debug, Clone)]
pub struct Session {
    request: Arc<ExecutionRequest>,
    settings: Arc<Settings>,
    repositories: Arc<RepositoryContext>,
    projects: Arc<Vec<Arc<Project>>>,
    current: Option<Arc<Project>>,
    plugin_contexts: Arc<DashMap<String, Arc<PluginContext>>>,
}

impl Session {
    /// Create a session with no reactor projects.
    #[must_use]
    pub fn new(request: ExecutionRequest, settings: Settings, repositories: RepositoryContext) -> Self {
        Self {
            request: Arc::new(request),
            settings: Arc::new(settings),
            repositories: Arc::new(repositories),
            projects: Arc::new(Vec::new()),
            current: None,
            plugin_contexts: Arc::new(DashMap::new()),
        }
    }

    /// Set the reactor projects. The first becomes the current project.
    #[must_use]
    pub fn with_projects(mut self, projects: Vec<Arc<Project>>) -> Self {
        self.current = projects.first().cloned();
        self.projects = Arc::new(projects);
        self
    }

    /// A view of this session focused on `project`.
    #[must_use]
    pub fn with_current_project(&self, project: Arc<Project>) -> Self {
        Self {
            current: Some(project),
            ..self.clone()
        }
    }

    /// The execution request.
    #[must_use]
    pub fn request(&self) -> &ExecutionRequest {
        &self.request
    }

    /// User settings.
    #[must_use]
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Repository context used for resolutions in this session.
    #[must_use]
    pub fn repositories(&self) -> &RepositoryContext {
        &self.repositories
    }

    /// Reactor projects in build order.
    #[must_use]
    pub fn projects(&self) -> &[Arc<Project>] {
        &self.projects
    }

    /// Project currently being built.
    #[must_use]
    pub fn current_project(&self) -> Option<&Arc<Project>> {
        self.current.as_ref()
    }

    /// Command-line properties.
    #[must_use]
    pub fn user_properties(&self) -> &BTreeMap<String, String> {
        &self.request.user_properties
    }

    /// System properties.
    #[must_use]
    pub fn system_properties(&self) -> &BTreeMap<String, String> {
        &self.request.system_properties
    }

    /// Directory the build was started in.
    #[must_use]
    pub fn execution_root_directory(&self) -> &PathBuf {
        &self.request.base_directory
    }

    /// The context shared by mojos of `plugin_key` on `project_id`,
    /// created on first use.
    #[must_use]
    pub fn plugin_context(&self, plugin_key: &str, project_id: &str) -> Arc<PluginContext> {
        let key = format!("{plugin_key}#{project_id}");
        Arc::clone(
            self.plugin_contexts
                .entry(key)
                .or_insert_with(|| Arc::new(DashMap::new()))
                .value(),
        )
    }
}

static SESSION: LazyLock<PropertyTable<Session>> = LazyLock::new(|| {
    PropertyTable::<Session>::new("anvil.session.Session")
        .property("executionRootDirectory", |s| {
            Some(Value::from(s.execution_root_directory().as_path()))
        })
        .property("userProperties", |s| Some(string_map(s.user_properties())))
        .property("systemProperties", |s| {
            Some(string_map(s.system_properties()))
        })
        .property("goals", |s| {
            Some(Value::List(s.request.goals.iter().map(Value::from).collect()))
        })
        .property("settings", |s| Some(Value::Object(s.settings.clone())))
        .property("localRepository", |s| {
            Some(Value::Object(Arc::new(s.repositories.local.clone())))
        })
        .property("currentProject", |s| {
            s.current.clone().map(|p| Value::Object(p))
        })
        .property("projects", |s| {
            Some(Value::List(
                s.projects
                    .iter()
                    .map(|p| Value::Object(p.clone()))
                    .collect(),
            ))
        })
        .property("offline", |s| Some(Value::Bool(s.settings.offline)))
});

impl PropertyAccess for Session {
    fn class_name(&self) -> &str {
        SESSION.class_name()
    }

    fn property(&self, name: &str) -> PropertyResult {
        SESSION.get(self, name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

static LOCAL_REPOSITORY: LazyLock<PropertyTable<LocalRepository>> = LazyLock::new(|| {
    PropertyTable::<LocalRepository>::new("anvil.repository.LocalRepository")
        .property("basedir", |r| Some(Value::from(r.basedir.as_path())))
        .property("url", |r| {
            Some(Value::Str(format!("file://{}", r.basedir.display())))
        })
});

impl PropertyAccess for LocalRepository {
    fn class_name(&self) -> &str {
        LOCAL_REPOSITORY.class_name()
    }

    fn property(&self, name: &str) -> PropertyResult {
        LOCAL_REPOSITORY.get(self, name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            ExecutionRequest::new("/work").with_user_property("skipTests", "true"),
            Settings::new("/repo"),
            RepositoryContext::new(LocalRepository::new("/repo")),
        )
    }

    #[test]
    fn test_with_projects_sets_current() {
        let a = Arc::new(Project::new("g", "a", "1", "/work/a"));
        let b = Arc::new(Project::new("g", "b", "1", "/work/b"));
        let s = session().with_projects(vec![a.clone(), b.clone()]);
        assert!(Arc::ptr_eq(s.current_project().unwrap(), &a));

        let focused = s.with_current_project(b.clone());
        assert!(Arc::ptr_eq(focused.current_project().unwrap(), &b));
        assert_eq!(focused.projects().len(), 2);
    }

    #[test]
    fn test_plugin_context_shared_across_views() {
        let project = Arc::new(Project::new("g", "a", "1", "/work/a"));
        let s = session().with_projects(vec![project.clone()]);
        let view = s.with_current_project(project.clone());

        s.plugin_context("org.anvil:compiler", &project.id())
            .insert("compiled".into(), Value::Bool(true));

        let ctx = view.plugin_context("org.anvil:compiler", &project.id());
        assert_eq!(ctx.get("compiled").map(|v| v.clone()), Some(Value::Bool(true)));
        assert!(view.plugin_context("org.anvil:jar", &project.id()).is_empty());
    }

    #[test]
    fn test_session_properties() {
        let s = session();
        let Some(Value::Map(props)) = s.property("userProperties").unwrap() else {
            panic!("userProperties should be a map");
        };
        assert_eq!(props.get("skipTests"), Some(&Value::from("true")));

        let repo = s.property("localRepository").unwrap().unwrap();
        assert_eq!(
            repo.as_object().unwrap().property("basedir").unwrap(),
            Some(Value::Path("/repo".into()))
        );
        assert_eq!(s.property("currentProject").unwrap(), None);
    }
}
