//! Plugin loading, realm setup and mojo configuration.

use std::sync::Arc;

use anvil_core::{Artifact, DependencyFilter, PluginCoordinate, RepositoryContext, Session};

use crate::cache::{
    ExtensionRealmKey, ExtensionRealmRecord, PluginArtifactsKey, PluginCaches, PluginDescriptorKey,
    PluginRealmKey, PluginRealmRecord,
};
use crate::configurator::{ConfigurationContext, ConfiguratorRegistry};
use crate::descriptor::{
    DescriptorParser, EXTENSION_DESCRIPTOR_PATH, ExtensionDescriptor, MojoDescriptor,
    PLUGIN_DESCRIPTOR_PATH, PluginDescriptor, RuntimePluginDescriptor, TomlDescriptorParser,
};
use crate::error::{PluginError, PluginResult};
use crate::execution::MojoExecution;
use crate::expression::{EvaluationMode, ExpressionEvaluator};
use crate::mojo::{ComponentRegistry, MOJO_API_CLASS, Mojo, MojoLog};
use crate::options::PluginManagerOptions;
use crate::project_deps::ProjectDependencyResolver;
use crate::realm::{
    ArtifactContents, ClassRealm, ContextRealm, CoreExports, ForeignImport, ImportPattern,
    RealmManager,
};
use crate::resolver::{ArtifactResolver, PluginDependenciesResolver};

/// Resolves plugins, builds their realms and produces configured mojos.
///
/// Every step is cached in [`PluginCaches`]; a failure is cached as well and
/// returned again for the same inputs.
#[derive(Debug)]
pub struct PluginManager {
    resolver: PluginDependenciesResolver,
    realms: Arc<RealmManager>,
    caches: Arc<PluginCaches>,
    components: ComponentRegistry,
    configurators: ConfiguratorRegistry,
    parser: Arc<dyn DescriptorParser>,
    options: PluginManagerOptions,
}

impl PluginManager {
    /// Create a manager with empty caches and the TOML descriptor parser.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn ArtifactResolver>,
        contents: Arc<dyn ArtifactContents>,
        options: PluginManagerOptions,
    ) -> Self {
        let exports = CoreExports::default().with_extra(&options.extra_core_exports);
        let core_filter = exports.artifact_filter();
        Self {
            resolver: PluginDependenciesResolver::new(resolver, core_filter),
            realms: Arc::new(RealmManager::new(contents, exports)),
            caches: Arc::new(PluginCaches::new()),
            components: ComponentRegistry::new(),
            configurators: ConfiguratorRegistry::new(),
            parser: Arc::new(TomlDescriptorParser),
            options,
        }
    }

    /// Use shared caches.
    #[must_use]
    pub fn with_caches(mut self, caches: Arc<PluginCaches>) -> Self {
        self.caches = caches;
        self
    }

    /// Use a component registry.
    #[must_use]
    pub fn with_components(mut self, components: ComponentRegistry) -> Self {
        self.components = components;
        self
    }

    /// Use a configurator registry.
    #[must_use]
    pub fn with_configurators(mut self, configurators: ConfiguratorRegistry) -> Self {
        self.configurators = configurators;
        self
    }

    /// Use another descriptor parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn DescriptorParser>) -> Self {
        self.parser = parser;
        self
    }

    /// The caches.
    #[must_use]
    pub fn caches(&self) -> &Arc<PluginCaches> {
        &self.caches
    }

    /// The realm manager.
    #[must_use]
    pub fn realms(&self) -> &Arc<RealmManager> {
        &self.realms
    }

    /// The component registry.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// The configurator registry.
    #[must_use]
    pub fn configurators(&self) -> &ConfiguratorRegistry {
        &self.configurators
    }

    /// The options.
    #[must_use]
    pub fn options(&self) -> &PluginManagerOptions {
        &self.options
    }

    /// The plugin resolution facade.
    #[must_use]
    pub fn resolver(&self) -> &PluginDependenciesResolver {
        &self.resolver
    }

    /// A resolver for project dependencies sharing this manager's caches.
    #[must_use]
    pub fn project_dependencies(&self) -> ProjectDependencyResolver {
        ProjectDependencyResolver::new(self.resolver.resolver().clone(), self.caches.clone())
    }

    /// The raw descriptor of `plugin`, parsed from its artifact on first use.
    ///
    /// # Errors
    ///
    /// Resolution errors for the plugin artifact,
    /// [`PluginError::DescriptorParsing`] if the descriptor is missing or
    /// malformed, [`PluginError::InvalidDescriptor`] if it does not describe
    /// the resolved artifact.
    pub fn load_plugin(
        &self,
        plugin: &PluginCoordinate,
        repositories: &RepositoryContext,
    ) -> PluginResult<Arc<PluginDescriptor>> {
        self.load_descriptor(plugin, repositories, None)
    }

    /// [`PluginManager::load_plugin`] with the session's repositories, on
    /// behalf of its current project.
    ///
    /// # Errors
    ///
    /// Same as [`PluginManager::load_plugin`].
    pub fn load_session_plugin(
        &self,
        plugin: &PluginCoordinate,
        session: &Session,
    ) -> PluginResult<Arc<PluginDescriptor>> {
        let project = session.current_project().map(|p| p.id());
        self.load_descriptor(plugin, session.repositories(), project.as_deref())
    }

    fn load_descriptor(
        &self,
        plugin: &PluginCoordinate,
        repositories: &RepositoryContext,
        project: Option<&str>,
    ) -> PluginResult<Arc<PluginDescriptor>> {
        let key = PluginDescriptorKey::new(plugin, repositories);
        self.caches.descriptors.get_or_populate(project, key, || {
            let artifact = self.resolver.resolve_plugin(plugin, repositories)?;
            self.extract_descriptor(plugin, &artifact).map(Arc::new)
        })
    }

    fn extract_descriptor(&self, plugin: &PluginCoordinate, artifact: &Artifact) -> PluginResult<PluginDescriptor> {
        let plugin_id = plugin.id();
        let parse_error = |source_path: String, message: String| PluginError::DescriptorParsing {
            plugin: plugin_id.clone(),
            source_path,
            message,
        };
        let location = artifact.file.as_deref().ok_or_else(|| {
            parse_error(artifact.id(), "plugin artifact has not been resolved to a file".into())
        })?;
        let source = format!("{}!/{PLUGIN_DESCRIPTOR_PATH}", location.display());

        let bytes = self
            .realms
            .contents()
            .read(location, PLUGIN_DESCRIPTOR_PATH)
            .map_err(|e| parse_error(source.clone(), e.to_string()))?
            .ok_or_else(|| parse_error(source.clone(), "descriptor not found".into()))?;
        let descriptor = self
            .parser
            .parse(&bytes, &source)
            .map_err(|message| parse_error(source.clone(), message))?;

        descriptor
            .validate(artifact)
            .map_err(|problems| PluginError::InvalidDescriptor {
                plugin: plugin_id.clone(),
                problems,
            })?;
        tracing::debug!(
            plugin = %plugin_id,
            source = %source,
            goals = descriptor.mojos.len(),
            "Loaded plugin descriptor"
        );
        Ok(descriptor)
    }

    /// The descriptor of one goal.
    ///
    /// # Errors
    ///
    /// Everything [`PluginManager::load_plugin`] returns, and
    /// [`PluginError::MojoNotFound`] if the plugin has no such goal.
    pub fn get_mojo_descriptor(
        &self,
        plugin: &PluginCoordinate,
        goal: &str,
        repositories: &RepositoryContext,
    ) -> PluginResult<Arc<MojoDescriptor>> {
        let descriptor = self.load_plugin(plugin, repositories)?;
        mojo_of(&descriptor, goal)
    }

    /// Check the plugin's runtime version requirement.
    ///
    /// # Errors
    ///
    /// [`PluginError::Incompatible`] if the running version does not satisfy
    /// the requirement, or either side is not valid semver.
    pub fn check_prerequisites(&self, descriptor: &PluginDescriptor) -> PluginResult<()> {
        let Some(required) = descriptor.required_runtime_version.as_deref() else {
            return Ok(());
        };
        let incompatible = || PluginError::Incompatible {
            plugin: descriptor.id(),
            required: required.to_string(),
            actual: self.options.runtime_version.clone(),
        };
        let requirement = semver::VersionReq::parse(required).map_err(|_| incompatible())?;
        let actual = semver::Version::parse(&self.options.runtime_version).map_err(|_| incompatible())?;
        if requirement.matches(&actual) {
            Ok(())
        } else {
            Err(incompatible())
        }
    }

    /// Resolve the plugin's closure, cached per plugin, filter and
    /// repositories. The plugin artifact comes first.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`] or [`PluginError::Resolution`].
    pub fn resolve_plugin_artifacts(
        &self,
        plugin: &PluginCoordinate,
        filter: Option<&DependencyFilter>,
        session: &Session,
    ) -> PluginResult<Arc<Vec<Artifact>>> {
        let repositories = session.repositories();
        let key = PluginArtifactsKey::new(plugin, filter, repositories);
        let project = session.current_project().map(|p| p.id());
        self.caches
            .plugin_artifacts
            .get_or_populate(project.as_deref(), key, || {
                let artifact = self.resolver.resolve_plugin(plugin, repositories)?;
                self.resolver
                    .resolve_closure(plugin, &artifact, filter, repositories)
                    .map(Arc::new)
            })
    }

    /// Bind `descriptor` to a realm for `plugin`.
    ///
    /// Realms are cached per plugin, parent, foreign imports, filter and
    /// repositories. A descriptor marked `isolated_realm` ignores `parent`
    /// and `foreign_imports`.
    ///
    /// # Errors
    ///
    /// Resolution errors for the closure, or [`PluginError::Manager`] /
    /// [`PluginError::CompatibilityImport`] if the realm cannot be built.
    pub fn setup_plugin_realm(
        &self,
        plugin: &PluginCoordinate,
        descriptor: Arc<PluginDescriptor>,
        session: &Session,
        parent: Option<&Arc<ClassRealm>>,
        foreign_imports: &[ForeignImport],
        filter: Option<&DependencyFilter>,
    ) -> PluginResult<Arc<RuntimePluginDescriptor>> {
        let (parent, foreign_imports) = if descriptor.isolated_realm {
            (None, &[][..])
        } else {
            (parent, foreign_imports)
        };
        let repositories = session.repositories();
        let key = PluginRealmKey::new(
            plugin,
            parent.map(|p| p.id()),
            foreign_imports,
            filter,
            repositories,
        );
        let project = session.current_project().map(|p| p.id());

        let record = self
            .caches
            .plugin_realms
            .get_or_populate(project.as_deref(), key, || {
                let artifacts = self.resolve_plugin_artifacts(plugin, filter, session)?;
                let realm =
                    self.realms
                        .create_plugin_realm(plugin, &artifacts, parent, foreign_imports)?;
                Ok(Arc::new(PluginRealmRecord {
                    realm,
                    artifacts: artifacts.as_ref().clone(),
                }))
            })?;

        let plugin_artifact = record
            .artifacts
            .first()
            .cloned()
            .ok_or_else(|| PluginError::Manager {
                plugin: plugin.id(),
                message: "plugin realm was built without the plugin artifact".into(),
            })?;
        Ok(Arc::new(RuntimePluginDescriptor {
            raw: descriptor,
            plugin_artifact,
            artifacts: record.artifacts.clone(),
            realm: record.realm.clone(),
        }))
    }

    /// Build, or reuse, the realm of a build extension and read what it
    /// exports.
    ///
    /// The record is keyed by the extension's files as they are on disk.
    ///
    /// # Errors
    ///
    /// Resolution errors, realm errors, or
    /// [`PluginError::DescriptorParsing`] for a malformed extension
    /// descriptor.
    pub fn setup_extensions_realm(
        &self,
        plugin: &PluginCoordinate,
        session: &Session,
    ) -> PluginResult<Arc<ExtensionRealmRecord>> {
        let artifacts = self.resolve_plugin_artifacts(plugin, None, session)?;
        let key = ExtensionRealmKey::new(&artifacts);
        let project = session.current_project().map(|p| p.id());

        self.caches
            .extension_realms
            .get_or_populate(project.as_deref(), key, || {
                let realm = self.realms.create_extension_realm(plugin, &artifacts)?;
                let descriptor = match artifacts.first() {
                    Some(artifact) => self.extension_descriptor(plugin, artifact)?,
                    None => None,
                };
                Ok(Arc::new(ExtensionRealmRecord {
                    realm,
                    artifacts: artifacts.as_ref().clone(),
                    descriptor,
                }))
            })
    }

    fn extension_descriptor(
        &self,
        plugin: &PluginCoordinate,
        artifact: &Artifact,
    ) -> PluginResult<Option<ExtensionDescriptor>> {
        let Some(location) = artifact.file.as_deref() else {
            return Ok(None);
        };
        let source = format!("{}!/{EXTENSION_DESCRIPTOR_PATH}", location.display());
        let parse_error = |message: String| PluginError::DescriptorParsing {
            plugin: plugin.id(),
            source_path: source.clone(),
            message,
        };
        let bytes = self
            .realms
            .contents()
            .read(location, EXTENSION_DESCRIPTOR_PATH)
            .map_err(|e| parse_error(e.to_string()))?;
        bytes
            .map(|b| ExtensionDescriptor::parse(&b).map_err(parse_error))
            .transpose()
    }

    /// Foreign imports making an extension's exported packages visible.
    #[must_use]
    pub fn extension_imports(record: &ExtensionRealmRecord) -> Vec<ForeignImport> {
        record
            .descriptor
            .iter()
            .flat_map(|d| d.exported_packages.iter())
            .map(|p| ForeignImport::new(ImportPattern::parse(p), record.realm.clone()))
            .collect()
    }

    /// Instantiate and configure the mojo for `execution` inside the
    /// plugin's realm.
    ///
    /// # Errors
    ///
    /// [`PluginError::MojoNotFound`], [`PluginError::Container`] if the
    /// implementation cannot be found or linked, or
    /// [`PluginError::Configuration`] if a parameter cannot be satisfied.
    pub fn get_configured_mojo(
        &self,
        session: &Session,
        execution: &MojoExecution,
        plugin: &Arc<RuntimePluginDescriptor>,
    ) -> PluginResult<Box<dyn Mojo>> {
        self.configure_mojo(session, execution, plugin, self.options.evaluation_mode)
    }

    pub(crate) fn configure_mojo(
        &self,
        session: &Session,
        execution: &MojoExecution,
        plugin: &Arc<RuntimePluginDescriptor>,
        mode: EvaluationMode,
    ) -> PluginResult<Box<dyn Mojo>> {
        let plugin_id = plugin.raw.id();
        let mojo_descriptor = match &execution.descriptor {
            Some(d) => d.clone(),
            None => mojo_of(&plugin.raw, &execution.goal)?,
        };
        if mojo_descriptor.requires_project && session.current_project().is_none() {
            return Err(PluginError::Configuration {
                plugin: plugin_id,
                goal: Some(execution.goal.clone()),
                message: "goal requires a project to execute but there is none".into(),
                diagnostics: None,
            });
        }

        let mut execution = execution.clone();
        if execution.descriptor.is_none() {
            execution.finalize_configuration(mojo_descriptor.clone());
        }

        let realm = &plugin.realm;
        self.check_linkage(&plugin_id, &execution.goal, &mojo_descriptor, realm)?;
        let factory = self
            .components
            .lookup(&mojo_descriptor.implementation)
            .ok_or_else(|| PluginError::Container {
                plugin: plugin_id.clone(),
                goal: Some(execution.goal.clone()),
                message: format!(
                    "no component is registered for mojo implementation {}",
                    mojo_descriptor.implementation
                ),
                diagnostics: None,
            })?;

        let _lookup = ContextRealm::enter_lookup(Some(realm.clone()));
        let _context = ContextRealm::enter(Some(realm.clone()));

        let mut mojo = factory.create(&mojo_descriptor);
        mojo.set_log(MojoLog::new(&plugin_id, &execution.goal));
        if mojo.wants_plugin_context() {
            let project = session.current_project().map(|p| p.id()).unwrap_or_default();
            mojo.set_plugin_context(session.plugin_context(&plugin.raw.key(), &project));
        }

        let configurator = self.configurators.lookup(&plugin_id, &mojo_descriptor)?;
        let execution = Arc::new(execution);
        let evaluator = ExpressionEvaluator::new(session)
            .with_execution(execution.clone())
            .with_mojo(mojo_descriptor.clone())
            .with_plugin(plugin.clone())
            .with_mode(mode);
        let goal_prefix = plugin.raw.goal_prefix();
        let context = ConfigurationContext {
            plugin: &plugin_id,
            goal_prefix: &goal_prefix,
            mojo: &mojo_descriptor,
            configuration: execution.configuration.as_ref(),
            evaluator: &evaluator,
            realm,
            core: self.realms.core_realm(),
        };
        if let Err(e) = configurator.configure(mojo.as_mut(), &context) {
            self.release_mojo(mojo, &execution);
            return Err(e);
        }
        tracing::debug!(
            plugin = %plugin_id,
            goal = %execution.goal,
            realm = %realm.id(),
            "Configured mojo"
        );
        Ok(mojo)
    }

    /// The implementation class must be visible in the realm, and the mojo
    /// API it implements must be the host's.
    fn check_linkage(
        &self,
        plugin_id: &str,
        goal: &str,
        mojo: &MojoDescriptor,
        realm: &Arc<ClassRealm>,
    ) -> PluginResult<()> {
        let core = self.realms.core_realm();
        let container = |message: String, diagnostics: Option<String>| PluginError::Container {
            plugin: plugin_id.to_string(),
            goal: Some(goal.to_string()),
            message,
            diagnostics,
        };
        let dump = || format!("{}\n{}", realm.dump(), core.dump());

        if realm.load_class(&mojo.implementation).is_none() {
            return Err(container(
                format!(
                    "mojo implementation {} is not found in realm {}",
                    mojo.implementation,
                    realm.id()
                ),
                Some(realm.dump()),
            ));
        }
        match realm.load_class(MOJO_API_CLASS) {
            Some(api) if api.realm == *core.id() => Ok(()),
            Some(api) => Err(container(
                format!(
                    "{} in realm {} implements {MOJO_API_CLASS} loaded from {} in realm {} instead of the host realm {}",
                    mojo.implementation,
                    realm.id(),
                    api.location.display(),
                    api.realm,
                    core.id()
                ),
                Some(dump()),
            )),
            None => Err(container(
                format!("{MOJO_API_CLASS} is not visible from realm {}", realm.id()),
                Some(dump()),
            )),
        }
    }

    /// Dispose a mojo. Failures are logged and never returned.
    pub fn release_mojo(&self, mut mojo: Box<dyn Mojo>, execution: &MojoExecution) {
        if let Err(e) = mojo.dispose() {
            tracing::warn!(
                plugin = %execution.plugin,
                goal = %execution.goal,
                error = %e,
                "Failed to release mojo"
            );
        }
    }
}

pub(crate) fn mojo_of(descriptor: &PluginDescriptor, goal: &str) -> PluginResult<Arc<MojoDescriptor>> {
    descriptor
        .mojo(goal)
        .cloned()
        .map(Arc::new)
        .ok_or_else(|| PluginError::MojoNotFound {
            plugin: descriptor.id(),
            goal: goal.to_string(),
            available: descriptor.goals(),
        })
}
