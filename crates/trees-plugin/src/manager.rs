//! Plugin manager — discovery, dependency-ordered boot, and the
//! activate/deactivate state machine.
//!
//! A discovered directory is either rejected (unreadable or incomplete
//! descriptor, no implementation in the catalog, implementation that does
//! not match its descriptor) or registered. A registered plugin is inactive
//! or active; active plugins are booted, meaning their settings, views,
//! routes and hooks are installed. Every route and hook a plugin installs is
//! tagged with its id, which is how deactivation tears them down.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use trees_core::config::plugin::PluginConfig;
use trees_core::error::{AppError, ErrorKind};
use trees_core::result::AppResult;
use trees_core::traits::{Service, ServiceRegistry, ViewRenderer};

use crate::api::context::{AppRouter, PluginContext};
use crate::descriptor::{DESCRIPTOR_FILE, PluginDescriptor};
use crate::hooks::manager::HookManager;
use crate::loader::PluginCatalog;
use crate::registry::{PluginRegistry, RegisteredPlugin};
use crate::requirements::{RequirementReport, host_errors};
use crate::state::{PluginState, PluginStateStore};
use crate::view::{VIEWS_DIR, View};

/// Builds the view collaborator for a plugin's views directory.
pub type ViewFactory = Arc<dyn Fn(&Path) -> AppResult<Arc<dyn ViewRenderer>> + Send + Sync>;

/// A directory that discovery refused to register.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    /// Candidate directory.
    pub path: PathBuf,
    /// Plugin id, when the descriptor was readable.
    pub plugin_id: Option<String>,
    /// Why it was rejected.
    pub reason: String,
}

/// Listing view of a registered plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginSummary {
    /// Plugin id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display version.
    pub version: String,
    /// Short description.
    pub description: String,
    /// Persisted enabled flag.
    pub enabled: bool,
    /// Whether routes and hooks are installed.
    pub booted: bool,
    /// Declared dependencies.
    pub dependencies: Vec<String>,
    /// Plugin directory.
    pub path: PathBuf,
}

impl From<&RegisteredPlugin> for PluginSummary {
    fn from(plugin: &RegisteredPlugin) -> Self {
        Self {
            id: plugin.descriptor.id.clone(),
            name: plugin.descriptor.name.clone(),
            version: plugin.descriptor.version.clone(),
            description: plugin.descriptor.description.clone(),
            enabled: plugin.enabled,
            booted: plugin.booted,
            dependencies: plugin.descriptor.dependencies.clone(),
            path: plugin.instance.base_path().to_path_buf(),
        }
    }
}

/// Service key holding a plugin's effective settings.
pub fn settings_key(plugin_id: &str) -> String {
    format!("plugin.{plugin_id}.settings")
}

/// Service key holding a plugin's view collaborator.
pub fn view_key(plugin_id: &str) -> String {
    format!("view.{plugin_id}")
}

/// Manages the full lifecycle of plugins: discover, boot, activate, deactivate.
pub struct PluginManager {
    /// Directory scanned by `discover`.
    directory: PathBuf,
    /// Runtime version checked against `requires.runtimeVersion`.
    runtime_version: String,
    /// Capabilities checked against `requires.capabilities`.
    capabilities: Vec<String>,
    /// Implementations keyed by plugin id.
    catalog: PluginCatalog,
    /// Durable state store.
    store: PluginStateStore,
    /// Last state successfully loaded or written.
    state: PluginState,
    /// Registered plugins in discovery order.
    registry: PluginRegistry,
    /// Hook bus shared with the request pipeline.
    hooks: Arc<HookManager>,
    /// Route table shared with the request pipeline.
    router: Arc<AppRouter>,
    /// Service registry.
    services: Arc<dyn ServiceRegistry>,
    /// Builds view collaborators.
    view_factory: ViewFactory,
    /// Plugin id → reason its last boot was skipped or failed.
    boot_errors: BTreeMap<String, String>,
    /// Directories rejected by the last `discover`.
    rejections: Vec<Rejection>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("directory", &self.directory)
            .field("plugins", &self.registry.ids())
            .field("boot_errors", &self.boot_errors)
            .finish()
    }
}

impl PluginManager {
    /// Creates a manager and loads the persisted state once.
    pub fn new(
        config: &PluginConfig,
        catalog: PluginCatalog,
        hooks: Arc<HookManager>,
        router: Arc<AppRouter>,
        services: Arc<dyn ServiceRegistry>,
    ) -> AppResult<Self> {
        let store = PluginStateStore::new(&config.state_file);
        let state = store.load()?;

        debug!(
            directory = %config.directory,
            state_file = %config.state_file,
            persisted = state.plugins.len(),
            "Plugin manager created"
        );

        Ok(Self {
            directory: PathBuf::from(&config.directory),
            runtime_version: config.runtime_version.clone(),
            capabilities: config.capabilities.clone(),
            catalog,
            store,
            state,
            registry: PluginRegistry::new(),
            hooks,
            router,
            services,
            view_factory: Arc::new(|dir: &Path| {
                Ok(Arc::new(View::new(dir)) as Arc<dyn ViewRenderer>)
            }),
            boot_errors: BTreeMap::new(),
            rejections: Vec::new(),
        })
    }

    /// Replaces the view collaborator factory.
    pub fn with_view_factory(mut self, factory: ViewFactory) -> Self {
        self.view_factory = factory;
        self
    }

    /// Scans the plugin directory and registers every valid candidate.
    ///
    /// Bad candidates are logged and skipped. Already-registered plugins are
    /// left untouched, so repeated calls are harmless. Nothing is booted.
    /// Returns the number of newly registered plugins.
    pub fn discover(&mut self) -> AppResult<usize> {
        self.rejections.clear();

        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(directory = %self.directory.display(), "Plugin directory does not exist");
                return Ok(0);
            }
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!(
                        "Cannot scan plugin directory '{}': {e}",
                        self.directory.display()
                    ),
                    e,
                ));
            }
        };

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        candidates.sort();

        let mut registered = 0;
        for dir in candidates {
            if !dir.join(DESCRIPTOR_FILE).is_file() {
                debug!(path = %dir.display(), "Skipping directory without descriptor");
                continue;
            }

            match self.load_candidate(&dir) {
                Ok(Some(plugin)) => {
                    info!(
                        plugin_id = %plugin.descriptor.id,
                        version = %plugin.descriptor.version,
                        enabled = plugin.enabled,
                        "Plugin discovered"
                    );
                    self.registry.insert(plugin);
                    registered += 1;
                }
                Ok(None) => {}
                Err((plugin_id, e)) => {
                    warn!(
                        path = %dir.display(),
                        plugin_id = ?plugin_id,
                        error = %e,
                        "Plugin rejected"
                    );
                    self.rejections.push(Rejection {
                        path: dir,
                        plugin_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if self.registry.is_empty() {
            info!(directory = %self.directory.display(), "No plugins installed");
        }

        info!(
            registered,
            total = self.registry.len(),
            rejected = self.rejections.len(),
            "Plugin discovery complete"
        );

        Ok(registered)
    }

    /// Loads one candidate. `Ok(None)` means it is already registered.
    fn load_candidate(
        &self,
        dir: &Path,
    ) -> Result<Option<RegisteredPlugin>, (Option<String>, AppError)> {
        let descriptor = PluginDescriptor::load(dir).map_err(|e| (None, e))?;
        let id = descriptor.id.clone();
        let reject = |e: AppError| (Some(id.clone()), e);

        if let Some(existing) = self.registry.get(&id) {
            if existing.instance.base_path() == dir {
                return Ok(None);
            }
            return Err(reject(AppError::descriptor(format!(
                "Plugin id '{}' is already registered from '{}'",
                id,
                existing.instance.base_path().display()
            ))));
        }

        let factory = self.catalog.get(&id).ok_or_else(|| {
            reject(AppError::capability(format!(
                "No implementation is registered for plugin '{}'",
                id
            )))
        })?;

        let instance = factory(&descriptor, dir).map_err(|e| {
            reject(AppError::capability(format!(
                "Plugin '{}' could not be constructed: {}",
                id, e.message
            )))
        })?;

        if instance.id() != id {
            return Err(reject(AppError::capability(format!(
                "Implementation reports id '{}' but descriptor declares '{}'",
                instance.id(),
                id
            ))));
        }
        if instance.name().trim().is_empty() || instance.version().trim().is_empty() {
            return Err(reject(AppError::capability(format!(
                "Implementation of '{}' reports an empty name or version",
                id
            ))));
        }

        Ok(Some(RegisteredPlugin {
            enabled: self.state.enabled(&id).unwrap_or(descriptor.enabled),
            overrides: self.state.settings(&id).cloned().unwrap_or_default(),
            descriptor,
            instance,
            booted: false,
            view: None,
        }))
    }

    /// Boots every enabled plugin in dependency order.
    ///
    /// A plugin whose dependency is missing, disabled, failed or part of a
    /// cycle is skipped and its reason recorded in [`Self::boot_errors`].
    /// Returns the number of plugins booted by this pass.
    pub fn boot_plugins(&mut self) -> usize {
        self.boot_errors.clear();

        let pending: Vec<String> = self
            .registry
            .iter()
            .filter(|plugin| plugin.enabled && !plugin.booted)
            .map(|plugin| plugin.descriptor.id.clone())
            .collect();

        if pending.is_empty() {
            debug!(registered = self.registry.len(), "No plugins pending boot");
            return 0;
        }

        let mut failed = HashSet::new();
        let mut stack = Vec::new();
        let before = self.booted_count();

        for id in &pending {
            // Errors are recorded in `boot_errors`; one plugin never stops the pass.
            let _ = self.boot_ordered(id, &mut stack, &mut failed);
        }

        let total = self.booted_count();
        info!(
            booted = total,
            failed = self.boot_errors.len(),
            "Plugin boot pass complete"
        );

        total - before
    }

    fn booted_count(&self) -> usize {
        self.registry.iter().filter(|plugin| plugin.booted).count()
    }

    /// Boots `id` after its dependencies, recording failures.
    fn boot_ordered(
        &mut self,
        id: &str,
        stack: &mut Vec<String>,
        failed: &mut HashSet<String>,
    ) -> AppResult<()> {
        if self.is_booted(id) {
            return Ok(());
        }
        if failed.contains(id) {
            return Err(AppError::dependency(format!(
                "Plugin '{}' failed to boot",
                id
            )));
        }
        if stack.iter().any(|entry| entry == id) {
            let mut cycle = stack.clone();
            cycle.push(id.to_string());
            return Err(AppError::dependency(format!(
                "Dependency cycle: {}",
                cycle.join(" -> ")
            )));
        }

        stack.push(id.to_string());
        let result = self.boot_after_dependencies(id, stack, failed);
        stack.pop();

        if let Err(e) = &result {
            error!(plugin_id = %id, error = %e, "Plugin boot skipped");
            failed.insert(id.to_string());
            self.boot_errors.insert(id.to_string(), e.message.clone());
        } else {
            self.boot_errors.remove(id);
        }

        result
    }

    fn boot_after_dependencies(
        &mut self,
        id: &str,
        stack: &mut Vec<String>,
        failed: &mut HashSet<String>,
    ) -> AppResult<()> {
        let plugin = self
            .registry
            .get(id)
            .ok_or_else(|| AppError::not_found(format!("Plugin '{}' not found", id)))?;
        let dependencies = plugin.descriptor.dependencies.clone();
        let requires = plugin.descriptor.requires.clone();

        for dependency in &dependencies {
            match self.registry.get(dependency) {
                None => {
                    return Err(AppError::dependency(format!(
                        "Requires plugin '{}' which is not installed",
                        dependency
                    )));
                }
                Some(dep) if !dep.enabled => {
                    return Err(AppError::dependency(format!(
                        "Requires plugin '{}' which is not active",
                        dependency
                    )));
                }
                Some(_) => {}
            }

            self.boot_ordered(dependency, stack, failed).map_err(|e| {
                AppError::dependency(format!(
                    "Dependency '{}' could not be booted: {}",
                    dependency, e.message
                ))
            })?;
        }

        let errors = host_errors(&requires, &self.runtime_version, &self.capabilities);
        if !errors.is_empty() {
            return Err(AppError::dependency(errors.join("; ")));
        }

        self.run_boot_sequence(id)
    }

    /// Installs one plugin: settings, `register`, views, routes, `boot`.
    ///
    /// On failure everything the plugin managed to register is removed again.
    fn run_boot_sequence(&mut self, id: &str) -> AppResult<()> {
        let plugin = self
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Plugin '{}' not found", id)))?;

        let result = self.install(&plugin);
        match result {
            Ok(view) => {
                if let Some(entry) = self.registry.get_mut(id) {
                    entry.booted = true;
                    entry.view = view;
                }
                info!(plugin_id = %id, "Plugin booted");
                Ok(())
            }
            Err(e) => {
                self.teardown(id);
                Err(e)
            }
        }
    }

    fn install(&self, plugin: &RegisteredPlugin) -> AppResult<Option<Arc<dyn ViewRenderer>>> {
        let id = plugin.descriptor.id.as_str();
        let base_path = plugin.instance.base_path();
        let settings = plugin.effective_settings();

        // 1. settings
        bind_instance(
            self.services.as_ref(),
            &settings_key(id),
            Arc::new(settings.clone()),
        );
        let ctx = self.context(plugin, settings);

        // 2. services
        plugin.instance.register(&ctx)?;

        // 3. views
        let views_dir = base_path.join(VIEWS_DIR);
        let view = if views_dir.is_dir() {
            let view = (self.view_factory)(&views_dir)?;
            bind_instance(self.services.as_ref(), &view_key(id), Arc::new(view.clone()));
            debug!(plugin_id = %id, path = %views_dir.display(), "Plugin views bound");
            Some(view)
        } else {
            None
        };
        let ctx = ctx.with_view(view.clone());

        // 4. routes
        if let Some(routes) = plugin.instance.routes_entry() {
            routes(&ctx)?;
            debug!(
                plugin_id = %id,
                routes = self.router.count_owned_by(id),
                "Plugin routes loaded"
            );
        }

        // 5. boot
        plugin.instance.boot(&ctx)?;

        Ok(view)
    }

    fn teardown(&self, id: &str) {
        let hooks = self.hooks.remove_plugin_hooks(id);
        let routes = self.router.remove_plugin_routes(id);
        debug!(plugin_id = %id, hooks, routes, "Plugin torn down");
    }

    fn context(&self, plugin: &RegisteredPlugin, settings: Map<String, Value>) -> PluginContext {
        PluginContext::new(
            &plugin.descriptor.id,
            plugin.instance.base_path(),
            settings,
            self.router.clone(),
            self.hooks.clone(),
            self.services.clone(),
        )
        .with_view(plugin.view.clone())
    }

    fn persist(&mut self, next: PluginState) -> AppResult<()> {
        self.store.save(&next)?;
        self.state = next;
        Ok(())
    }

    /// Activates a plugin, returning whether it is now active.
    pub fn activate(&mut self, id: &str) -> bool {
        match self.try_activate(id) {
            Ok(()) => true,
            Err(e) => {
                warn!(plugin_id = %id, error = %e, "Plugin activation failed");
                false
            }
        }
    }

    /// Activates a plugin.
    ///
    /// Activating an active plugin is a no-op. Dependencies and host
    /// requirements are checked before anything changes; the enabled flag
    /// is persisted before memory is updated, then `on_activate` runs,
    /// then the boot sequence.
    pub fn try_activate(&mut self, id: &str) -> AppResult<()> {
        let plugin = self
            .registry
            .get(id)
            .ok_or_else(|| AppError::not_found(format!("Plugin '{}' not found", id)))?;

        if plugin.enabled && plugin.booted {
            debug!(plugin_id = %id, "Plugin already active");
            return Ok(());
        }

        if plugin.enabled {
            // Enabled but never booted: a previous boot was skipped.
            return self.boot_ordered(id, &mut Vec::new(), &mut HashSet::new());
        }

        let report = self.check_requirements(id)?;
        if !report.valid {
            return Err(AppError::dependency(format!(
                "Plugin '{}' cannot be activated: {}",
                id,
                report.errors.join("; ")
            )));
        }

        self.persist(self.state.with_enabled(id, true))?;

        let plugin = match self.registry.get_mut(id) {
            Some(plugin) => {
                plugin.enabled = true;
                plugin.clone()
            }
            None => return Err(AppError::not_found(format!("Plugin '{}' not found", id))),
        };

        let ctx = self.context(&plugin, plugin.effective_settings());
        if let Err(e) = plugin.instance.on_activate(&ctx) {
            self.rollback_activation(id);
            return Err(e);
        }

        if let Err(e) = self.boot_ordered(id, &mut Vec::new(), &mut HashSet::new()) {
            // Activation side effects already happened; undo them.
            if let Err(undo) = plugin.instance.on_deactivate(&ctx) {
                error!(plugin_id = %id, error = %undo, "Plugin on_deactivate returned error");
            }
            self.rollback_activation(id);
            return Err(e);
        }

        info!(plugin_id = %id, "Plugin activated");
        Ok(())
    }

    fn rollback_activation(&mut self, id: &str) {
        self.teardown(id);
        if let Err(e) = self.persist(self.state.with_enabled(id, false)) {
            error!(plugin_id = %id, error = %e, "Could not persist activation rollback");
        }
        if let Some(plugin) = self.registry.get_mut(id) {
            plugin.enabled = false;
            plugin.booted = false;
            plugin.view = None;
        }
    }

    /// Deactivates a plugin, returning whether it was deactivated.
    pub fn deactivate(&mut self, id: &str) -> bool {
        match self.try_deactivate(id) {
            Ok(()) => true,
            Err(e) => {
                warn!(plugin_id = %id, error = %e, "Plugin deactivation failed");
                false
            }
        }
    }

    /// Deactivates a plugin.
    ///
    /// Hooks and routes are removed before the new state is persisted, so a
    /// failed write can be recovered by deactivating again.
    pub fn try_deactivate(&mut self, id: &str) -> AppResult<()> {
        let plugin = self
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Plugin '{}' not found", id)))?;

        if !plugin.enabled {
            return Err(AppError::conflict(format!("Plugin '{}' is not active", id)));
        }

        let dependents: Vec<&str> = self
            .registry
            .iter()
            .filter(|other| other.enabled && other.descriptor.dependencies.iter().any(|d| d == id))
            .map(|other| other.descriptor.id.as_str())
            .collect();
        if !dependents.is_empty() {
            warn!(
                plugin_id = %id,
                dependents = ?dependents,
                "Deactivating a plugin other active plugins depend on"
            );
        }

        let ctx = self.context(&plugin, plugin.effective_settings());
        if let Err(e) = plugin.instance.on_deactivate(&ctx) {
            error!(plugin_id = %id, error = %e, "Plugin on_deactivate returned error");
        }

        self.teardown(id);
        if let Some(entry) = self.registry.get_mut(id) {
            entry.booted = false;
            entry.view = None;
        }

        self.persist(self.state.with_enabled(id, false))?;
        if let Some(entry) = self.registry.get_mut(id) {
            entry.enabled = false;
        }
        self.boot_errors.remove(id);

        info!(plugin_id = %id, "Plugin deactivated");
        Ok(())
    }

    /// Reports whether `id` could be activated now. Never mutates state.
    pub fn check_requirements(&self, id: &str) -> AppResult<RequirementReport> {
        let plugin = self
            .registry
            .get(id)
            .ok_or_else(|| AppError::not_found(format!("Plugin '{}' not found", id)))?;

        let mut errors = Vec::new();
        for dependency in &plugin.descriptor.dependencies {
            match self.registry.get(dependency) {
                None => errors.push(format!(
                    "Requires plugin '{}' which is not installed",
                    dependency
                )),
                Some(dep) if !(dep.enabled && dep.booted) => errors.push(format!(
                    "Requires plugin '{}' which is not active",
                    dependency
                )),
                Some(_) => {}
            }
        }
        errors.extend(host_errors(
            &plugin.descriptor.requires,
            &self.runtime_version,
            &self.capabilities,
        ));

        Ok(RequirementReport::from_errors(errors))
    }

    /// Returns the persisted enabled flag of `id`.
    pub fn is_active(&self, id: &str) -> bool {
        self.registry.get(id).is_some_and(|plugin| plugin.enabled)
    }

    /// Returns whether `id`'s routes and hooks are installed.
    pub fn is_booted(&self, id: &str) -> bool {
        self.registry.get(id).is_some_and(|plugin| plugin.booted)
    }

    /// Looks up a registered plugin.
    pub fn plugin(&self, id: &str) -> Option<PluginSummary> {
        self.registry.get(id).map(PluginSummary::from)
    }

    /// All registered plugins in discovery order.
    pub fn all_plugins(&self) -> Vec<PluginSummary> {
        self.registry.iter().map(PluginSummary::from).collect()
    }

    /// Enabled plugins in discovery order.
    pub fn active_plugins(&self) -> Vec<PluginSummary> {
        self.registry
            .iter()
            .filter(|plugin| plugin.enabled)
            .map(PluginSummary::from)
            .collect()
    }

    /// Descriptor of `id` with its effective settings.
    pub fn plugin_config(&self, id: &str) -> AppResult<PluginDescriptor> {
        let plugin = self
            .registry
            .get(id)
            .ok_or_else(|| AppError::not_found(format!("Plugin '{}' not found", id)))?;

        let mut descriptor = plugin.descriptor.clone();
        descriptor.settings = plugin.effective_settings();
        descriptor.enabled = plugin.enabled;
        Ok(descriptor)
    }

    /// Merges `changes` into `id`'s persisted settings overrides.
    ///
    /// A `null` value drops the override, restoring the descriptor default.
    /// Returns the new effective settings.
    pub fn update_settings(
        &mut self,
        id: &str,
        changes: Map<String, Value>,
    ) -> AppResult<Map<String, Value>> {
        let plugin = self
            .registry
            .get(id)
            .ok_or_else(|| AppError::not_found(format!("Plugin '{}' not found", id)))?;

        let mut overrides = plugin.overrides.clone();
        for (key, value) in changes {
            if value.is_null() {
                overrides.remove(&key);
            } else {
                overrides.insert(key, value);
            }
        }

        let next = self.state.with_settings(id, plugin.enabled, overrides.clone());
        self.persist(next)?;

        let Some(plugin) = self.registry.get_mut(id) else {
            return Err(AppError::not_found(format!("Plugin '{}' not found", id)));
        };
        plugin.overrides = overrides;
        let settings = plugin.effective_settings();

        if plugin.booted {
            bind_instance(
                self.services.as_ref(),
                &settings_key(id),
                Arc::new(settings.clone()),
            );
        }

        info!(plugin_id = %id, keys = settings.len(), "Plugin settings updated");
        Ok(settings)
    }

    /// Reasons plugins were skipped by the last boot pass.
    pub fn boot_errors(&self) -> &BTreeMap<String, String> {
        &self.boot_errors
    }

    /// Directories rejected by the last discovery.
    pub fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }

    /// Path of the persisted state document.
    pub fn state_path(&self) -> &Path {
        self.store.path()
    }

    /// Shared hook bus.
    pub fn hooks(&self) -> &Arc<HookManager> {
        &self.hooks
    }

    /// Shared route table.
    pub fn router(&self) -> &Arc<AppRouter> {
        &self.router
    }
}

fn bind_instance(services: &dyn ServiceRegistry, key: &str, service: Service) {
    services.singleton(
        key,
        Arc::new(move |_: &dyn ServiceRegistry| Ok(service.clone())),
    );
}
