//! The application — shared runtime state and the request pipeline.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use tracing::{debug, info};

use trees_core::config::AppConfig;
use trees_core::http::{Request, Response, not_found};
use trees_core::result::AppResult;
use trees_core::Container;
use trees_plugin::{AppRouter, HookManager, NavItem, PluginCatalog, PluginManager, tags};

/// Service key of the hook bus.
pub const HOOK_MANAGER_KEY: &str = "hook_manager";
/// Service key of the route table.
pub const ROUTER_KEY: &str = "router";
/// Service key of the plugin manager.
pub const PLUGIN_MANAGER_KEY: &str = "plugin_manager";
/// Service key of the loaded configuration.
pub const CONFIG_KEY: &str = "config";

/// A Trees application.
///
/// The hook bus, route table and service container are shared with every
/// plugin through its context; the plugin manager sits behind a mutex so
/// administrative calls and request handling never interleave.
pub struct Trees {
    /// Loaded configuration.
    config: AppConfig,
    /// Service container.
    container: Arc<Container>,
    /// Hook bus.
    hooks: Arc<HookManager>,
    /// Route table.
    router: Arc<AppRouter>,
    /// Plugin lifecycle.
    plugins: Arc<Mutex<PluginManager>>,
}

impl std::fmt::Debug for Trees {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trees")
            .field("routes", &self.router.len())
            .field("hooks", &self.hooks)
            .field("services", &self.container)
            .finish()
    }
}

impl Trees {
    /// Builds the application. Nothing is discovered or booted yet.
    pub fn new(config: AppConfig, catalog: PluginCatalog) -> AppResult<Self> {
        let container = Arc::new(Container::new());
        let hooks = Arc::new(HookManager::new());
        let router = Arc::new(AppRouter::new());

        let manager = PluginManager::new(
            &config.plugins,
            catalog,
            hooks.clone(),
            router.clone(),
            container.clone(),
        )?;
        let plugins = Arc::new(Mutex::new(manager));

        container.instance(HOOK_MANAGER_KEY, hooks.clone());
        container.instance(ROUTER_KEY, router.clone());
        container.instance(PLUGIN_MANAGER_KEY, plugins.clone());
        container.instance(CONFIG_KEY, Arc::new(config.clone()));

        Ok(Self {
            config,
            container,
            hooks,
            router,
            plugins,
        })
    }

    /// Discovers plugins, boots the enabled ones, then fires `app.init`.
    pub fn run(&self) -> AppResult<()> {
        {
            let mut plugins = self.plugin_manager();
            plugins.discover()?;
            if self.config.plugins.auto_boot {
                plugins.boot_plugins();
            }
        }

        self.hooks.do_action(tags::APP_INIT, &[])?;

        info!(
            routes = self.router.len(),
            hooks = self.hooks.hooks().len(),
            "Application initialized"
        );
        Ok(())
    }

    /// Runs one request through the pipeline.
    ///
    /// `request.before` filters may rewrite the request before routing;
    /// `response.after` filters see every response, including the 404 for
    /// an unmatched path. Callback and handler errors are returned as-is.
    pub fn handle(&self, request: Request) -> AppResult<Response> {
        let request: Request = self
            .hooks
            .apply_filters(tags::REQUEST_BEFORE, request, &[])?;

        let method = request.method().as_str().to_string();
        let path = request.uri().path().to_string();

        let response = match self.router.match_route(&method, &path) {
            Some(matched) => {
                debug!(
                    method = %method,
                    path = %path,
                    route_id = matched.route_id,
                    "Route matched"
                );
                (matched.handler)(&request, &matched.params, self.container.as_ref())?
            }
            None => {
                debug!(method = %method, path = %path, "No route matched");
                not_found()
            }
        };

        let args: [Value; 2] = [json!(method), json!(path)];
        self.hooks
            .apply_filters(tags::RESPONSE_AFTER, response, &args)
    }

    /// Navigation entries contributed through `navigation.items`.
    pub fn navigation(&self) -> AppResult<Vec<NavItem>> {
        self.hooks
            .apply_filters(tags::NAVIGATION_ITEMS, Vec::new(), &[])
    }

    /// Locks the plugin manager.
    pub fn plugin_manager(&self) -> MutexGuard<'_, PluginManager> {
        self.plugins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Service container.
    pub fn services(&self) -> &Arc<Container> {
        &self.container
    }

    /// Hook bus.
    pub fn hooks(&self) -> &Arc<HookManager> {
        &self.hooks
    }

    /// Route table.
    pub fn router(&self) -> &Arc<AppRouter> {
        &self.router
    }
}
