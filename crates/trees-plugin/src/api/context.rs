//! Plugin context — the explicit handle passed into every lifecycle call.
//!
//! Registrations made through the context are tagged with the plugin's id,
//! which is what lets deactivation tear them down again.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use trees_core::error::AppError;
use trees_core::http::{Method, Request, Response};
use trees_core::result::AppResult;
use trees_core::traits::{ServiceRegistry, ViewRenderer};
use trees_router::{RouteId, Router};

use crate::hooks::manager::HookManager;

/// A route handler: `(request, positional params, service registry)`.
pub type RouteHandler =
    Arc<dyn Fn(&Request, &[String], &dyn ServiceRegistry) -> AppResult<Response> + Send + Sync>;

/// The application's route table.
pub type AppRouter = Router<RouteHandler>;

/// Route registration entry point of a plugin, invoked once per boot.
pub type RoutesEntry = Arc<dyn Fn(&PluginContext) -> AppResult<()> + Send + Sync>;

/// Context bound to one plugin.
#[derive(Clone)]
pub struct PluginContext {
    /// Owning plugin id.
    plugin_id: String,
    /// Plugin directory.
    base_path: PathBuf,
    /// Effective settings.
    settings: Map<String, Value>,
    /// Route table.
    router: Arc<AppRouter>,
    /// Hook bus.
    hooks: Arc<HookManager>,
    /// Service registry.
    services: Arc<dyn ServiceRegistry>,
    /// View collaborator, once the plugin's views directory is bound.
    view: Option<Arc<dyn ViewRenderer>>,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("base_path", &self.base_path)
            .field("has_view", &self.view.is_some())
            .finish()
    }
}

impl PluginContext {
    /// Creates a context for `plugin_id`.
    pub fn new(
        plugin_id: &str,
        base_path: &Path,
        settings: Map<String, Value>,
        router: Arc<AppRouter>,
        hooks: Arc<HookManager>,
        services: Arc<dyn ServiceRegistry>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            base_path: base_path.to_path_buf(),
            settings,
            router,
            hooks,
            services,
            view: None,
        }
    }

    /// Returns a copy carrying `view`.
    pub fn with_view(mut self, view: Option<Arc<dyn ViewRenderer>>) -> Self {
        self.view = view;
        self
    }

    /// Owning plugin id.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Plugin directory.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Effective settings.
    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    /// Looks up one setting.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Route table.
    pub fn router(&self) -> &Arc<AppRouter> {
        &self.router
    }

    /// Hook bus.
    pub fn hooks(&self) -> &Arc<HookManager> {
        &self.hooks
    }

    /// Service registry.
    pub fn services(&self) -> &Arc<dyn ServiceRegistry> {
        &self.services
    }

    /// View collaborator, if the plugin ships views.
    pub fn view(&self) -> Option<&Arc<dyn ViewRenderer>> {
        self.view.as_ref()
    }

    /// Renders one of the plugin's templates.
    pub fn render(&self, template: &str, data: &Map<String, Value>) -> AppResult<String> {
        match &self.view {
            Some(view) => view.render(template, data),
            None => Err(AppError::plugin(format!(
                "Plugin '{}' has no views directory",
                self.plugin_id
            ))),
        }
    }

    /// Registers a route owned by this plugin.
    pub fn add_route<F>(&self, method: Method, path: &str, handler: F) -> AppResult<RouteId>
    where
        F: Fn(&Request, &[String], &dyn ServiceRegistry) -> AppResult<Response>
            + Send
            + Sync
            + 'static,
    {
        self.router.add_route(
            method.as_str(),
            path,
            Arc::new(handler) as RouteHandler,
            Some(&self.plugin_id),
        )
    }

    /// Registers a `GET` route owned by this plugin.
    pub fn get<F>(&self, path: &str, handler: F) -> AppResult<RouteId>
    where
        F: Fn(&Request, &[String], &dyn ServiceRegistry) -> AppResult<Response>
            + Send
            + Sync
            + 'static,
    {
        self.add_route(Method::GET, path, handler)
    }

    /// Registers a `POST` route owned by this plugin.
    pub fn post<F>(&self, path: &str, handler: F) -> AppResult<RouteId>
    where
        F: Fn(&Request, &[String], &dyn ServiceRegistry) -> AppResult<Response>
            + Send
            + Sync
            + 'static,
    {
        self.add_route(Method::POST, path, handler)
    }

    /// Registers a filter owned by this plugin.
    pub fn add_filter<T, F>(&self, tag: &str, callback: F, priority: i32)
    where
        T: Any + Send,
        F: Fn(T, &[Value]) -> AppResult<T> + Send + Sync + 'static,
    {
        self.hooks
            .add_filter(tag, callback, priority, Some(&self.plugin_id));
    }

    /// Registers an action owned by this plugin.
    pub fn add_action<F>(&self, tag: &str, callback: F, priority: i32)
    where
        F: Fn(&[Value]) -> AppResult<()> + Send + Sync + 'static,
    {
        self.hooks
            .add_action(tag, callback, priority, Some(&self.plugin_id));
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use trees_core::Container;
    use trees_core::http::{StatusCode, html};

    use super::*;

    fn context() -> PluginContext {
        PluginContext::new(
            "blog",
            Path::new("/plugins/blog"),
            Map::new(),
            Arc::new(AppRouter::new()),
            Arc::new(HookManager::new()),
            Arc::new(Container::new()),
        )
    }

    #[test]
    fn test_registrations_are_owned_by_the_plugin() {
        let ctx = context();
        ctx.get("/blog/{id}", |_, params, _| {
            Ok(html(StatusCode::OK, format!("post {}", params[0])))
        })
        .unwrap();
        ctx.add_filter("title", |title: String, _| Ok(title), 10);
        ctx.add_action("app.init", |_| Ok(()), 10);

        assert_eq!(ctx.router().count_owned_by("blog"), 1);
        assert_eq!(ctx.hooks().count_owned_by("blog"), 2);

        let matched = ctx.router().match_route("GET", "/blog/7").unwrap();
        let request = Request::new(Bytes::new());
        let response = (matched.handler)(&request, &matched.params, ctx.services().as_ref()).unwrap();
        assert_eq!(response.body().as_ref(), b"post 7");
    }

    #[test]
    fn test_render_without_views_is_an_error() {
        let err = context().render("index", &Map::new()).unwrap_err();
        assert!(err.message.contains("blog"));
    }
}
