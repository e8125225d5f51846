//! Admin plugin — plugin management over HTTP.
//!
//! Routes:
//!
//! - `GET /admin` dashboard with plugin counts and navigation
//! - `GET /admin/plugins` lists plugins with their state
//! - `GET /admin/plugins/{id}/settings` shows effective settings
//! - `POST /admin/plugins/{id}/activate` and `.../deactivate`
//! - `POST /admin/plugins/{id}/settings` merges a JSON object into the settings
//!
//! The plugin manager is resolved from the service registry on every
//! request and locked only inside a handler. `Trees::run` holds that lock
//! while plugins boot, so nothing here touches it from a lifecycle call.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value, json};
use tracing::info;

use trees_core::error::AppError;
use trees_core::http::{Response, StatusCode, html, json as json_response, redirect};
use trees_core::result::AppResult;
use trees_core::traits::{ServiceRegistry, ViewRenderer, resolve};
use trees_plugin::{
    DEFAULT_PRIORITY, HookManager, NavItem, Plugin, PluginContext, PluginDescriptor,
    PluginManager, PluginSummary, RoutesEntry, tags,
};

use crate::application::PLUGIN_MANAGER_KEY;

/// Plugin id.
pub const PLUGIN_ID: &str = "admin";

/// Where successful lifecycle changes redirect to.
const PLUGINS_PAGE: &str = "/admin/plugins";

/// The admin plugin.
#[derive(Debug)]
pub struct AdminPlugin {
    /// Plugin id.
    id: String,
    /// Display name.
    name: String,
    /// Display version.
    version: String,
    /// Plugin directory.
    base_path: PathBuf,
}

impl AdminPlugin {
    /// Catalog factory.
    pub fn factory(descriptor: &PluginDescriptor, dir: &Path) -> AppResult<Arc<dyn Plugin>> {
        Ok(Arc::new(Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            base_path: dir.to_path_buf(),
        }))
    }
}

impl Plugin for AdminPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn routes_entry(&self) -> Option<RoutesEntry> {
        Some(Arc::new(register_routes))
    }

    fn boot(&self, ctx: &PluginContext) -> AppResult<()> {
        let label = ctx
            .setting("nav_label")
            .and_then(Value::as_str)
            .unwrap_or("Admin")
            .to_string();

        // Runs first so the admin entry leads the navigation.
        ctx.add_filter(
            tags::NAVIGATION_ITEMS,
            move |mut items: Vec<NavItem>, _| {
                items.insert(
                    0,
                    NavItem {
                        label: label.clone(),
                        href: "/admin".to_string(),
                    },
                );
                Ok(items)
            },
            DEFAULT_PRIORITY - 5,
        );
        Ok(())
    }
}

fn register_routes(ctx: &PluginContext) -> AppResult<()> {
    let view = ctx.view().cloned();
    let hooks = ctx.hooks().clone();
    ctx.get("/admin", move |_, _, services| {
        dashboard(view.as_deref(), &hooks, services)
    })?;

    let view = ctx.view().cloned();
    ctx.get(PLUGINS_PAGE, move |_, _, services| {
        plugin_list(view.as_deref(), services)
    })?;

    let view = ctx.view().cloned();
    ctx.get("/admin/plugins/{id}/settings", move |_, params, services| {
        settings_page(view.as_deref(), &params[0], services)
    })?;

    ctx.post("/admin/plugins/{id}/activate", |_, params, services| {
        let id = &params[0];
        lock(&*manager(services)?).try_activate(id)?;
        info!(plugin_id = %id, "Plugin activated from admin");
        Ok(redirect(PLUGINS_PAGE))
    })?;

    ctx.post("/admin/plugins/{id}/deactivate", |_, params, services| {
        let id = &params[0];
        lock(&*manager(services)?).try_deactivate(id)?;
        info!(plugin_id = %id, "Plugin deactivated from admin");
        Ok(redirect(PLUGINS_PAGE))
    })?;

    ctx.post("/admin/plugins/{id}/settings", |request, params, services| {
        let id = &params[0];
        let changes: Map<String, Value> =
            serde_json::from_slice(request.body()).map_err(|e| {
                AppError::validation(format!("Settings must be a JSON object: {e}"))
            })?;
        lock(&*manager(services)?).update_settings(id, changes)?;
        Ok(redirect(&format!("/admin/plugins/{id}/settings")))
    })?;

    Ok(())
}

fn manager(services: &dyn ServiceRegistry) -> AppResult<Arc<Mutex<PluginManager>>> {
    resolve::<Mutex<PluginManager>>(services, PLUGIN_MANAGER_KEY)
}

fn lock(manager: &Mutex<PluginManager>) -> MutexGuard<'_, PluginManager> {
    manager.lock().unwrap_or_else(PoisonError::into_inner)
}

fn dashboard(
    view: Option<&dyn ViewRenderer>,
    hooks: &HookManager,
    services: &dyn ServiceRegistry,
) -> AppResult<Response> {
    let (total, active) = {
        let manager = manager(services)?;
        let manager = lock(&manager);
        (manager.all_plugins().len(), manager.active_plugins().len())
    };
    let nav: Vec<NavItem> = hooks.apply_filters(tags::NAVIGATION_ITEMS, Vec::new(), &[])?;

    let Some(view) = view else {
        return Ok(json_response(
            StatusCode::OK,
            &json!({"total_plugins": total, "active_plugins": active, "navigation": nav}),
        ));
    };

    let mut data = Map::new();
    data.insert("total".into(), json!(total));
    data.insert("active".into(), json!(active));
    let mut page = view.render("dashboard.index", &data)?;

    for item in &nav {
        let mut entry = Map::new();
        entry.insert("item".into(), json!(item));
        page.push_str(&view.render("dashboard.nav_item", &entry)?);
    }

    Ok(html(StatusCode::OK, page))
}

fn plugin_list(view: Option<&dyn ViewRenderer>, services: &dyn ServiceRegistry) -> AppResult<Response> {
    let (plugins, errors) = {
        let manager = manager(services)?;
        let manager = lock(&manager);
        (manager.all_plugins(), manager.boot_errors().clone())
    };

    let Some(view) = view else {
        return Ok(json_response(
            StatusCode::OK,
            &json!({"plugins": plugins, "boot_errors": errors}),
        ));
    };

    let active = plugins.iter().filter(|p| p.enabled).count();
    let mut data = Map::new();
    data.insert("total".into(), json!(plugins.len()));
    data.insert("active".into(), json!(active));
    let mut page = view.render("plugins.index", &data)?;

    for plugin in &plugins {
        page.push_str(&view.render("plugins.row", &row(plugin, errors.get(&plugin.id)))?);
    }

    Ok(html(StatusCode::OK, page))
}

fn row(plugin: &PluginSummary, error: Option<&String>) -> Map<String, Value> {
    let status = match (plugin.enabled, plugin.booted) {
        (true, true) => "active".to_string(),
        (true, false) => format!(
            "not booted: {}",
            error.map(String::as_str).unwrap_or("pending")
        ),
        (false, _) => "inactive".to_string(),
    };
    let action = if plugin.enabled { "deactivate" } else { "activate" };

    let mut data = Map::new();
    data.insert("plugin".into(), json!(plugin));
    data.insert("status".into(), json!(status));
    data.insert("action".into(), json!(action));
    data
}

fn settings_page(
    view: Option<&dyn ViewRenderer>,
    id: &str,
    services: &dyn ServiceRegistry,
) -> AppResult<Response> {
    let (plugin, config) = {
        let manager = manager(services)?;
        let manager = lock(&manager);
        let plugin = manager
            .plugin(id)
            .ok_or_else(|| AppError::not_found(format!("Plugin '{}' not found", id)))?;
        (plugin, manager.plugin_config(id)?)
    };

    let Some(view) = view else {
        return Ok(json_response(
            StatusCode::OK,
            &json!({"plugin": plugin, "settings": config.settings}),
        ));
    };

    let mut data = Map::new();
    data.insert("plugin".into(), json!(plugin));
    data.insert(
        "settings".into(),
        json!(serde_json::to_string_pretty(&config.settings)?),
    );
    Ok(html(StatusCode::OK, view.render("plugins.settings", &data)?))
}
