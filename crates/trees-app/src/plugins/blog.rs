//! Blog plugin — a read-only post listing.
//!
//! Posts come from the `posts` setting. Routes:
//!
//! - `GET /blog` lists posts
//! - `GET /blog/latest` redirects to the newest post
//! - `GET /blog/{id}` shows one post
//!
//! Pages render through the plugin's views when it ships them and fall
//! back to JSON otherwise. The plugin also contributes a navigation entry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use trees_core::error::AppError;
use trees_core::http::{Request, Response, StatusCode, html, redirect};
use trees_core::result::AppResult;
use trees_core::traits::{Service, ServiceRegistry, ViewRenderer, resolve};
use trees_plugin::{
    DEFAULT_PRIORITY, NavItem, Plugin, PluginContext, PluginDescriptor, RoutesEntry, tags,
};

/// Plugin id.
pub const PLUGIN_ID: &str = "blog";

/// Service key of the post list.
pub const POSTS_KEY: &str = "blog.posts";

/// A blog post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Post id, unique within the blog.
    pub id: u64,
    /// Title.
    pub title: String,
    /// Body text.
    #[serde(default)]
    pub body: String,
}

/// The blog plugin.
#[derive(Debug)]
pub struct BlogPlugin {
    /// Plugin id.
    id: String,
    /// Display name.
    name: String,
    /// Display version.
    version: String,
    /// Plugin directory.
    base_path: PathBuf,
}

impl BlogPlugin {
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

impl Plugin for BlogPlugin {
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

    fn register(&self, ctx: &PluginContext) -> AppResult<()> {
        let posts = match ctx.setting("posts") {
            Some(value) => serde_json::from_value::<Vec<Post>>(value.clone()).map_err(|e| {
                AppError::validation(format!("Setting 'posts' of '{}' is invalid: {e}", self.id))
            })?,
            None => Vec::new(),
        };
        let service: Service = Arc::new(posts);

        ctx.services().singleton(
            POSTS_KEY,
            Arc::new(move |_: &dyn ServiceRegistry| Ok(service.clone())),
        );
        Ok(())
    }

    fn boot(&self, ctx: &PluginContext) -> AppResult<()> {
        let label = ctx
            .setting("nav_label")
            .and_then(Value::as_str)
            .unwrap_or("Blog")
            .to_string();

        ctx.add_filter(
            tags::NAVIGATION_ITEMS,
            move |mut items: Vec<NavItem>, _| {
                items.push(NavItem {
                    label: label.clone(),
                    href: "/blog".to_string(),
                });
                Ok(items)
            },
            DEFAULT_PRIORITY,
        );

        let plugin_id = self.id.clone();
        ctx.add_action(
            tags::APP_INIT,
            move |_| {
                debug!(plugin_id = %plugin_id, "Blog ready");
                Ok(())
            },
            DEFAULT_PRIORITY,
        );

        Ok(())
    }

    fn on_activate(&self, _ctx: &PluginContext) -> AppResult<()> {
        debug!(plugin_id = %self.id, "Blog activated");
        Ok(())
    }

    fn on_deactivate(&self, _ctx: &PluginContext) -> AppResult<()> {
        debug!(plugin_id = %self.id, "Blog deactivated");
        Ok(())
    }
}

fn register_routes(ctx: &PluginContext) -> AppResult<()> {
    let title = ctx
        .setting("title")
        .and_then(Value::as_str)
        .unwrap_or("Blog")
        .to_string();

    let view = ctx.view().cloned();
    ctx.get("/blog", move |_, _, services| {
        index(view.as_deref(), &title, services)
    })?;

    ctx.get("/blog/latest", |_, _, services| {
        let posts = posts(services)?;
        match posts.iter().map(|post| post.id).max() {
            Some(id) => Ok(redirect(&format!("/blog/{id}"))),
            None => Err(AppError::not_found("The blog has no posts")),
        }
    })?;

    let view = ctx.view().cloned();
    ctx.get("/blog/{id}", move |request, params, services| {
        show(request, view.as_deref(), &params[0], services)
    })?;

    Ok(())
}

fn posts(services: &dyn ServiceRegistry) -> AppResult<Arc<Vec<Post>>> {
    resolve::<Vec<Post>>(services, POSTS_KEY)
}

fn index(
    view: Option<&dyn ViewRenderer>,
    title: &str,
    services: &dyn ServiceRegistry,
) -> AppResult<Response> {
    let posts = posts(services)?;

    let Some(view) = view else {
        return Ok(trees_core::http::json(
            StatusCode::OK,
            &json!({"title": title, "posts": posts.as_slice()}),
        ));
    };

    let mut data = Map::new();
    data.insert("title".into(), json!(title));
    data.insert("count".into(), json!(posts.len()));
    let mut page = view.render("blogs.index", &data)?;

    for post in posts.iter() {
        let mut item = Map::new();
        item.insert("post".into(), json!(post));
        page.push_str(&view.render("blogs.item", &item)?);
    }

    Ok(html(StatusCode::OK, page))
}

fn show(
    request: &Request,
    view: Option<&dyn ViewRenderer>,
    raw_id: &str,
    services: &dyn ServiceRegistry,
) -> AppResult<Response> {
    let id: u64 = raw_id.parse().map_err(|_| {
        warn!(path = %request.uri().path(), "Malformed post id");
        AppError::validation(format!("'{}' is not a post id", raw_id))
    })?;

    let posts = posts(services)?;
    let post = posts
        .iter()
        .find(|post| post.id == id)
        .ok_or_else(|| AppError::not_found(format!("Post {} not found", id)))?;

    let Some(view) = view else {
        return Ok(trees_core::http::json(StatusCode::OK, &json!(post)));
    };

    let mut data = Map::new();
    data.insert("post".into(), json!(post));
    Ok(html(StatusCode::OK, view.render("blogs.show", &data)?))
}
