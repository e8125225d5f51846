//! Route table — ordered registration, first-match dispatch, owner-scoped removal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info};

use trees_core::result::AppResult;

use crate::pattern::PathPattern;

/// Stable identifier of a registered route.
///
/// Ids survive bulk removal; positions do not.
pub type RouteId = u64;

/// A registered route.
#[derive(Debug, Clone)]
struct Route<H> {
    /// Route identifier.
    id: RouteId,
    /// Upper-cased HTTP method.
    method: String,
    /// Compiled path template.
    pattern: PathPattern,
    /// Handler invoked on match.
    handler: H,
    /// Plugin that registered this route.
    owner: Option<String>,
}

/// Listing view of a registered route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    /// Route identifier.
    pub id: RouteId,
    /// HTTP method.
    pub method: String,
    /// Path template as registered.
    pub path: String,
    /// Owning plugin, if any.
    pub owner: Option<String>,
}

/// Result of a successful match.
#[derive(Debug, Clone)]
pub struct RouteMatch<H> {
    /// Identifier of the matched route.
    pub route_id: RouteId,
    /// The route's handler.
    pub handler: H,
    /// Captured values in placeholder order.
    pub params: Vec<String>,
    /// Placeholder names, parallel to `params`.
    pub names: Vec<String>,
}

impl<H> RouteMatch<H> {
    /// Looks up a captured value by placeholder name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.params[i].as_str())
    }
}

/// Ordered route table.
///
/// Iteration order is registration order; two routes accepting the same
/// method and path are disambiguated by which was added first, never by
/// specificity.
#[derive(Debug)]
pub struct Router<H> {
    /// Routes in registration order.
    routes: RwLock<Vec<Route<H>>>,
    /// Next route id.
    next_id: AtomicU64,
}

impl<H: Clone> Router<H> {
    /// Creates an empty route table.
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a route, compiling its template once.
    pub fn add_route(
        &self,
        method: &str,
        path: &str,
        handler: H,
        owner: Option<&str>,
    ) -> AppResult<RouteId> {
        let pattern = PathPattern::compile(path)?;
        let method = method.to_ascii_uppercase();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        debug!(
            route_id = id,
            method = %method,
            path = %path,
            owner = ?owner,
            "Route registered"
        );

        self.write().push(Route {
            id,
            method,
            pattern,
            handler,
            owner: owner.map(str::to_string),
        });

        Ok(id)
    }

    /// Registers a `GET` route.
    pub fn get(&self, path: &str, handler: H, owner: Option<&str>) -> AppResult<RouteId> {
        self.add_route("GET", path, handler, owner)
    }

    /// Registers a `POST` route.
    pub fn post(&self, path: &str, handler: H, owner: Option<&str>) -> AppResult<RouteId> {
        self.add_route("POST", path, handler, owner)
    }

    /// Registers a `PUT` route.
    pub fn put(&self, path: &str, handler: H, owner: Option<&str>) -> AppResult<RouteId> {
        self.add_route("PUT", path, handler, owner)
    }

    /// Registers a `PATCH` route.
    pub fn patch(&self, path: &str, handler: H, owner: Option<&str>) -> AppResult<RouteId> {
        self.add_route("PATCH", path, handler, owner)
    }

    /// Registers a `DELETE` route.
    pub fn delete(&self, path: &str, handler: H, owner: Option<&str>) -> AppResult<RouteId> {
        self.add_route("DELETE", path, handler, owner)
    }

    /// Finds the first route whose method equals `method` and whose template
    /// accepts `path`. An unmatched request is `None`, never an error.
    pub fn match_route(&self, method: &str, path: &str) -> Option<RouteMatch<H>> {
        let routes = self.read();
        routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                route.pattern.captures(path).map(|params| RouteMatch {
                    route_id: route.id,
                    handler: route.handler.clone(),
                    params,
                    names: route.pattern.names().to_vec(),
                })
            })
    }

    /// Removes every route owned by `owner`, keeping the relative order of
    /// the rest. Returns the number of routes removed.
    pub fn remove_plugin_routes(&self, owner: &str) -> usize {
        let mut routes = self.write();
        let before = routes.len();
        routes.retain(|route| route.owner.as_deref() != Some(owner));
        let removed = before - routes.len();

        if removed > 0 {
            info!(plugin_id = %owner, removed, "Plugin routes removed");
        }

        removed
    }

    /// Snapshot of all routes in dispatch order.
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.read()
            .iter()
            .map(|route| RouteInfo {
                id: route.id,
                method: route.method.clone(),
                path: route.pattern.template().to_string(),
                owner: route.owner.clone(),
            })
            .collect()
    }

    /// Number of routes owned by `owner`.
    pub fn count_owned_by(&self, owner: &str) -> usize {
        self.read()
            .iter()
            .filter(|route| route.owner.as_deref() == Some(owner))
            .count()
    }

    /// Total number of routes.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Route<H>>> {
        self.routes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Route<H>>> {
        self.routes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H: Clone> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router<&'static str> {
        Router::new()
    }

    #[test]
    fn test_first_match_wins() {
        let router = router();
        router.get("/users/{id}", "H1", Some("p1")).unwrap();
        router.get("/users/{id}", "H2", None).unwrap();

        let matched = router.match_route("GET", "/users/42").unwrap();
        assert_eq!(matched.handler, "H1");
        assert_eq!(matched.params, vec!["42".to_string()]);
        assert_eq!(matched.param("id"), Some("42"));
    }

    #[test]
    fn test_removal_exposes_next_route() {
        let router = router();
        router.get("/users/{id}", "H1", Some("p1")).unwrap();
        router.get("/users/{id}", "H2", None).unwrap();

        assert_eq!(router.remove_plugin_routes("p1"), 1);
        let matched = router.match_route("GET", "/users/42").unwrap();
        assert_eq!(matched.handler, "H2");
    }

    #[test]
    fn test_method_must_match_exactly() {
        let router = router();
        router.post("/login", "login", None).unwrap();
        assert!(router.match_route("GET", "/login").is_none());
        assert!(router.match_route("post", "/login").is_none());
        assert!(router.match_route("POST", "/login").is_some());
    }

    #[test]
    fn test_add_route_uppercases_method() {
        let router = router();
        router.add_route("patch", "/items/{id}", "patch", None).unwrap();
        assert!(router.match_route("PATCH", "/items/1").is_some());
    }

    #[test]
    fn test_unmatched_is_none() {
        let router = router();
        router.get("/", "home", None).unwrap();
        assert!(router.match_route("GET", "/missing").is_none());
    }

    #[test]
    fn test_removal_preserves_order_and_appends_after() {
        let router = router();
        router.get("/a", "a", None).unwrap();
        router.get("/b", "b", Some("p1")).unwrap();
        router.get("/c", "c", Some("p2")).unwrap();
        router.get("/d", "d", Some("p1")).unwrap();

        router.remove_plugin_routes("p1");
        router.get("/e", "e", None).unwrap();

        let paths: Vec<String> = router.routes().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/a", "/c", "/e"]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let router = router();
        router.get("/a", "a", Some("p1")).unwrap();
        assert_eq!(router.remove_plugin_routes("p1"), 1);
        assert_eq!(router.remove_plugin_routes("p1"), 0);
        assert_eq!(router.remove_plugin_routes("never"), 0);
        assert!(router.is_empty());
    }

    #[test]
    fn test_route_ids_are_stable_across_removal() {
        let router = router();
        let first = router.get("/a", "a", Some("p1")).unwrap();
        let second = router.get("/b", "b", None).unwrap();
        router.remove_plugin_routes("p1");
        let third = router.get("/c", "c", None).unwrap();

        assert_ne!(first, third);
        assert_eq!(router.match_route("GET", "/b").unwrap().route_id, second);
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let router = router();
        assert!(router.get("/broken/{id", "x", None).is_err());
        assert!(router.is_empty());
    }
}
