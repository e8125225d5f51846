//! Hook kinds, well-known tags, and callback shapes.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use trees_core::result::AppResult;

/// Priority used when a caller does not pick one. Lower runs first.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Tags fired by the framework itself.
pub mod tags {
    /// Action fired once after plugins are booted.
    pub const APP_INIT: &str = "app.init";
    /// Filter applied to every inbound request before routing.
    pub const REQUEST_BEFORE: &str = "request.before";
    /// Filter applied to every outbound response.
    pub const RESPONSE_AFTER: &str = "response.after";
    /// Filter folding the navigation entries shown by layouts.
    pub const NAVIGATION_ITEMS: &str = "navigation.items";
}

/// One navigation entry, the value type folded by [`tags::NAVIGATION_ITEMS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavItem {
    /// Link text.
    pub label: String,
    /// Link target.
    pub href: String,
}

/// The two kinds of extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// Value-transforming chain.
    Filter,
    /// Side-effecting callbacks; return values are discarded.
    Action,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter => write!(f, "filter"),
            Self::Action => write!(f, "action"),
        }
    }
}

/// Listing view of a registered hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookInfo {
    /// Hook tag.
    pub tag: String,
    /// Filter or action.
    pub kind: HookKind,
    /// Priority bucket.
    pub priority: i32,
    /// Owning plugin, if any.
    pub owner: Option<String>,
}

/// Type-erased filter value passed along the chain.
pub(crate) type FilterValue = Box<dyn Any + Send>;

/// Type-erased filter callback.
pub(crate) type FilterCallback =
    Arc<dyn Fn(FilterValue, &[Value]) -> AppResult<FilterValue> + Send + Sync>;

/// Action callback.
pub(crate) type ActionCallback = Arc<dyn Fn(&[Value]) -> AppResult<()> + Send + Sync>;
