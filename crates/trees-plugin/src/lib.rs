//! # trees-plugin
//!
//! Extension runtime for Trees. Provides:
//!
//! - [`HookManager`]: priority-ordered filters (value-transforming chains)
//!   and actions (side-effecting callbacks), each tagged with an owner
//! - [`PluginManager`]: discovery of plugin packages, descriptor and
//!   requirement validation, dependency-ordered boot, and the
//!   activate/deactivate state machine with coordinated teardown
//! - [`PluginContext`]: the explicit handle plugins receive to register
//!   services, routes and hooks on their own behalf
//! - Durable activation state via [`PluginStateStore`]

pub mod api;
pub mod descriptor;
pub mod hooks;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod requirements;
pub mod state;
pub mod view;

pub use api::context::{AppRouter, PluginContext, RouteHandler, RoutesEntry};
pub use descriptor::{PluginDescriptor, Requirements};
pub use hooks::definitions::{DEFAULT_PRIORITY, HookInfo, HookKind, NavItem, tags};
pub use hooks::manager::HookManager;
pub use loader::{PluginCatalog, PluginFactory};
pub use manager::{PluginManager, PluginSummary, Rejection, ViewFactory, settings_key, view_key};
pub use registry::Plugin;
pub use requirements::RequirementReport;
pub use state::{PluginState, PluginStateStore};
pub use view::View;
