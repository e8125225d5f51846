//! Plugin API — everything a plugin touches while it is being booted.

pub mod context;

pub use context::{AppRouter, PluginContext, RouteHandler, RoutesEntry};
