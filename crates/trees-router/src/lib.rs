//! # trees-router
//!
//! Ordered route table with owner tagging. Routes are matched in
//! registration order (first match wins); routes registered on behalf of a
//! plugin carry its id so they can be bulk-removed when it is deactivated.
//!
//! The table is generic over the handler type so it stays agnostic to the
//! request/response types of the host.

pub mod pattern;
pub mod router;

pub use pattern::PathPattern;
pub use router::{RouteId, RouteInfo, RouteMatch, Router};
