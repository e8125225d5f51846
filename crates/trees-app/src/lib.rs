//! # trees-app
//!
//! Wires the extension runtime into a running application:
//!
//! - [`Trees`]: owns the service container, hook bus, route table and
//!   plugin manager, and runs the per-request pipeline
//! - [`server`]: axum adapter serving the pipeline over HTTP
//! - [`plugins`]: plugins compiled into the binary

pub mod application;
pub mod error;
pub mod plugins;
pub mod server;

pub use application::Trees;
pub use error::ApiError;
