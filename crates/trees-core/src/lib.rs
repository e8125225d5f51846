//! # trees-core
//!
//! Core crate for the Trees framework. Contains the unified error system,
//! configuration schemas, the collaborator traits consumed by the extension
//! runtime (service registry, view renderer), the default service container,
//! and thin HTTP message aliases.
//!
//! This crate has **no** internal dependencies on other Trees crates.

pub mod config;
pub mod container;
pub mod error;
pub mod http;
pub mod result;
pub mod traits;

pub use container::Container;
pub use error::{AppError, ErrorKind};
pub use result::AppResult;
