//! Collaborator traits consumed by the extension runtime.
//!
//! The plugin runtime only needs a narrow slice of the surrounding
//! framework: a keyed service registry and a template renderer. Both are
//! expressed as object-safe traits so hosts can supply their own.

pub mod registry;
pub mod view;

pub use registry::{Service, ServiceFactory, ServiceRegistry, resolve};
pub use view::ViewRenderer;
