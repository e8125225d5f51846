//! View rendering abstraction.

use serde_json::{Map, Value};

use crate::result::AppResult;

/// Renders named templates from a directory the renderer was scoped to.
pub trait ViewRenderer: Send + Sync + std::fmt::Debug {
    /// Renders `template` (dot notation, e.g. `blogs.index`) with `data`.
    fn render(&self, template: &str, data: &Map<String, Value>) -> AppResult<String>;
}
