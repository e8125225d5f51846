//! Hook system — filters and actions with priority ordering and owner tagging.

pub mod definitions;
pub mod manager;

pub use definitions::{DEFAULT_PRIORITY, HookInfo, HookKind};
pub use manager::HookManager;
