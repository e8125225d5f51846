//! Unified application error types for Trees.
//!
//! Every crate maps its failures into [`AppError`] so that the `?` operator
//! works across component boundaries. The [`ErrorKind`] carries the runtime's
//! failure taxonomy (descriptor, capability, dependency, callback, handler).

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The requested resource (plugin, service, template) was not found.
    NotFound,
    /// Input validation failed.
    Validation,
    /// A conflict occurred (duplicate plugin id, state already applied).
    Conflict,
    /// An internal error occurred.
    Internal,
    /// A filesystem I/O error occurred.
    Storage,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A generic plugin lifecycle error occurred.
    Plugin,
    /// A plugin descriptor is unreadable or incomplete.
    Descriptor,
    /// A plugin implementation does not satisfy the plugin contract.
    Capability,
    /// Activation is blocked by a missing or inactive dependency or an unmet requirement.
    Dependency,
    /// A hook callback failed during dispatch.
    HookCallback,
    /// A route handler failed during dispatch.
    RouteHandler,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::Storage => write!(f, "STORAGE"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Plugin => write!(f, "PLUGIN"),
            Self::Descriptor => write!(f, "DESCRIPTOR"),
            Self::Capability => write!(f, "CAPABILITY"),
            Self::Dependency => write!(f, "DEPENDENCY"),
            Self::HookCallback => write!(f, "HOOK_CALLBACK"),
            Self::RouteHandler => write!(f, "ROUTE_HANDLER"),
        }
    }
}

/// The unified application error used throughout Trees.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a plugin error.
    pub fn plugin(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Plugin, message)
    }

    /// Create a descriptor error.
    pub fn descriptor(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Descriptor, message)
    }

    /// Create a capability error.
    pub fn capability(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Capability, message)
    }

    /// Create a dependency error.
    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dependency, message)
    }

    /// Create a hook callback error.
    pub fn hook_callback(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HookCallback, message)
    }

    /// Create a route handler error.
    pub fn route_handler(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RouteHandler, message)
    }

    /// Returns `true` if this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Storage, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        Self::with_source(
            ErrorKind::Validation,
            format!("Invalid route pattern: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind() {
        let err = AppError::dependency("plugin 'blog' requires 'core'");
        assert_eq!(
            err.to_string(),
            "DEPENDENCY: plugin 'blog' requires 'core'"
        );
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AppError = io.into();
        assert!(err.is(ErrorKind::Storage));
        assert!(err.source.is_some());
    }

    #[test]
    fn test_clone_drops_source() {
        let io = std::io::Error::other("boom");
        let err: AppError = io.into();
        let cloned = err.clone();
        assert_eq!(cloned.kind, err.kind);
        assert!(cloned.source.is_none());
    }
}
