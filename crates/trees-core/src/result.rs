//! Convenience result type alias for Trees.

use crate::error::AppError;

/// A specialized `Result` type for Trees operations.
pub type AppResult<T> = Result<T, AppError>;
