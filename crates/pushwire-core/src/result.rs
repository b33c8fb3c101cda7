//! Convenience result type alias for Pushwire.

use crate::error::AppError;

/// A specialized `Result` type for Pushwire operations.
pub type AppResult<T> = Result<T, AppError>;
