//! Error types for the expense store

use thiserror::Error;
use uuid::Uuid;

use crate::domain::ValidationError;

/// Errors that can occur in the expense store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Expense not found
    #[error("expense not found: {0}")]
    NotFound(Uuid),

    /// Rejected input
    #[error("invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        StoreError::Invalid {
            field: err.field,
            message: err.message,
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
