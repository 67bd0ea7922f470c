//! # AppError
//!
//! Centralized error handling for the anon-board core.
//! Every store, tree and board operation reports failures through this type.

use crate::models::EntryId;
use thiserror::Error;

/// The primary error type for all ab-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Referenced entry does not exist
    #[error("entry not found with ID {0}")]
    NotFound(EntryId),

    /// Missing content, field too long, bad parent reassignment
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Submission tried to claim the reserved operator name
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Infrastructure failure (e.g., DB down, disk full). Never masked.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

/// A specialized Result type for anon-board logic.
pub type Result<T> = std::result::Result<T, AppError>;
