//! # AppError
//!
//! Centralized error handling for the Rusty-Album ecosystem.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all ra-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing required input (e.g., file, title, comment)
    #[error("validation error: {0}")]
    Validation(String),

    /// Sign-in/sign-up rejected by the auth provider
    #[error("auth error: {0}")]
    Auth(String),

    /// Blob upload or download-URL retrieval failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Document read/write/delete failed
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Referenced record absent (e.g., editing a deleted post)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Anything that should never surface as one of the above
    #[error("internal service error: {0}")]
    Internal(String),
}

/// A specialized Result type for Rusty-Album logic.
pub type Result<T> = std::result::Result<T, AppError>;
