//! Application-level error type.
//!
//! The HTTP boundary lives outside this crate; instead of response
//! conversion, `AppError` exposes a stable machine-readable `code()` the
//! boundary maps onto its own statuses. Validation, not-found and conflict
//! outcomes are terminal business results and must never be retried;
//! `unavailable` is the only code a caller may reasonably retry.

use thiserror::Error;

use crate::{
    application::repos::RepoError, domain::error::DomainError, infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Stable error code for the external boundary.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) | AppError::NotFound => "not_found",
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                "validation_error"
            }
            AppError::Domain(DomainError::Conflict { .. }) | AppError::Conflict(_) => "conflict",
            AppError::Infra(InfraError::Database { .. }) => "unavailable",
            AppError::Domain(DomainError::Invariant { .. })
            | AppError::Infra(_)
            | AppError::Unexpected(_) => "internal",
        }
    }

    /// Whether a caller may retry the operation without changing the request.
    pub fn is_retryable(&self) -> bool {
        self.code() == "unavailable"
    }
}

impl From<RepoError> for AppError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::NotFound => AppError::NotFound,
            RepoError::Duplicate { constraint } => {
                AppError::Conflict(format!("duplicate record violates `{constraint}`"))
            }
            RepoError::InvalidInput { message } => AppError::Validation(message),
            RepoError::Integrity { message } => AppError::Conflict(message),
            RepoError::Timeout => AppError::Infra(InfraError::database("database timeout")),
            RepoError::Persistence(message) => AppError::Infra(InfraError::database(message)),
        }
    }
}
