//! Typed error taxonomy for the public service operations.
//!
//! Callers can branch on the kind without string-matching messages. The API
//! layer maps each kind to an HTTP status; processor/storage/internal detail
//! is logged there and collapsed to a generic client-visible message.

use thiserror::Error;

use crate::processor::ProcessorError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad input, rejected before any external call.
    #[error("{0}")]
    Validation(String),
    /// No caller identity was supplied.
    #[error("authentication required")]
    Unauthenticated,
    /// The caller is authenticated but does not own the referenced resource.
    #[error("forbidden")]
    Forbidden,
    /// Sponsoring yourself is explicitly rejected, unlike other authorization
    /// failures which stay generic.
    #[error("you cannot sponsor yourself")]
    SelfSponsorship,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("payment processor error: {0}")]
    Processor(#[from] ProcessorError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for kinds whose detail is safe to show to the caller.
    pub fn is_client_visible(&self) -> bool {
        matches!(
            self,
            ServiceError::Validation(_)
                | ServiceError::Unauthenticated
                | ServiceError::Forbidden
                | ServiceError::SelfSponsorship
                | ServiceError::NotFound(_)
        )
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
