use thiserror::Error;

use billforge_core::DomainError;

use crate::collaborators::{CollaboratorError, HeaderRejection};
use crate::sequence::AllocationError;

/// Failure of an invoice creation.
///
/// Everything up to and including `ReferenceNotFound` is detected before a
/// sequence number is allocated, so those failures never burn a number.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvoicingError {
    /// Caller input malformed (deterministic).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Company, customer, channel, representative or product missing or inconsistent.
    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    /// Internal invariant broken while assembling (a bug, not bad input).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A collaborator could not be reached; retrying may succeed.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The operation was cancelled before a number was allocated.
    #[error("invoice creation cancelled")]
    Cancelled,

    /// Sequence retry budget exhausted.
    #[error("sequence allocation for period '{period_key}' conflicted after {attempts} attempt(s)")]
    AllocationConflict { period_key: String, attempts: u32 },

    /// The sequence store failed or the period's counter is exhausted.
    #[error("sequence allocation failed: {0}")]
    Sequence(String),

    /// Storing the issued invoice failed. The allocated number is lost.
    #[error("failed to persist invoice: {0}")]
    Persistence(String),
}

impl InvoicingError {
    /// Whether the same request may succeed when retried unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InvoicingError::Unavailable(_)
                | InvoicingError::AllocationConflict { .. }
                | InvoicingError::Sequence(_)
                | InvoicingError::Persistence(_)
        )
    }
}

impl From<DomainError> for InvoicingError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => InvoicingError::Validation(msg),
            DomainError::InvalidId(msg) => InvoicingError::Validation(msg),
            DomainError::NotFound(msg) => InvoicingError::ReferenceNotFound(msg),
            DomainError::InvariantViolation(msg) => InvoicingError::InvariantViolation(msg),
            DomainError::Conflict(msg) => InvoicingError::InvariantViolation(msg),
        }
    }
}

impl From<AllocationError> for InvoicingError {
    fn from(value: AllocationError) -> Self {
        match value {
            AllocationError::Conflict {
                period_key,
                attempts,
            } => InvoicingError::AllocationConflict {
                period_key,
                attempts,
            },
            other => InvoicingError::Sequence(other.to_string()),
        }
    }
}

impl From<HeaderRejection> for InvoicingError {
    fn from(value: HeaderRejection) -> Self {
        match value {
            HeaderRejection::Unavailable(msg) => InvoicingError::Unavailable(msg),
            other => InvoicingError::ReferenceNotFound(other.to_string()),
        }
    }
}

impl From<CollaboratorError> for InvoicingError {
    fn from(value: CollaboratorError) -> Self {
        match value {
            CollaboratorError::Unavailable(msg) => InvoicingError::Unavailable(msg),
            CollaboratorError::DuplicateInvoiceNumber(number) => {
                InvoicingError::Persistence(format!("invoice number {number} already stored"))
            }
        }
    }
}
