//! Links service errors.

use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;

use crate::domain::links::token::LinkTokenError;

/// Public body shared by every capability-failure response so probing cannot
/// distinguish the reason beyond the status code.
pub const INVALID_LINK_MESSAGE: &str = "Invalid or expired token";

#[derive(Debug, Error)]
pub enum LinkServiceError {
    /// Token failed format validation; no store lookup was performed.
    #[error("link token is malformed")]
    MalformedToken(#[source] LinkTokenError),

    /// No link exists for the presented token.
    #[error("link not found")]
    NotFound,

    /// The link is past its expiry.
    #[error("link expired")]
    Expired,

    /// A one-time link was already resolved.
    #[error("link already consumed")]
    Consumed,

    /// The link was invalidated and can never resolve again.
    #[error("link disabled")]
    Disabled,

    /// Issuance referenced an RFQ that does not exist.
    #[error("rfq not found")]
    SubjectNotFound,

    /// Backing store unreachable or timed out; transient, retryable.
    #[error("storage error")]
    Store(#[source] Error),
}

impl LinkServiceError {
    /// HTTP status the out-of-scope routing layer should map this to.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::MalformedToken(_) => 400,
            Self::NotFound | Self::SubjectNotFound => 404,
            Self::Expired | Self::Consumed | Self::Disabled => 410,
            Self::Store(_) => 503,
        }
    }

    /// User-facing message; deliberately identical for all capability
    /// failures.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "Secure token is required",
            Self::NotFound | Self::Expired | Self::Consumed | Self::Disabled => {
                INVALID_LINK_MESSAGE
            }
            Self::SubjectNotFound => "RFQ not found",
            Self::Store(_) => "Service temporarily unavailable",
        }
    }
}

impl From<Error> for LinkServiceError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::ForeignKeyViolation) => Self::SubjectNotFound,
            _ => Self::Store(error),
        }
    }
}
