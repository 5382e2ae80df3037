//! Error taxonomy for the enrollment registry client.
//!
//! Every failure carries a machine-distinguishable kind. Local argument
//! checks fail with [`RegistryError::Validation`] before any request is
//! sent; everything the server or the network says is passed through
//! unmodified and never retried here.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::transport::TransportError;

/// Error type for enrollment registry operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RegistryError {
    /// A caller-supplied argument violates a precondition. Never produced
    /// from a server response.
    #[error("invalid argument: {message}")]
    Validation { message: String },

    /// The transport executor failed before a response was obtained.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The service answered with a non-2xx status.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The service answered 2xx but the body breaks the response contract.
    #[error("protocol violation: {message}")]
    ProtocolViolation { message: String },

    /// `next_page` was called on a query that has no further pages.
    #[error("query is exhausted; create a new query to start over")]
    QueryExhausted,
}

impl RegistryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// The service error, if this failure came from a non-2xx response.
    #[must_use]
    pub fn as_service(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.as_service()
            .is_some_and(|e| e.kind == ServiceErrorKind::NotFound)
    }

    /// Etag mismatch or conflicting record state (409 / 412).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.as_service()
            .is_some_and(|e| e.kind == ServiceErrorKind::Conflict)
    }

    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.as_service()
            .is_some_and(|e| e.kind == ServiceErrorKind::Throttled)
    }

    /// Whether a caller-side retry policy may reasonably try again.
    ///
    /// True for transport failures, throttling and 5xx responses. Conflicts
    /// are not retryable: the caller must re-read the record first.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Service(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Classification of a non-2xx service response by status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServiceErrorKind {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 404
    NotFound,
    /// 409 or 412 (etag mismatch)
    Conflict,
    /// 429
    Throttled,
    /// 5xx
    ServerError,
    /// Any other non-2xx status.
    Other,
}

impl ServiceErrorKind {
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            404 => Self::NotFound,
            409 | 412 => Self::Conflict,
            429 => Self::Throttled,
            500..=599 => Self::ServerError,
            _ => Self::Other,
        }
    }
}

/// Failure reported by the provisioning service.
#[derive(Error, Debug, Clone)]
#[error("service returned {status}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub status: StatusCode,
    /// Service-specific error code (`errorCode`), when the body carried one.
    pub code: Option<String>,
    /// Message from the body, or the status line when the body had none.
    pub message: String,
    /// Correlation id for support requests (`trackingId`).
    pub tracking_id: Option<String>,
    /// `Retry-After` hint, typically present on 429 and 503.
    pub retry_after: Option<Duration>,
}

impl ServiceError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ServiceErrorKind::Throttled | ServiceErrorKind::ServerError
        )
    }
}
