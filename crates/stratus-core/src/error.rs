//! Error types for stratus-core.
//!
//! Two layers of errors exist:
//!
//! - [`ProviderError`] is what a [`WeatherProvider`](crate::WeatherProvider)
//!   returns. It classifies a single gateway call and carries no retry
//!   policy: the gateway never retries.
//! - [`Error`] is what engine operations return. Every variant maps to a
//!   stable [`ErrorKind`] through [`Error::kind`], which is also the value
//!   written to the sync outcome log.
//!
//! # Classification
//!
//! | Variant | Kind | Typical cause |
//! |---------|------|---------------|
//! | [`Error::LocationNotFound`], [`Error::NotFound`] | `not_found` | Unknown location id or place name |
//! | [`Error::RateLimited`] | `rate_limited` | Outbound budget exhausted or provider 429 |
//! | [`Error::ProviderUnavailable`] | `provider_unavailable` | Network failure, timeout, provider 5xx |
//! | [`Error::InvalidResponse`] | `invalid_response` | Malformed provider payload |
//! | [`Error::SyncInProgress`] | `sync_in_progress` | Forced sync while a cycle is in flight |
//! | [`Error::Validation`] | `validation` | Malformed interval, days, preference |
//! | [`Error::Storage`] | `storage` | SQLite failure |
//!
//! A conflict note is not an error; it is reported as the `sync_note` of a
//! successful [`WeatherView`](crate::WeatherView).
//!
//! # Retrying
//!
//! Transient failures are surfaced once and recorded. The
//! [`Scheduler`](crate::Scheduler) retries naturally on its next tick.

use stratus_types::{ErrorKind, ValidationError};
use thiserror::Error;

/// Classified failure of a single provider call.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// The provider could not resolve the requested place or coordinates.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider rejected the call because its quota was exceeded.
    #[error("Provider rate limit exceeded")]
    RateLimited,

    /// Network failure, timeout, missing credentials or provider 5xx.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with a payload that could not be parsed.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Result type for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors returned by engine operations.
///
/// The type is `Clone` so that the result of one in-flight sync cycle can
/// be handed to every caller waiting on it. Storage failures are carried
/// as messages for the same reason.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum Error {
    /// No tracked location has this id.
    #[error("Location not found: {0}")]
    LocationNotFound(i64),

    /// A place name or resource could not be resolved.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An inbound or outbound rate limit denied the call.
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        /// Seconds until a retry can be admitted, when known.
        retry_after_secs: Option<u64>,
    },

    /// The provider could not be reached or failed transiently.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider returned a malformed payload.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// A forced sync was requested while a cycle for the location is running.
    #[error("Sync already in progress for location {0}")]
    SyncInProgress(i64),

    /// Malformed input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Local database failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::LocationNotFound(_) | Error::NotFound(_) => ErrorKind::NotFound,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Error::InvalidResponse(_) => ErrorKind::InvalidResponse,
            Error::SyncInProgress(_) => ErrorKind::SyncInProgress,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Seconds a caller should wait before retrying, for rate-limit errors.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Error::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    /// Create a validation error for a named field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation(ValidationError::invalid(field, message))
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => Error::NotFound(msg),
            ProviderError::RateLimited => Error::RateLimited {
                message: "provider rate limit exceeded".to_string(),
                retry_after_secs: None,
            },
            ProviderError::Unavailable(msg) => Error::ProviderUnavailable(msg),
            ProviderError::InvalidResponse(msg) => Error::InvalidResponse(msg),
        }
    }
}

impl From<stratus_store::Error> for Error {
    fn from(err: stratus_store::Error) -> Self {
        match err {
            stratus_store::Error::LocationNotFound(id) => Error::LocationNotFound(id),
            other => Error::Storage(other.to_string()),
        }
    }
}

/// Result type alias using stratus-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mapping() {
        let err: Error = ProviderError::RateLimited.into();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.retry_after_secs(), None);

        let err: Error = ProviderError::Unavailable("timeout".into()).into();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert!(err.to_string().contains("timeout"));

        let err: Error = ProviderError::NotFound("Atlantis".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: Error = ProviderError::InvalidResponse("missing dt".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_store_error_mapping() {
        let err: Error = stratus_store::Error::LocationNotFound(9).into();
        assert_eq!(err, Error::LocationNotFound(9));

        let err: Error = stratus_store::Error::InvalidTimestamp("bad".into()).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_validation_kind() {
        let err = Error::invalid("days", "must be between 1 and 30");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "Invalid value for days: must be between 1 and 30"
        );
    }

    #[test]
    fn test_sync_in_progress_display() {
        let err = Error::SyncInProgress(4);
        assert_eq!(err.kind(), ErrorKind::SyncInProgress);
        assert_eq!(err.to_string(), "Sync already in progress for location 4");
    }
}
