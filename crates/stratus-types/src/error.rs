//! Validation errors for stratus-types.

use thiserror::Error;

/// Errors raised when a value does not satisfy a domain constraint.
///
/// This error type is I/O-free; storage and provider failures live in
/// stratus-store and stratus-core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// Latitude or longitude outside the valid range.
    #[error("Invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates {
        /// Rejected latitude.
        latitude: f64,
        /// Rejected longitude.
        longitude: f64,
    },

    /// Sync interval outside the allowed bounds.
    #[error("Invalid sync interval {value}s: must be between {min}s and {max}s")]
    InvalidInterval {
        /// Rejected interval in seconds.
        value: i64,
        /// Minimum allowed interval.
        min: u32,
        /// Maximum allowed interval.
        max: u32,
    },

    /// A value could not be parsed for the named field.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// Field or parameter name.
        field: String,
        /// Description of the problem.
        message: String,
    },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias using stratus-types' ValidationError type.
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
