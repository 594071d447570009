//! Errors returned by control-plane gateways.

use thiserror::Error;

/// Failures talking to the control-plane API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlPlaneError {
    /// The configured API URL could not be used.
    #[error("control-plane URL is invalid: {message}")]
    InvalidUrl {
        /// Parse failure detail.
        message: String,
    },

    /// The control plane rejected the bearer token.
    #[error("control plane rejected the credentials: {message}")]
    Authentication {
        /// Response detail.
        message: String,
    },

    /// The addressed resource does not exist.
    #[error("{resource} not found: {message}")]
    NotFound {
        /// Resource that was addressed.
        resource: String,
        /// Response detail.
        message: String,
    },

    /// The request was understood and refused.
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Control-plane error code, when present in the body.
        code: Option<i32>,
        /// Error message from the response body.
        message: String,
    },

    /// A transport failure or temporary unavailability; safe to retry reads.
    #[error("control plane unavailable: {message}")]
    Transient {
        /// Transport-level detail.
        message: String,
    },

    /// The response body did not match the expected shape.
    #[error("could not decode control-plane response: {message}")]
    Decode {
        /// Decoder detail.
        message: String,
    },
}

impl ControlPlaneError {
    /// True when repeating an idempotent read could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Control-plane error code, when the response carried one.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Rejected { code, .. } => *code,
            _ => None,
        }
    }

    /// The bare message, without the variant prefix, for matching.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidUrl { message }
            | Self::Authentication { message }
            | Self::NotFound { message, .. }
            | Self::Rejected { message, .. }
            | Self::Transient { message }
            | Self::Decode { message } => message,
        }
    }
}
