//! Common error types for AERIS

use thiserror::Error;

/// Common result type for AERIS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by all AERIS components.
///
/// The enum is `Clone` (string payloads only) so that coalesced cache
/// waiters can all receive the same failed result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid query or payload from a caller. Surfaced with a reason, never retried.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Upstream deadline elapsed before a response arrived.
    #[error("upstream deadline elapsed")]
    Timeout,

    /// Upstream returned non-2xx or an unparseable body.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Diagnostic marker for payloads produced by the deterministic fallback.
    #[error("payload produced by deterministic fallback")]
    FallbackMock,

    /// No provider produced any data and mock fallback is disabled.
    #[error("no air quality data available")]
    Unavailable,

    /// Programmer error or invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Error::BadRequest(reason.into())
    }

    pub fn upstream(cause: impl std::fmt::Display) -> Self {
        Error::Upstream(cause.to_string())
    }

    pub fn internal(cause: impl std::fmt::Display) -> Self {
        Error::Internal(cause.to_string())
    }

    /// Whether the error may cross the transport boundary as-is.
    ///
    /// Provider-side errors are absorbed into fallbacks at the client
    /// boundary and must never surface alone.
    pub fn is_surfaceable(&self) -> bool {
        matches!(
            self,
            Error::BadRequest(_) | Error::Unavailable | Error::Internal(_)
        )
    }
}
