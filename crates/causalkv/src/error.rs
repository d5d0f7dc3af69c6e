//! Error taxonomy shared by every layer of the client.

use thiserror::Error;

/// Errors surfaced to callers of the client, pool, or connection layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Every resolved endpoint refused the connection or timed out while
    /// connecting.
    #[error("connection refused by every endpoint")]
    ConnectionRefused,

    /// The peer closed the connection before a full response arrived.
    #[error("not connected")]
    NotConnected,

    /// The request deadline elapsed before the response arrived. The
    /// connection abandons the request and closes its socket; the next
    /// submission reconnects.
    #[error("request timed out")]
    TimedOut,

    /// Hostname resolution failed; the pool drains every request with this
    /// error until it is destroyed.
    #[error("address not available: cannot resolve '{host}'")]
    ResolutionFailed {
        /// The hostname that failed to resolve.
        host: String,
    },

    /// The response frame was empty, carried an unexpected message code, or
    /// its payload did not parse.
    #[error("invalid response: {reason}")]
    InvalidResponse {
        /// What was wrong with the frame.
        reason: String,
    },

    /// The server answered with its error message type.
    #[error("server error: {message}")]
    ServerError {
        /// The server-provided error text.
        message: String,
    },

    /// A conflict write-back did not converge to a single content; fetching
    /// again may succeed.
    #[error("sibling resolution did not converge, try again")]
    ConflictNotResolved,

    /// The owning pool or client shut down before the response was
    /// delivered.
    #[error("aborted by shutdown")]
    Aborted,

    /// Any other transport-level failure, unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
