//! Error handling for the scrobbler.
//!
//! Provides a unified error type whose [`ErrorKind`] mirrors the failure
//! categories of the Last.fm web service and of request signing.
//!
//! # Error Categories
//!
//! * Transport failures (unreachable host, timeout) -> [`ErrorKind::Network`]
//! * Rejected session keys (service error 9) -> [`ErrorKind::InvalidSession`]
//! * Any other service-reported failure -> [`ErrorKind::Service`]
//! * Malformed text while signing -> [`ErrorKind::InvalidScalarValue`] and
//!   [`ErrorKind::InvalidByteSequence`]
//! * Local misuse and configuration problems -> the remaining kinds
//!
//! # Example
//!
//! ```rust
//! use scrobbler::error::{Error, ErrorKind, Result};
//!
//! fn check(session_key: Option<&str>) -> Result<&str> {
//!     session_key.ok_or_else(|| Error::failed_precondition("not logged in"))
//! }
//!
//! let err = check(None).unwrap_err();
//! assert_eq!(err.kind, ErrorKind::FailedPrecondition);
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

use crate::codec;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Whether the service rejected the session key and the user must
    /// authenticate again.
    #[must_use]
    pub fn is_invalid_session(&self) -> bool {
        self.kind == ErrorKind::InvalidSession
    }
}

/// Standard result type for scrobbler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories.
///
/// The first five variants form the protocol taxonomy: they are what a
/// caller of the engine has to react to. The others cover local failures.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// The service could not be reached or did not answer in time.
    #[error("network error")]
    Network,

    /// The session key was rejected (service error code 9).
    #[error("invalid session key")]
    InvalidSession,

    /// Any other failure reported by the service.
    #[error("service error")]
    Service,

    /// A lone surrogate or out-of-range code point was about to be encoded.
    #[error("invalid scalar value")]
    InvalidScalarValue,

    /// Bytes that are not well-formed UTF-8.
    #[error("invalid byte sequence")]
    InvalidByteSequence,

    /// A value supplied by the caller or read from a file is malformed.
    #[error("invalid argument specified")]
    InvalidArgument,

    /// The operation is not possible in the current state.
    #[error("invalid state")]
    FailedPrecondition,

    /// A bounded wait ran out.
    #[error("operation timed out")]
    DeadlineExceeded,

    /// Unexpected internal failure.
    #[error("internal error")]
    Internal,
}

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error for transport failures.
    ///
    /// Use when the service is unreachable, a connection drops or a
    /// response body cannot be read. These are never retried here; the
    /// next observation tick is the retry.
    pub fn network<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Network, error)
    }

    /// Creates an error for a session key the service refused.
    pub fn invalid_session<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidSession, error)
    }

    /// Creates an error for a failure reported by the service.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::service("Invalid parameters");
    /// assert_eq!(err.kind, ErrorKind::Service);
    /// ```
    pub fn service<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Service, error)
    }

    /// Creates an error for text that cannot be encoded.
    pub fn invalid_scalar_value<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidScalarValue, error)
    }

    /// Creates an error for bytes that cannot be decoded.
    pub fn invalid_byte_sequence<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidByteSequence, error)
    }

    /// Creates an error for invalid arguments.
    ///
    /// Use when provided arguments or file contents don't meet
    /// validation requirements.
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for operations that failed due to current state.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::failed_precondition("no token requested");
    /// assert_eq!(err.kind, ErrorKind::FailedPrecondition);
    /// ```
    pub fn failed_precondition<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::FailedPrecondition, error)
    }

    /// Creates an error for operations that exceeded their deadline.
    pub fn deadline_exceeded<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DeadlineExceeded, error)
    }

    /// Creates an error for internal errors.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }
}

/// Returns the underlying error source.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error for display, showing both kind and details.
///
/// Format: "{kind}: {details}"
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Converts IO errors into appropriate error kinds.
///
/// Connection level failures are network errors; everything else
/// concerns local files.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected
            | AddrNotAvailable | BrokenPipe | TimedOut => Self::network(err),
            InvalidInput | InvalidData | UnexpectedEof => Self::invalid_argument(err),
            NotFound | PermissionDenied => Self::failed_precondition(err),
            _ => Self::internal(err),
        }
    }
}

/// Converts HTTP client errors into appropriate error kinds.
///
/// Anything that happens on the wire is a network error. Only a request
/// that could not be built is an internal error.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return Self::internal(err);
        }

        if err.is_decode() {
            return Self::service(err);
        }

        Self::network(err)
    }
}

/// Converts JSON errors to `Service`: the service answered with
/// something other than what it documents.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::service(err)
    }
}

/// Converts codec errors into their matching kinds.
impl From<codec::Error> for Error {
    fn from(err: codec::Error) -> Self {
        match err {
            codec::Error::InvalidScalarValue(_) => Self::invalid_scalar_value(err),
            codec::Error::InvalidByteSequence { .. } => Self::invalid_byte_sequence(err),
        }
    }
}

/// Converts TOML parsing errors to `InvalidArgument`.
impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts TOML serialization errors to `Internal`.
impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Self::internal(e.to_string())
    }
}

/// Converts URL parsing errors to `Internal`.
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::internal(e.to_string())
    }
}

/// Converts timeout errors to `DeadlineExceeded`.
impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_kind_and_details() {
        let err = Error::service("Invalid method signature supplied");
        assert_eq!(
            err.to_string(),
            "service error: Invalid method signature supplied"
        );
    }

    #[test]
    fn codec_errors_keep_their_kind() {
        let err = Error::from(codec::Error::InvalidScalarValue(0xD800));
        assert_eq!(err.kind, ErrorKind::InvalidScalarValue);
        assert!(matches!(
            err.downcast::<codec::Error>(),
            Some(codec::Error::InvalidScalarValue(0xD800))
        ));

        let err = Error::from(codec::Error::InvalidByteSequence { offset: 3 });
        assert_eq!(err.kind, ErrorKind::InvalidByteSequence);
    }

    #[test]
    fn io_errors_are_classified() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert_eq!(err.kind, ErrorKind::Network);

        let err = Error::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);
    }
}
