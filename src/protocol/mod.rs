//! Protocol types for the Last.fm web service.
//!
//! This module contains the response types of the service methods the
//! scrobbler calls, and the JSON parsing shared by all of them:
//!
//! * [`auth`] - tokens and sessions of the authorization handshake
//! * [`track`] - now playing, scrobble, love and track info responses
//! * [`error`] - the error body returned by failed calls
//!
//! # Usage Example
//!
//! ```
//! use scrobbler::protocol::{self, auth::Token};
//!
//! let token: Token = protocol::json(r#"{"token":"T1"}"#, "auth.getToken")?;
//! ```

pub mod auth;
pub mod error;
pub mod track;

pub use error::ApiError;

use crate::error::Result;
use serde::Deserialize;
use std::fmt::Debug;

/// Defines a service method identifier.
///
/// Each response type names the method that produces it, using the
/// service's dot notation (e.g. `track.scrobble`).
///
/// # Examples
///
/// ```rust
/// use scrobbler::protocol::{Method, auth::Token};
///
/// assert_eq!(Token::METHOD, "auth.getToken");
/// ```
pub trait Method {
    /// The service method name.
    const METHOD: &'static str;

    /// Whether the response carries credentials and must not be logged.
    const REDACTED: bool = false;
}

/// Parses and logs JSON responses.
///
/// # Errors
///
/// Returns error if the body is not valid JSON or its structure doesn't
/// match `T`.
///
/// # Logging
///
/// * Success: Logs parsed structure at TRACE level
/// * Parse Error: Logs raw JSON at TRACE level if valid JSON
/// * Invalid JSON: Logs error and raw text at ERROR level
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}

/// Decodes an already parsed response into `T`.
///
/// # Errors
///
/// Returns error if the structure of `value` doesn't match `T`.
pub fn from_value<T>(value: serde_json::Value) -> Result<T>
where
    T: Method + for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_value::<T>(value) {
        Ok(result) => {
            if T::REDACTED {
                trace!("{}: {{ ... }}", T::METHOD);
            } else {
                trace!("{}: {result:#?}", T::METHOD);
            }
            Ok(result)
        }
        Err(e) => {
            error!("{}: unexpected response ({e})", T::METHOD);
            Err(e.into())
        }
    }
}
