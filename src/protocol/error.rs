//! Error bodies returned by failed service calls.
//!
//! ```json
//! { "error": 9, "message": "Invalid session key - Please re-authenticate" }
//! ```

use std::fmt;

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};

/// Error code for a session key that expired or was revoked.
pub const INVALID_SESSION_KEY: u32 = 9;

/// A failure reported by the service.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct ApiError {
    /// Service error code.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "error")]
    pub code: u32,

    /// Human-readable description, when supplied.
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    /// Whether the user has to authenticate again.
    #[must_use]
    pub fn is_invalid_session(&self) -> bool {
        self.code == INVALID_SESSION_KEY
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "error {}", self.code)
        } else {
            write!(f, "{} (error {})", self.message, self.code)
        }
    }
}

impl std::error::Error for ApiError {}
