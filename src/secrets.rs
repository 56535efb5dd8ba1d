//! The secrets file.
//!
//! API credentials and the session key live in a small TOML file:
//!
//! ```toml
//! api_key = "0123456789abcdef0123456789abcdef"
//! api_secret = "0123456789abcdef0123456789abcdef"
//!
//! # Written by `scrobbler auth`
//! session_key = "d580d57f32848f5dcf574d1ce18d78b2"
//! username = "MyLastFMUsername"
//! ```
//!
//! Anyone holding this file can scrobble on the user's behalf, so it should
//! be kept private.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use veil::Redact;

use crate::error::{Error, Result};

/// Upper bound on the file size; the contents are a handful of short keys.
const MAX_FILE_SIZE: u64 = 4096;

/// Contents of the secrets file.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize, Redact)]
pub struct Secrets {
    pub api_key: String,

    #[redact]
    pub api_secret: String,

    #[redact]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Secrets {
    /// Checks that `path` is small enough to be a secrets file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be inspected or is too large.
    pub fn check(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Prevent out-of-memory condition: the file should be small.
        let file_size = fs::metadata(path)?.len();
        if file_size > MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large",
                path.display()
            )));
        }

        Ok(())
    }

    /// Reads the secrets file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is too large or is not
    /// valid TOML with at least `api_key` and `api_secret`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::check(path)?;

        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            Error::invalid_argument(format!("{} format is invalid: {e}", path.display()))
        })
    }

    /// Writes the secrets file, replacing its contents.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
