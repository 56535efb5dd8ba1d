//! Authorization handshake responses.
//!
//! Desktop applications authenticate in three steps:
//! 1. `auth.getToken` returns an unauthorized token
//! 2. the user approves the token in a browser
//! 3. `auth.getSession` exchanges the approved token for a session key
//!
//! # Example Responses
//!
//! ```json
//! { "token": "cf45fe5a3e3cebe168480a086d7fe481" }
//! ```
//!
//! ```json
//! {
//!     "session": {
//!         "name": "MyLastFMUsername",
//!         "key": "d580d57f32848f5dcf574d1ce18d78b2",
//!         "subscriber": 0
//!     }
//! }
//! ```

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use veil::Redact;

use super::Method;

/// Response of `auth.getToken`.
#[derive(Clone, Eq, PartialEq, Deserialize, Redact, Hash)]
pub struct Token {
    /// Unauthorized token, valid for 60 minutes.
    #[redact]
    pub token: String,
}

impl Method for Token {
    const METHOD: &'static str = "auth.getToken";
    const REDACTED: bool = true;
}

/// Response of `auth.getSession`.
#[derive(Clone, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct SessionResponse {
    pub session: Session,
}

impl Method for SessionResponse {
    const METHOD: &'static str = "auth.getSession";
    const REDACTED: bool = true;
}

/// An established web service session.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Deserialize, Redact, Hash)]
pub struct Session {
    /// Name of the user who approved the token.
    pub name: String,

    /// Session key; does not expire unless the user revokes it.
    #[redact]
    pub key: String,

    /// Sent as either a number or a string.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub subscriber: u8,
}

impl Session {
    #[must_use]
    pub fn is_subscriber(&self) -> bool {
        self.subscriber != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;

    #[test]
    fn parses_session_with_numeric_or_text_subscriber() {
        let numeric: SessionResponse = protocol::json(
            r#"{"session":{"name":"u","key":"S1","subscriber":0}}"#,
            SessionResponse::METHOD,
        )
        .unwrap();
        assert_eq!(numeric.session.key, "S1");
        assert_eq!(numeric.session.name, "u");
        assert!(!numeric.session.is_subscriber());

        let text: SessionResponse = protocol::json(
            r#"{"session":{"name":"u","key":"S1","subscriber":"1"}}"#,
            SessionResponse::METHOD,
        )
        .unwrap();
        assert!(text.session.is_subscriber());
    }

    #[test]
    fn does_not_leak_keys_in_debug_output() {
        let token: Token = protocol::json(r#"{"token":"T1"}"#, Token::METHOD).unwrap();
        assert_eq!(token.token, "T1");
        assert!(!format!("{token:?}").contains("T1"));
    }
}
