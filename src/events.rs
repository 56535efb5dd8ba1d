//! Events reported by scrobbler and authorization operations.
//!
//! Hosts can use these to:
//! * Log what was sent to the service
//! * Persist state after it changed
//! * Tell the user that they need to authenticate again
//!
//! # Example
//!
//! ```rust
//! use scrobbler::events::Event;
//!
//! fn handle_event(event: Event) {
//!     match event {
//!         Event::Scrobbled => println!("scrobbled"),
//!         Event::SessionInvalidated => println!("please log in again"),
//!         // ... handle other events ...
//!         _ => {}
//!     }
//! }
//! ```

use std::fmt;

/// Something the engine did or learned.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// A new playback session started.
    TrackChanged,

    /// The user's play count and loved status were fetched.
    TrackInfoUpdated,

    /// The service was told what is playing.
    NowPlaying,

    /// The current track was scrobbled.
    Scrobbled,

    /// The track was marked as loved.
    Loved,

    /// The loved mark was removed.
    Unloved,

    /// A token was issued and awaits approval in the browser.
    TokenIssued,

    /// A session key was obtained.
    SessionEstablished,

    /// The service rejected the session key, which has been dropped.
    SessionInvalidated,
}

impl Event {
    /// Whether the host should persist the engine state after this event.
    #[must_use]
    pub fn changes_session(self) -> bool {
        matches!(
            self,
            Self::TokenIssued | Self::SessionEstablished | Self::SessionInvalidated
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::TrackChanged => "track changed",
            Self::TrackInfoUpdated => "track info updated",
            Self::NowPlaying => "now playing",
            Self::Scrobbled => "scrobbled",
            Self::Loved => "loved",
            Self::Unloved => "unloved",
            Self::TokenIssued => "token issued",
            Self::SessionEstablished => "session established",
            Self::SessionInvalidated => "session invalidated",
        };
        write!(f, "{text}")
    }
}
