//! State owned by the scrobbler engine.
//!
//! All mutable state lives in one [`EngineState`], shared between the
//! scrobbler and the authorization flow through a [`Handle`]. The handle
//! serializes access: it is locked only for short synchronous sections and
//! never while a request is in flight, so a host may drive the engine from
//! several tasks without risking a lock held across an await point.
//!
//! The host persists the state however it likes: [`EngineState`]
//! serializes with `serde`, in-flight guards excepted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use veil::Redact;

use crate::track::{ScrobbleAt, Track, TrackId};

/// Everything the engine knows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineState {
    pub now_playing: NowPlaying,
    pub session: Session,
    pub preferences: Preferences,

    /// User-visible text of the last failed call, if any.
    pub error: Option<String>,
}

/// The track currently playing and what has been reported about it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NowPlaying {
    pub track: Option<Track>,

    /// The service has been told this track is playing.
    pub is_now_playing_notified: bool,

    /// This track has been scrobbled. Only a new track id resets it.
    pub is_scrobbled: bool,

    /// Loved status as reported by the service, toggled locally.
    pub user_loved: bool,

    /// How often the user played this track, as reported by the service.
    pub user_play_count: Option<u64>,

    #[serde(skip)]
    pub in_flight: InFlight,
}

impl NowPlaying {
    /// Id of the current track, if any.
    #[must_use]
    pub fn id(&self) -> Option<&TrackId> {
        self.track.as_ref().map(|track| &track.id)
    }

    /// Whether `id` still identifies the current track.
    #[must_use]
    pub fn is_current(&self, id: &TrackId) -> bool {
        self.id() == Some(id)
    }

    /// Starts a new playback session for `track`.
    pub fn start(&mut self, track: Track) {
        *self = Self {
            track: Some(track),
            ..Self::default()
        };
    }

    /// Forgets the current track so that the next observation starts a new
    /// session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Calls currently awaiting a response for the current track.
///
/// Cleared together with the track, so a guard never outlives the session
/// it was set for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InFlight {
    pub now_playing: bool,
    pub scrobble: bool,
}

/// Authentication state.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize, Redact)]
pub struct Session {
    /// Token awaiting user approval.
    #[redact]
    pub token: Option<String>,

    /// Credential for authenticated calls.
    #[redact]
    pub key: Option<String>,

    pub username: Option<String>,

    #[serde(default)]
    pub subscriber: bool,
}

impl Session {
    /// Whether authenticated calls can be made.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.key.is_some()
    }

    /// Drops the session key and everything derived from it.
    pub fn clear(&mut self) {
        self.key = None;
        self.username = None;
        self.subscriber = false;
    }
}

/// User preferences, read before every scrobble decision.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Preferences {
    pub scrobble_enabled: bool,
    pub scrobble_at: ScrobbleAt,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            scrobble_enabled: true,
            scrobble_at: ScrobbleAt::default(),
        }
    }
}

/// Serialized access to an [`EngineState`].
#[derive(Clone, Debug, Default)]
pub struct Handle(Arc<Mutex<EngineState>>);

impl Handle {
    #[must_use]
    pub fn new(state: EngineState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    /// Locks the state.
    ///
    /// A poisoned lock is recovered: every mutation leaves the state
    /// consistent, so the last written value is as good as any.
    pub fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with the state locked.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut EngineState) -> R,
    {
        f(&mut self.lock())
    }

    /// A copy of the current state, for persisting or display.
    #[must_use]
    pub fn snapshot(&self) -> EngineState {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_a_track_clears_flags_and_guards() {
        let mut now_playing = NowPlaying {
            track: Some(Track::new("A", "a")),
            is_now_playing_notified: true,
            is_scrobbled: true,
            user_loved: true,
            user_play_count: Some(3),
            in_flight: InFlight {
                now_playing: true,
                scrobble: true,
            },
        };

        now_playing.start(Track::new("B", "b"));

        assert!(now_playing.is_current(&TrackId::from_title_artist("b", "B")));
        assert!(!now_playing.is_now_playing_notified);
        assert!(!now_playing.is_scrobbled);
        assert!(!now_playing.user_loved);
        assert_eq!(now_playing.user_play_count, None);
        assert_eq!(now_playing.in_flight, InFlight::default());
    }

    #[test]
    fn session_debug_output_hides_credentials() {
        let session = Session {
            token: Some("T1".to_owned()),
            key: Some("S1".to_owned()),
            username: Some("u".to_owned()),
            subscriber: false,
        };

        let debug = format!("{session:?}");
        assert!(!debug.contains("T1"));
        assert!(!debug.contains("S1"));
        assert!(session.is_authenticated());
    }

    #[test]
    fn state_round_trips_through_toml() {
        let mut state = EngineState::default();
        state.session.key = Some("S1".to_owned());
        state.preferences.scrobble_at = ScrobbleAt::End;

        let text = toml::to_string(&state).unwrap();
        let parsed: EngineState = toml::from_str(&text).unwrap();
        assert_eq!(parsed, state);
    }
}
