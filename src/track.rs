//! Observed tracks and the scrobble timing rule.
//!
//! A [`Track`] is a snapshot of what the player reports on every polling
//! tick. The scrobbler compares the [`TrackId`] of consecutive snapshots
//! to tell a continuing playback session from a new one.
//!
//! # Eligibility
//!
//! Last.fm accepts a scrobble once a track longer than 30 seconds has
//! played for half of its duration. Users can choose to wait until 90%
//! instead:
//!
//! ```rust
//! use std::time::Duration;
//! use scrobbler::track::{ScrobbleAt, Track};
//!
//! let mut track = Track::new("Björk", "Jóga");
//! track.duration = Duration::from_secs(200);
//! track.elapsed = Duration::from_secs(100);
//!
//! assert!(track.is_scrobble_eligible(ScrobbleAt::Half));
//! assert!(!track.is_scrobble_eligible(ScrobbleAt::End));
//! ```

use std::{
    fmt,
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identity of a playback session.
///
/// Derived by the observer from title and artist, so two different
/// recordings with equal title and artist share an id.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    /// Builds the id the way the page observer does: title followed by
    /// artist.
    #[must_use]
    pub fn from_title_artist(title: &str, artist: &str) -> Self {
        Self(format!("{title}{artist}"))
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A snapshot of the track currently playing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Track {
    pub id: TrackId,
    pub artist: String,
    pub title: String,

    /// Playback position within the track.
    #[serde(rename = "elapsed_ms", with = "millis")]
    pub elapsed: Duration,

    /// Total length of the track; zero while unknown.
    #[serde(rename = "duration_ms", with = "millis")]
    pub duration: Duration,

    #[serde(default)]
    pub is_video: bool,

    #[serde(default)]
    pub is_paused: bool,
}

impl Track {
    /// Tracks this short are never scrobbled.
    pub const MIN_DURATION: Duration = Duration::from_secs(30);

    /// A track at position zero with unknown duration, identified by title
    /// and artist.
    #[must_use]
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        let artist = artist.into();
        let title = title.into();

        Self {
            id: TrackId::from_title_artist(&title, &artist),
            artist,
            title,
            elapsed: Duration::ZERO,
            duration: Duration::ZERO,
            is_video: false,
            is_paused: false,
        }
    }

    /// Whether this track has played long enough to be scrobbled.
    #[must_use]
    pub fn is_scrobble_eligible(&self, scrobble_at: ScrobbleAt) -> bool {
        if self.duration <= Self::MIN_DURATION {
            return false;
        }

        self.elapsed >= scrobble_at.threshold(self.duration)
    }

    /// Estimated wall clock time at which playback started.
    ///
    /// Scrobble timestamps denote the start of playback, not its end.
    #[must_use]
    pub fn started_at(&self, now: SystemTime) -> SystemTime {
        now.checked_sub(self.elapsed).unwrap_or(UNIX_EPOCH)
    }

    /// [`started_at`](Self::started_at) in whole seconds since the epoch.
    #[must_use]
    pub fn timestamp(&self, now: SystemTime) -> i64 {
        let secs = self
            .started_at(now)
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        i64::try_from(secs).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// How far into a track a scrobble is submitted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrobbleAt {
    /// After half of the track.
    #[default]
    Half,
    /// After 90% of the track.
    End,
}

impl ScrobbleAt {
    /// Position from which a track of `duration` is eligible.
    #[must_use]
    pub fn threshold(self, duration: Duration) -> Duration {
        match self {
            Self::Half => duration / 2,
            Self::End => duration * 9 / 10,
        }
    }
}

impl fmt::Display for ScrobbleAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Half => write!(f, "half"),
            Self::End => write!(f, "end"),
        }
    }
}

impl FromStr for ScrobbleAt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "half" => Ok(Self::Half),
            "end" => Ok(Self::End),
            _ => Err(Error::invalid_argument(format!(
                "scrobble point should be \"half\" or \"end\" but is \"{s}\""
            ))),
        }
    }
}

/// Durations as integer milliseconds on the wire.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
