//! The observer feed.
//!
//! Players report what they are doing as JSON lines, one observation per
//! line:
//!
//! ```json
//! {"type":"playing","artist":"Björk","title":"Jóga","elapsed_ms":12000,"duration_ms":305000}
//! {"type":"seek"}
//! {"type":"love"}
//! {"type":"unload"}
//! ```
//!
//! `playing` is expected every few seconds while a track plays. `id`
//! defaults to the title followed by the artist.

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    events::Event,
    scrobbler::Scrobbler,
    track::{Track, TrackId},
    transport::Transport,
};

/// One line of the observer feed.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Observation {
    Playing(Playing),
    Seek,
    Unload,
    Love,
}

/// A `playing` observation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Playing {
    #[serde(default)]
    pub id: Option<TrackId>,

    #[serde(flatten)]
    pub track: PlayingTrack,
}

/// Track fields of a `playing` observation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PlayingTrack {
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub is_paused: bool,
}

impl From<Playing> for Track {
    fn from(playing: Playing) -> Self {
        let PlayingTrack {
            artist,
            title,
            elapsed_ms,
            duration_ms,
            is_video,
            is_paused,
        } = playing.track;

        let mut track = Track::new(artist, title);
        if let Some(id) = playing.id {
            track.id = id;
        }
        track.elapsed = std::time::Duration::from_millis(elapsed_ms);
        track.duration = std::time::Duration::from_millis(duration_ms);
        track.is_video = is_video;
        track.is_paused = is_paused;
        track
    }
}

impl Observation {
    /// Parses one line of the feed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the line is not a known observation.
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line)
            .map_err(|e| Error::invalid_argument(format!("invalid observation: {e}")))
    }

    /// Feeds this observation to `scrobbler`.
    ///
    /// # Errors
    ///
    /// Returns error if a resulting call fails.
    pub async fn apply<T>(self, scrobbler: &Scrobbler<T>) -> Result<Vec<Event>>
    where
        T: Transport,
    {
        match self {
            Self::Playing(playing) => scrobbler.observe(playing.into()).await,
            Self::Seek => {
                scrobbler.seek();
                Ok(Vec::new())
            }
            Self::Unload => {
                scrobbler.unload();
                Ok(Vec::new())
            }
            Self::Love => scrobbler.toggle_love().await.map(|event| vec![event]),
        }
    }
}
