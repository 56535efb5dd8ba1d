//! Track method responses.
//!
//! Write methods answer with little of interest; the scrobbler mostly
//! checks that they succeeded. `track.getInfo` carries the user's play
//! count and loved status when called with a `username`.

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use super::Method;

/// Response of `track.updateNowPlaying`.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct NowPlaying {
    #[serde(rename = "nowplaying", default)]
    pub now_playing: serde_json::Value,
}

impl Method for NowPlaying {
    const METHOD: &'static str = "track.updateNowPlaying";
}

/// Response of `track.scrobble`.
///
/// ```json
/// {
///     "scrobbles": {
///         "@attr": { "accepted": 1, "ignored": 0 },
///         "scrobble": { ... }
///     }
/// }
/// ```
///
/// Counts are informational only. A successful call means the play was
/// recorded, so missing counts still decode.
#[derive(Clone, Default, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct Scrobbles {
    #[serde(default)]
    pub scrobbles: ScrobbleBatch,
}

impl Method for Scrobbles {
    const METHOD: &'static str = "track.scrobble";
}

impl Scrobbles {
    /// Number of scrobbles the service filtered out.
    ///
    /// Ignored scrobbles are final: resubmitting them is ignored as well.
    #[must_use]
    pub fn ignored(&self) -> u64 {
        self.scrobbles.attr.map_or(0, |counts| counts.ignored)
    }
}

#[derive(Clone, Default, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct ScrobbleBatch {
    #[serde(rename = "@attr", default)]
    pub attr: Option<ScrobbleCounts>,
}

#[serde_as]
#[derive(Clone, Copy, Default, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct ScrobbleCounts {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub accepted: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub ignored: u64,
}

/// Response of `track.love`.
#[derive(Clone, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct Love {}

impl Method for Love {
    const METHOD: &'static str = "track.love";
}

/// Response of `track.unlove`.
#[derive(Clone, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct Unlove {}

impl Method for Unlove {
    const METHOD: &'static str = "track.unlove";
}

/// Response of `track.getInfo`.
#[derive(Clone, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct InfoResponse {
    pub track: Info,
}

impl Method for InfoResponse {
    const METHOD: &'static str = "track.getInfo";
}

/// The user specific part of track metadata.
///
/// Numbers are sent as strings.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Deserialize, Debug, Hash)]
pub struct Info {
    pub name: String,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(rename = "userplaycount")]
    pub user_play_count: Option<u64>,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(rename = "userloved")]
    pub user_loved: Option<u8>,
}

impl Info {
    #[must_use]
    pub fn is_loved(&self) -> bool {
        self.user_loved.is_some_and(|loved| loved != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;

    #[test]
    fn parses_user_track_info() {
        let response: InfoResponse = protocol::json(
            r#"{"track":{"name":"Jóga","duration":"305000","userplaycount":"42","userloved":"1"}}"#,
            InfoResponse::METHOD,
        )
        .unwrap();
        assert_eq!(response.track.user_play_count, Some(42));
        assert!(response.track.is_loved());

        let anonymous: InfoResponse =
            protocol::json(r#"{"track":{"name":"Jóga"}}"#, InfoResponse::METHOD).unwrap();
        assert_eq!(anonymous.track.user_play_count, None);
        assert!(!anonymous.track.is_loved());
    }

    #[test]
    fn parses_scrobble_counts() {
        let response: Scrobbles = protocol::json(
            r#"{"scrobbles":{"@attr":{"accepted":0,"ignored":"1"},"scrobble":{}}}"#,
            Scrobbles::METHOD,
        )
        .unwrap();
        assert_eq!(response.ignored(), 1);
        assert_eq!(response.scrobbles.attr.map(|counts| counts.accepted), Some(0));
    }

    #[test]
    fn scrobble_counts_are_optional() {
        let response: Scrobbles =
            protocol::json(r#"{"scrobbles":{"scrobble":{}}}"#, Scrobbles::METHOD).unwrap();
        assert_eq!(response.scrobbles.attr, None);
        assert_eq!(response.ignored(), 0);

        let bare: Scrobbles = protocol::json("{}", Scrobbles::METHOD).unwrap();
        assert_eq!(bare, Scrobbles::default());
    }

    #[test]
    fn love_accepts_empty_object() {
        let _: Love = protocol::json("{}", Love::METHOD).unwrap();
        let _: Unlove = protocol::json("{}", Unlove::METHOD).unwrap();
    }
}
