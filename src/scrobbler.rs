//! The scrobble state machine.
//!
//! A [`Scrobbler`] is fed observations of the current track, typically
//! every few seconds, and decides which calls are due:
//!
//! ```text
//! Idle ──new id──▶ Observed ──notify──▶ NowPlayingNotified
//!                     │                        │
//!                     └──────── eligible ──────┴──▶ Scrobbled
//! ```
//!
//! Each observation is handled in three phases. With the state locked,
//! the due calls are selected and their in-flight guards set. Then the
//! calls are made without holding the lock. Finally each result is applied
//! under the lock, but only while the track it was issued for is still the
//! current one. Failed calls leave their flag unset, so they are retried on
//! the next observation.

use std::{sync::Arc, time::SystemTime};

use crate::{
    client::Client,
    error::{Error, Result},
    events::Event,
    state::{EngineState, Handle},
    track::{Track, TrackId},
    transport::Transport,
};

/// Last error shown after the service rejected the session key.
pub const INVALID_SESSION_MESSAGE: &str = "Invalid session key - Please re-authenticate";

pub struct Scrobbler<T> {
    client: Arc<Client<T>>,
    state: Handle,
}

/// Calls selected for one observation.
#[derive(Debug, Default)]
struct Plan {
    id: Option<TrackId>,
    track_info: Option<String>,
    notify: Option<String>,
    scrobble: Option<(String, i64)>,
}

impl<T> Scrobbler<T>
where
    T: Transport,
{
    #[must_use]
    pub fn new(client: Arc<Client<T>>, state: Handle) -> Self {
        Self { client, state }
    }

    #[must_use]
    pub fn state(&self) -> &Handle {
        &self.state
    }

    /// Handles an observation of `track` made now.
    ///
    /// # Errors
    ///
    /// Returns the first failed call, after all due calls were attempted.
    /// Failures are also recorded as the last error in the engine state.
    pub async fn observe(&self, track: Track) -> Result<Vec<Event>> {
        self.observe_at(track, SystemTime::now()).await
    }

    /// Handles an observation of `track` made at `now`.
    ///
    /// # Errors
    ///
    /// Returns the first failed call, after all due calls were attempted.
    pub async fn observe_at(&self, track: Track, now: SystemTime) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        let plan = self.state.with(|state| plan(state, track, now, &mut events));

        let Some(id) = plan.id else {
            return Ok(events);
        };

        if let Some(username) = plan.track_info {
            if self.refresh_track_info(&id, &username).await {
                events.push(Event::TrackInfoUpdated);
            }
        }

        let mut failure = None;

        if let Some(session_key) = plan.notify {
            match self.notify(&id, &session_key).await {
                Ok(event) => events.extend(event),
                Err(e) => failure = Some(e),
            }
        }

        if let Some((session_key, timestamp)) = plan.scrobble {
            match self.scrobble(&id, &session_key, timestamp).await {
                Ok(event) => events.extend(event),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        for event in &events {
            debug!("{event}");
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(events),
        }
    }

    /// Looks up the user's play count and loved status for the current
    /// track. Failures only log.
    async fn refresh_track_info(&self, id: &TrackId, username: &str) -> bool {
        let Some(track) = self.current_track(id) else {
            return false;
        };

        match self.client.track_info(username, &track).await {
            Ok(info) => self.state.with(|state| {
                if state.now_playing.is_current(id) {
                    state.now_playing.user_loved = info.is_loved();
                    state.now_playing.user_play_count = info.user_play_count;
                    true
                } else {
                    debug!("discarding track info for {track}: track changed");
                    false
                }
            }),
            Err(e) => {
                warn!("could not get track info for {track}: {e}");
                false
            }
        }
    }

    async fn notify(&self, id: &TrackId, session_key: &str) -> Result<Option<Event>> {
        let Some(track) = self.current_track(id) else {
            return Ok(None);
        };

        let result = self.client.update_now_playing(session_key, &track).await;

        let mut lock = self.state.lock();
        let state = &mut *lock;
        let is_current = state.now_playing.is_current(id);
        if is_current {
            state.now_playing.in_flight.now_playing = false;
        }

        match result {
            Ok(_) => {
                if !is_current {
                    debug!("discarding now playing response for {track}: track changed");
                    return Ok(None);
                }
                info!("now playing: {track}");
                state.now_playing.is_now_playing_notified = true;
                state.error = None;
                Ok(Some(Event::NowPlaying))
            }
            Err(e) => Err(record_failure(state, e)),
        }
    }

    async fn scrobble(&self, id: &TrackId, session_key: &str, timestamp: i64) -> Result<Option<Event>> {
        let Some(track) = self.current_track(id) else {
            return Ok(None);
        };

        let result = self.client.scrobble(session_key, &track, timestamp).await;

        let mut lock = self.state.lock();
        let state = &mut *lock;
        let is_current = state.now_playing.is_current(id);
        if is_current {
            state.now_playing.in_flight.scrobble = false;
        }

        match result {
            Ok(response) => {
                let ignored = response.ignored();
                if ignored > 0 {
                    // The service accepted the call but dropped the scrobble,
                    // for instance for a timestamp too far in the past.
                    warn!("scrobble of {track} was ignored by the service");
                } else {
                    info!("scrobbled: {track}");
                }

                if is_current {
                    state.now_playing.is_scrobbled = true;
                    state.error = None;
                }
                Ok(Some(Event::Scrobbled))
            }
            Err(e) => Err(record_failure(state, e)),
        }
    }

    /// Marks the current track as loved, or removes the mark.
    ///
    /// The local flag flips before the call and is not restored on failure.
    ///
    /// # Errors
    ///
    /// Returns error if nothing is playing, there is no session or the call
    /// fails.
    pub async fn toggle_love(&self) -> Result<Event> {
        let (track, session_key, love) = self.state.with(|state| {
            let track = state
                .now_playing
                .track
                .clone()
                .ok_or_else(|| Error::failed_precondition("no track is playing"))?;
            let session_key = state
                .session
                .key
                .clone()
                .ok_or_else(|| Error::failed_precondition("not authenticated"))?;

            let love = !state.now_playing.user_loved;
            state.now_playing.user_loved = love;
            Ok::<_, Error>((track, session_key, love))
        })?;

        match self.client.love(&session_key, &track, love).await {
            Ok(()) => {
                self.state.lock().error = None;
                if love {
                    info!("loved: {track}");
                    Ok(Event::Loved)
                } else {
                    info!("unloved: {track}");
                    Ok(Event::Unloved)
                }
            }
            Err(e) => Err(record_failure(&mut self.state.lock(), e)),
        }
    }

    /// Playback jumped: the next observation starts a new session, so the
    /// track is announced again and a replay may be scrobbled again.
    pub fn seek(&self) {
        debug!("seek: forgetting current track");
        self.state.lock().now_playing.reset();
    }

    /// The player is closing.
    pub fn unload(&self) {
        debug!("unload: forgetting current track");
        self.state.lock().now_playing.reset();
    }

    fn current_track(&self, id: &TrackId) -> Option<Track> {
        let state = self.state.lock();
        state
            .now_playing
            .track
            .as_ref()
            .filter(|track| &track.id == id)
            .cloned()
    }
}

/// Records `track` and selects the calls that are due, setting their
/// in-flight guards.
fn plan(state: &mut EngineState, track: Track, now: SystemTime, events: &mut Vec<Event>) -> Plan {
    let now_playing = &mut state.now_playing;
    let is_new = !now_playing.is_current(&track.id);

    let mut plan = Plan {
        id: Some(track.id.clone()),
        ..Plan::default()
    };

    if is_new {
        debug!("new track: {track}");
        now_playing.start(track);
        events.push(Event::TrackChanged);
        plan.track_info.clone_from(&state.session.username);
    } else {
        // Same session: only the timers and flags of the observer changed.
        now_playing.track = Some(track);
    }

    let Some(session_key) = state.session.key.clone() else {
        return plan;
    };
    let Some(track) = now_playing.track.as_ref() else {
        return plan;
    };

    // A scrobbled track is done: no further calls for it.
    if !now_playing.is_now_playing_notified
        && !now_playing.in_flight.now_playing
        && !now_playing.is_scrobbled
    {
        now_playing.in_flight.now_playing = true;
        plan.notify = Some(session_key.clone());
    }

    let preferences = state.preferences;
    if preferences.scrobble_enabled
        && track.is_scrobble_eligible(preferences.scrobble_at)
        && !now_playing.is_scrobbled
        && !now_playing.in_flight.scrobble
    {
        now_playing.in_flight.scrobble = true;
        plan.scrobble = Some((session_key, track.timestamp(now)));
    }

    plan
}

/// Stores the failure as the last error. A rejected session key is dropped
/// so no further authenticated calls are made with it.
fn record_failure(state: &mut EngineState, e: Error) -> Error {
    if e.is_invalid_session() {
        if state.session.is_authenticated() {
            error!("session key rejected; please authenticate again");
        }
        state.session.clear();
        state.error = Some(INVALID_SESSION_MESSAGE.to_owned());
    } else {
        state.error = Some(e.to_string());
    }
    e
}
