//! A headless Last.fm scrobbler.
//!
//! The engine watches what a player reports and talks to the Last.fm web
//! service on the user's behalf:
//!
//! * [`scrobbler::Scrobbler`] announces tracks as playing, scrobbles them
//!   once they played long enough and toggles their loved status.
//! * [`auth::Authenticator`] takes the user through the browser to obtain
//!   a session key.
//!
//! Underneath, [`signer::Signer`] signs requests using [`codec`] and
//! [`digest`], and a [`transport::Transport`] sends them. All state lives
//! in one [`state::EngineState`] shared through a [`state::Handle`].
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
extern crate log;

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod digest;
pub mod error;
pub mod events;
pub mod http;
pub mod observer;
pub mod protocol;
pub mod scrobbler;
pub mod secrets;
pub mod signal;
pub mod signer;
pub mod state;
pub mod track;
pub mod transport;
