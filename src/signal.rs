//! Signals that stop `scrobbler run` or make it reload its session.
//!
//! Ctrl-C and SIGTERM end the observer loop. SIGHUP re-reads the session
//! from the secrets file, so a session from `scrobbler auth` is picked up
//! without a restart. Windows only knows Ctrl-C.

use std::fmt;

use crate::error::Result;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// A signal the observer loop reacts to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Received {
    Interrupt,
    Terminate,
    ReloadSession,
}

impl Received {
    /// Whether the observer loop should stop.
    #[must_use]
    pub fn is_shutdown(self) -> bool {
        !matches!(self, Self::ReloadSession)
    }
}

impl fmt::Display for Received {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "Ctrl+C",
            Self::Terminate => "SIGTERM",
            Self::ReloadSession => "SIGHUP",
        })
    }
}

/// Registered signal streams.
pub struct Signals {
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    hangup: Signal,
}

impl Signals {
    /// Registers for SIGTERM and SIGHUP. Ctrl-C needs no registration.
    ///
    /// # Errors
    ///
    /// Returns error if the signal streams cannot be registered.
    pub fn new() -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                terminate: signal(SignalKind::terminate())?,
                hangup: signal(SignalKind::hangup())?,
            })
        }

        #[cfg(not(unix))]
        Ok(Self {})
    }

    /// Waits for the next signal.
    pub async fn recv(&mut self) -> Received {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => Received::Interrupt,
                _ = self.terminate.recv() => Received::Terminate,
                _ = self.hangup.recv() => Received::ReloadSession,
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            Received::Interrupt
        }
    }
}
