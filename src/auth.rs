//! The authorization flow.
//!
//! Getting a session key takes the user through the browser:
//!
//! 1. [`Authenticator::request_token`] gets a token and returns the page
//!    where the user approves it.
//! 2. The host reports page loads through
//!    [`Authenticator::handle_navigation`] (or waits for them with
//!    [`Authenticator::wait_for_approval`]). Once the approval page shows up
//!    for the current token, the token is exchanged for a session.
//! 3. Hosts that cannot observe the browser call
//!    [`Authenticator::approve`] when the user says they are done.
//!
//! After a session is established, navigation signals are ignored until
//! [`Authenticator::logout`].

use std::{sync::Arc, sync::LazyLock, time::Duration};

use futures_util::{Stream, StreamExt};
use regex_lite::Regex;
use reqwest::Url;

use crate::{
    client::Client,
    error::{Error, Result},
    events::Event,
    state::Handle,
    transport::Transport,
};

/// Matches the page where tokens are approved.
static AUTH_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"last\.fm/api/auth").unwrap_or_else(|e| unreachable!("{e}")));

/// Title of the page shown after the user approved a token.
pub const APPROVED_TITLE: &str = "Application authenticated";

/// Where the authorization flow stands.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    TokenIssued,
    AwaitingUserApproval,
    SessionEstablished,
}

/// A page load in the user's browser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Navigation {
    pub url: String,
    pub title: String,
}

impl Navigation {
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }

    /// Whether this is the approval page for `token`.
    #[must_use]
    pub fn approves(&self, token: &str) -> bool {
        AUTH_PAGE.is_match(&self.url)
            && self.title.contains(APPROVED_TITLE)
            && self.url.contains(token)
    }
}

pub struct Authenticator<T> {
    client: Arc<Client<T>>,
    state: Handle,
    phase: AuthState,
}

impl<T> Authenticator<T>
where
    T: Transport,
{
    /// Creates an authenticator, resuming from whatever `state` holds.
    #[must_use]
    pub fn new(client: Arc<Client<T>>, state: Handle) -> Self {
        let phase = state.with(|state| {
            if state.session.is_authenticated() {
                AuthState::SessionEstablished
            } else if state.session.token.is_some() {
                AuthState::TokenIssued
            } else {
                AuthState::Unauthenticated
            }
        });

        Self {
            client,
            state,
            phase,
        }
    }

    #[must_use]
    pub fn phase(&self) -> AuthState {
        self.phase
    }

    /// Gets a new token and returns the page where the user approves it.
    ///
    /// # Errors
    ///
    /// Returns error if the token cannot be obtained.
    pub async fn request_token(&mut self) -> Result<Url> {
        let token = self.client.get_token().await?;
        let url = self.client.authorize_url(&token)?;

        self.state.lock().session.token = Some(token);
        self.phase = AuthState::TokenIssued;
        info!("token issued; waiting for approval");

        Ok(url)
    }

    /// Handles a page load in the user's browser.
    ///
    /// Returns `Ok(None)` when the page is not the approval page for the
    /// current token, or when a session is already established.
    ///
    /// # Errors
    ///
    /// Returns error if the approved token cannot be exchanged for a
    /// session. The flow then keeps waiting for approval.
    pub async fn handle_navigation(&mut self, navigation: &Navigation) -> Result<Option<Event>> {
        if self.phase == AuthState::SessionEstablished {
            return Ok(None);
        }

        let Some(token) = self.state.lock().session.token.clone() else {
            return Ok(None);
        };

        if !navigation.approves(&token) {
            trace!("ignoring navigation to {}", navigation.url);
            return Ok(None);
        }

        self.phase = AuthState::AwaitingUserApproval;
        self.exchange(&token).await.map(Some)
    }

    /// Exchanges the current token, when the host knows the user approved
    /// it.
    ///
    /// # Errors
    ///
    /// Returns error if no token was issued or the exchange fails.
    pub async fn approve(&mut self) -> Result<Event> {
        let token = self
            .state
            .lock()
            .session
            .token
            .clone()
            .ok_or_else(|| Error::failed_precondition("no token was requested"))?;

        self.phase = AuthState::AwaitingUserApproval;
        self.exchange(&token).await
    }

    /// Handles navigation `signals` until a session is established.
    ///
    /// Failed exchanges are logged and waiting continues. The token stays
    /// valid when the wait ends, so the caller may wait again.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` if `timeout` elapses first, or
    /// `FailedPrecondition` if `signals` ends first.
    pub async fn wait_for_approval<S>(
        &mut self,
        signals: S,
        timeout: Option<Duration>,
    ) -> Result<Event>
    where
        S: Stream<Item = Navigation> + Unpin,
    {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.next_approval(signals)).await?,
            None => self.next_approval(signals).await,
        }
    }

    async fn next_approval<S>(&mut self, mut signals: S) -> Result<Event>
    where
        S: Stream<Item = Navigation> + Unpin,
    {
        while let Some(navigation) = signals.next().await {
            match self.handle_navigation(&navigation).await {
                Ok(Some(event)) => return Ok(event),
                Ok(None) => {}
                Err(e) => warn!("could not establish session: {e}"),
            }
        }

        Err(Error::failed_precondition(
            "navigation signals ended before approval",
        ))
    }

    /// Forgets the token and the session.
    pub fn logout(&mut self) {
        self.state.with(|state| {
            state.session.clear();
            state.session.token = None;
        });
        self.phase = AuthState::Unauthenticated;
        info!("logged out");
    }

    async fn exchange(&mut self, token: &str) -> Result<Event> {
        let session = self.client.get_session(token).await?;
        info!("authenticated as {}", session.name);

        self.state.with(|state| {
            state.session.key = Some(session.key.clone());
            state.session.subscriber = session.is_subscriber();
            state.session.username = Some(session.name);
            state.session.token = None;
            state.error = None;
        });
        self.phase = AuthState::SessionEstablished;

        Ok(Event::SessionEstablished)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use serde_json::json;

    use super::*;
    use crate::{client::stub::StubTransport, config::Config, error::ErrorKind};

    const APPROVED_URL: &str = "https://www.last.fm/api/auth/?api_key=key&token=T1";

    fn authenticator() -> Authenticator<StubTransport> {
        let config = Config::new("key", "secret").unwrap();
        let client = Arc::new(Client::new(&config, StubTransport::new()));
        Authenticator::new(client, Handle::default())
    }

    fn stub(authenticator: &Authenticator<StubTransport>) -> &StubTransport {
        authenticator.client.transport()
    }

    fn script_session(authenticator: &Authenticator<StubTransport>) {
        stub(authenticator)
            .respond("auth.getToken", Ok(json!({"token": "T1"})))
            .respond(
                "auth.getSession",
                Ok(json!({"session": {"name": "u", "key": "S1", "subscriber": 0}})),
            );
    }

    #[tokio::test]
    async fn establishes_session_from_approval_page() {
        let mut auth = authenticator();
        script_session(&auth);

        let url = auth.request_token().await.unwrap();
        assert_eq!(
            url.as_str(),
            "http://www.last.fm/api/auth/?api_key=key&token=T1"
        );
        assert_eq!(auth.phase(), AuthState::TokenIssued);

        let event = auth
            .handle_navigation(&Navigation::new(APPROVED_URL, "Application authenticated"))
            .await
            .unwrap();
        assert_eq!(event, Some(Event::SessionEstablished));
        assert_eq!(auth.phase(), AuthState::SessionEstablished);

        let session = auth.state.snapshot().session;
        assert_eq!(session.key.as_deref(), Some("S1"));
        assert_eq!(session.username.as_deref(), Some("u"));
        assert_eq!(session.token, None);

        let exchange = &stub(&auth).calls_to("auth.getSession")[0];
        assert!(exchange.signed);
        assert_eq!(exchange.get("token"), Some("T1"));

        // Further signals are ignored.
        let event = auth
            .handle_navigation(&Navigation::new(APPROVED_URL, "Application authenticated"))
            .await
            .unwrap();
        assert_eq!(event, None);
        assert_eq!(stub(&auth).calls_to("auth.getSession").len(), 1);
    }

    #[tokio::test]
    async fn ignores_unrelated_pages() {
        let mut auth = authenticator();
        script_session(&auth);
        auth.request_token().await.unwrap();

        for navigation in [
            Navigation::new("https://www.last.fm/music", "Application authenticated"),
            Navigation::new(APPROVED_URL, "Connect application"),
            Navigation::new(
                "https://www.last.fm/api/auth/?api_key=key&token=T0",
                "Application authenticated",
            ),
        ] {
            assert_eq!(auth.handle_navigation(&navigation).await.unwrap(), None);
        }

        assert_eq!(auth.phase(), AuthState::TokenIssued);
        assert!(stub(&auth).calls_to("auth.getSession").is_empty());
    }

    #[tokio::test]
    async fn failed_exchange_keeps_waiting() {
        let mut auth = authenticator();
        stub(&auth)
            .respond("auth.getToken", Ok(json!({"token": "T1"})))
            .respond(
                "auth.getSession",
                Err(Error::service("Unauthorized Token - This token has not been issued")),
            )
            .respond(
                "auth.getSession",
                Ok(json!({"session": {"name": "u", "key": "S1", "subscriber": "1"}})),
            );
        auth.request_token().await.unwrap();

        let approved = Navigation::new(APPROVED_URL, "Application authenticated");
        let signals = stream::iter([approved.clone(), approved]);
        let event = auth.wait_for_approval(signals, None).await.unwrap();

        assert_eq!(event, Event::SessionEstablished);
        assert!(auth.state.snapshot().session.subscriber);
        assert_eq!(stub(&auth).calls_to("auth.getSession").len(), 2);
    }

    #[tokio::test]
    async fn wait_ends_with_signals() {
        let mut auth = authenticator();
        script_session(&auth);
        auth.request_token().await.unwrap();

        let err = auth
            .wait_for_approval(stream::iter(Vec::<Navigation>::new()), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);
        assert_eq!(auth.state.snapshot().session.token.as_deref(), Some("T1"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out() {
        let mut auth = authenticator();
        script_session(&auth);
        auth.request_token().await.unwrap();

        let err = auth
            .wait_for_approval(stream::pending::<Navigation>(), Some(Duration::from_secs(60)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
        assert_eq!(auth.state.snapshot().session.token.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn approve_requires_token() {
        let mut auth = authenticator();
        assert_eq!(
            auth.approve().await.unwrap_err().kind,
            ErrorKind::FailedPrecondition
        );
    }

    #[tokio::test]
    async fn logout_forgets_session() {
        let mut auth = authenticator();
        script_session(&auth);
        auth.request_token().await.unwrap();
        assert_eq!(auth.approve().await.unwrap(), Event::SessionEstablished);

        auth.logout();
        assert_eq!(auth.phase(), AuthState::Unauthenticated);
        assert!(!auth.state.snapshot().session.is_authenticated());
        assert_eq!(auth.state.snapshot().session.username, None);
    }

    #[test]
    fn resumes_from_state() {
        let config = Config::new("key", "secret").unwrap();
        let client = Arc::new(Client::new(&config, StubTransport::new()));
        let state = Handle::default();
        state.with(|state| state.session.key = Some("S1".to_owned()));

        let auth = Authenticator::new(client, state);
        assert_eq!(auth.phase(), AuthState::SessionEstablished);
    }
}
