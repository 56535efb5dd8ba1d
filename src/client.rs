//! Typed calls to the service methods the scrobbler uses.
//!
//! [`Client`] combines the [`Signer`] and a [`Transport`]: it fills in the
//! common parameters (`api_key`, `method`), signs write calls and decodes
//! responses into [`protocol`] types.
//!
//! # Example
//!
//! ```rust
//! use scrobbler::{client::Client, transport::HttpTransport};
//!
//! let client = Client::new(&config, HttpTransport::new(&config)?);
//! let token = client.get_token().await?;
//! println!("approve at {}", client.authorize_url(&token)?);
//! ```

use std::fmt::Debug;

use reqwest::{Method as HttpMethod, Url};
use serde::Deserialize;

use crate::{
    config::Config,
    error::Result,
    protocol::{
        self,
        auth::{Session, SessionResponse, Token},
        track::{Info, InfoResponse, Love, NowPlaying, Scrobbles, Unlove},
        Method,
    },
    signer::{Params, Signer},
    track::Track,
    transport::Transport,
};

/// Browser page where users approve tokens.
pub const AUTHORIZE_URL: &str = "http://www.last.fm/api/auth/";

pub struct Client<T> {
    transport: T,
    signer: Signer,
    api_key: String,
}

impl<T> Client<T>
where
    T: Transport,
{
    #[must_use]
    pub fn new(config: &Config, transport: T) -> Self {
        Self {
            transport,
            signer: Signer::new(&config.api_secret),
            api_key: config.api_key.clone(),
        }
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Parameters every call carries.
    fn params(&self) -> Params {
        let mut params = Params::new();
        params.insert("api_key", self.api_key.as_str());
        params
    }

    /// Parameters identifying `track` for a call with session key `sk`.
    fn track_params(&self, session_key: &str, track: &Track) -> Params {
        let mut params = self.params();
        params
            .insert("sk", session_key)
            .insert("artist", track.artist.as_str())
            .insert("track", track.title.as_str());
        params
    }

    /// Sends a signed call for method `R`.
    async fn call<R>(&self, params: Params) -> Result<R>
    where
        R: Method + for<'de> Deserialize<'de> + Debug,
    {
        let value = self.send_signed(R::METHOD, params).await?;
        protocol::from_value(value)
    }

    /// Sends a signed call for `method`, returning the raw response.
    async fn send_signed(&self, method: &str, mut params: Params) -> Result<serde_json::Value> {
        params.insert("method", method);
        let request = self.signer.sign(&params)?;
        self.transport.send_authenticated(&request).await
    }

    /// Sends an unsigned `GET` for method `R`.
    async fn query<R>(&self, mut params: Params) -> Result<R>
    where
        R: Method + for<'de> Deserialize<'de> + Debug,
    {
        params.insert("method", R::METHOD);
        let value = self
            .transport
            .send_unauthenticated(&params, HttpMethod::GET)
            .await?;
        protocol::from_value(value)
    }

    /// Requests a token for the user to approve.
    ///
    /// # Errors
    ///
    /// Returns error if the call fails.
    pub async fn get_token(&self) -> Result<String> {
        let response: Token = self.query(self.params()).await?;
        Ok(response.token)
    }

    /// The page where the user approves `token`.
    ///
    /// # Errors
    ///
    /// Returns error if no valid URL can be built.
    pub fn authorize_url(&self, token: &str) -> Result<Url> {
        let mut url = Url::parse(AUTHORIZE_URL)?;
        url.query_pairs_mut()
            .append_pair("api_key", &self.api_key)
            .append_pair("token", token);
        Ok(url)
    }

    /// Exchanges an approved token for a session.
    ///
    /// # Errors
    ///
    /// Returns error if the call fails, for instance because the token has
    /// not been approved yet or has expired.
    pub async fn get_session(&self, token: &str) -> Result<Session> {
        let mut params = self.params();
        params.insert("token", token);
        let response: SessionResponse = self.call(params).await?;
        Ok(response.session)
    }

    /// Announces `track` as playing.
    ///
    /// # Errors
    ///
    /// Returns error if signing or the call fails.
    pub async fn update_now_playing(&self, session_key: &str, track: &Track) -> Result<NowPlaying> {
        self.call(self.track_params(session_key, track)).await
    }

    /// Scrobbles `track` as having started playing at `timestamp`.
    ///
    /// Any successful response counts: the play is recorded even when the
    /// body carries no counts.
    ///
    /// # Errors
    ///
    /// Returns error if signing or the call fails.
    pub async fn scrobble(
        &self,
        session_key: &str,
        track: &Track,
        timestamp: i64,
    ) -> Result<Scrobbles> {
        let mut params = self.track_params(session_key, track);
        params.insert("timestamp", timestamp);
        let value = self.send_signed(Scrobbles::METHOD, params).await?;

        Ok(serde_json::from_value(value).unwrap_or_else(|e| {
            warn!("{}: unexpected response ({e})", Scrobbles::METHOD);
            Scrobbles::default()
        }))
    }

    /// Marks `track` as loved, or removes the mark.
    ///
    /// # Errors
    ///
    /// Returns error if signing or the call fails.
    pub async fn love(&self, session_key: &str, track: &Track, love: bool) -> Result<()> {
        let params = self.track_params(session_key, track);
        if love {
            self.call::<Love>(params).await?;
        } else {
            self.call::<Unlove>(params).await?;
        }
        Ok(())
    }

    /// Fetches what `username` has on record for `track`.
    ///
    /// # Errors
    ///
    /// Returns error if the call fails.
    pub async fn track_info(&self, username: &str, track: &Track) -> Result<Info> {
        let mut params = self.params();
        params
            .insert("artist", track.artist.as_str())
            .insert("track", track.title.as_str())
            .insert("username", username);
        let response: InfoResponse = self.query(params).await?;
        Ok(response.track)
    }
}

/// A scripted [`Transport`] for tests.
#[cfg(test)]
pub(crate) mod stub {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;
    use reqwest::Method as HttpMethod;
    use serde_json::Value;

    use crate::{
        error::{Error, Result},
        signer::{Params, SignedRequest},
        transport::Transport,
    };

    /// A call the stub received.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Call {
        pub method: String,
        pub signed: bool,
        pub params: Vec<(String, String)>,
    }

    impl Call {
        pub fn get(&self, key: &str) -> Option<&str> {
            self.params
                .iter()
                .find_map(|(k, v)| (k == key).then_some(v.as_str()))
        }
    }

    type Hook = Box<dyn Fn() + Send + Sync>;

    /// Answers calls from a queue of responses, per method.
    #[derive(Default)]
    pub struct StubTransport {
        responses: Mutex<Vec<(String, VecDeque<Result<Value>>)>>,
        calls: Mutex<Vec<Call>>,
        on_call: Mutex<Option<Hook>>,
    }

    impl StubTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a response for the next call of `method`.
        pub fn respond(&self, method: &str, response: Result<Value>) -> &Self {
            let mut responses = self.responses.lock().unwrap();
            if let Some((_, queue)) = responses.iter_mut().find(|(m, _)| m == method) {
                queue.push_back(response);
            } else {
                responses.push((method.to_owned(), VecDeque::from([response])));
            }
            self
        }

        /// Runs `hook` while each call is in flight.
        pub fn on_call(&self, hook: impl Fn() + Send + Sync + 'static) {
            *self.on_call.lock().unwrap() = Some(Box::new(hook));
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_to(&self, method: &str) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|call| call.method == method)
                .collect()
        }

        fn answer(&self, call: Call) -> Result<Value> {
            let method = call.method.clone();
            self.calls.lock().unwrap().push(call);
            if let Some(hook) = self.on_call.lock().unwrap().as_ref() {
                hook();
            }

            self.responses
                .lock()
                .unwrap()
                .iter_mut()
                .find(|(m, _)| *m == method)
                .and_then(|(_, queue)| queue.pop_front())
                .unwrap_or_else(|| Err(Error::network(format!("no response scripted for {method}"))))
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send_authenticated(&self, request: &SignedRequest) -> Result<Value> {
            self.answer(Call {
                method: request.method().unwrap_or_default().to_owned(),
                signed: true,
                params: request
                    .iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect(),
            })
        }

        async fn send_unauthenticated(&self, params: &Params, _: HttpMethod) -> Result<Value> {
            let params = params.to_pairs()?;
            self.answer(Call {
                method: params
                    .iter()
                    .find_map(|(k, v)| (k == "method").then(|| v.clone()))
                    .unwrap_or_default(),
                signed: false,
                params,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{stub::StubTransport, *};
    use crate::error::ErrorKind;

    fn client() -> Client<StubTransport> {
        let config = Config::new("key", "secret").unwrap();
        Client::new(&config, StubTransport::new())
    }

    #[tokio::test]
    async fn scrobble_is_signed_and_carries_timestamp() {
        let client = client();
        client.transport().respond(
            "track.scrobble",
            Ok(json!({"scrobbles":{"@attr":{"accepted":1,"ignored":0}}})),
        );

        let track = Track::new("Björk", "Jóga");
        client.scrobble("S1", &track, 1_700_000_000).await.unwrap();

        let calls = client.transport().calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert!(call.signed);
        assert_eq!(call.get("timestamp"), Some("1700000000"));
        assert_eq!(call.get("artist"), Some("Björk"));
        assert_eq!(call.get("track"), Some("Jóga"));
        assert_eq!(call.get("sk"), Some("S1"));
        assert_eq!(call.get("api_key"), Some("key"));
        assert_eq!(call.get("format"), Some("json"));

        let mut params = Params::new();
        params
            .insert("api_key", "key")
            .insert("artist", "Björk")
            .insert("method", "track.scrobble")
            .insert("sk", "S1")
            .insert("timestamp", 1_700_000_000_i64)
            .insert("track", "Jóga");
        assert_eq!(
            call.get("api_sig"),
            Some(Signer::new("secret").signature(&params).unwrap().as_str())
        );
    }

    #[tokio::test]
    async fn scrobble_succeeds_on_any_successful_body() {
        let client = client();
        client
            .transport()
            .respond("track.scrobble", Ok(json!({"scrobbles":{"scrobble":{}}})))
            .respond("track.scrobble", Ok(json!([])));

        let track = Track::new("Björk", "Jóga");
        let response = client.scrobble("S1", &track, 1).await.unwrap();
        assert_eq!(response.ignored(), 0);
        assert!(client.scrobble("S1", &track, 1).await.is_ok());
    }

    #[tokio::test]
    async fn token_request_is_unsigned() {
        let client = client();
        client
            .transport()
            .respond("auth.getToken", Ok(json!({"token": "T1"})));

        assert_eq!(client.get_token().await.unwrap(), "T1");

        let call = &client.transport().calls()[0];
        assert!(!call.signed);
        assert_eq!(call.get("api_sig"), None);
    }

    #[tokio::test]
    async fn love_picks_method_from_flag() {
        let client = client();
        client.transport().respond("track.love", Ok(json!({})));
        client.transport().respond("track.unlove", Ok(json!({})));

        let track = Track::new("Björk", "Jóga");
        client.love("S1", &track, true).await.unwrap();
        client.love("S1", &track, false).await.unwrap();

        let methods: Vec<_> = client
            .transport()
            .calls()
            .into_iter()
            .map(|call| call.method)
            .collect();
        assert_eq!(methods, ["track.love", "track.unlove"]);
    }

    #[tokio::test]
    async fn unexpected_bodies_are_service_errors() {
        let client = client();
        client
            .transport()
            .respond("auth.getSession", Ok(json!({"unexpected": true})));

        let err = client.get_session("T1").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Service);
    }

    #[test]
    fn authorize_url_embeds_key_and_token() {
        let url = client().authorize_url("T1").unwrap();
        assert_eq!(
            url.as_str(),
            "http://www.last.fm/api/auth/?api_key=key&token=T1"
        );
    }
}
