//! The network boundary.
//!
//! Every call to the service goes through a [`Transport`]: signed calls as
//! a form encoded `POST`, unsigned calls as a `GET` query (or, on request,
//! a `POST`). Whatever happens on the wire is normalized into a
//! [`Result`] whose error kind tells the caller what to do next:
//!
//! | Outcome                                    | Error kind                     |
//! |--------------------------------------------|--------------------------------|
//! | host unreachable, timeout, broken body     | [`ErrorKind::Network`]         |
//! | body with `"error": 9`                     | [`ErrorKind::InvalidSession`]  |
//! | body with any other `error` code           | [`ErrorKind::Service`]         |
//! | non-success status without an error body   | [`ErrorKind::Service`]         |
//!
//! Nothing is retried here. The natural polling interval of the caller is
//! the retry policy.
//!
//! [`ErrorKind::Network`]: crate::error::ErrorKind::Network
//! [`ErrorKind::InvalidSession`]: crate::error::ErrorKind::InvalidSession
//! [`ErrorKind::Service`]: crate::error::ErrorKind::Service

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;

use crate::{
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
    protocol::{self, ApiError},
    signer::{Params, SignedRequest, FORMAT},
};

/// The service endpoint.
pub const ENDPOINT: &str = "https://ws.audioscrobbler.com/2.0/";

/// Sends requests to the service.
///
/// Implemented by [`HttpTransport`]; tests substitute scripted stubs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a signed request as a form encoded `POST`.
    async fn send_authenticated(&self, request: &SignedRequest) -> Result<Value>;

    /// Sends an unsigned request, usually as a `GET`.
    ///
    /// `format=json` is added when absent.
    async fn send_unauthenticated(&self, params: &Params, method: Method) -> Result<Value>;
}

/// [`Transport`] over HTTPS.
pub struct HttpTransport {
    http_client: HttpClient,
    endpoint: Url,
}

impl HttpTransport {
    /// Creates a transport for the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_endpoint(config, ENDPOINT.parse()?)
    }

    /// Creates a transport for another endpoint, such as a compatible
    /// service or a local proxy.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn with_endpoint(config: &Config, endpoint: Url) -> Result<Self> {
        debug!("endpoint: {endpoint}");

        Ok(Self {
            http_client: HttpClient::new(config)?,
            endpoint,
        })
    }

    async fn send(&self, request: reqwest::Request, origin: &str) -> Result<Value> {
        let response = self.http_client.execute(request).await?;
        let status = response.status();
        let body = response.text().await.map_err(Error::network)?;

        interpret(status, &body, origin)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_authenticated(&self, request: &SignedRequest) -> Result<Value> {
        let origin = request.method().unwrap_or("unknown method").to_owned();
        debug!("POST {origin}: {request}");

        let form = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(request.iter())
            .finish();
        let request = self.http_client.post(self.endpoint.clone(), form);

        self.send(request, &origin).await
    }

    async fn send_unauthenticated(&self, params: &Params, method: Method) -> Result<Value> {
        let mut pairs = params.to_pairs()?;
        if params.get("format").is_none() {
            pairs.push(("format".to_owned(), FORMAT.to_owned()));
        }

        let origin = pairs
            .iter()
            .find_map(|(key, value)| (key == "method").then(|| value.clone()))
            .unwrap_or_else(|| "unknown method".to_owned());
        debug!("{method} {origin}");

        let request = if method == Method::POST {
            let form = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&pairs)
                .finish();
            self.http_client.post(self.endpoint.clone(), form)
        } else {
            let mut url = self.endpoint.clone();
            url.query_pairs_mut().extend_pairs(&pairs);
            self.http_client.get(url)
        };

        self.send(request, &origin).await
    }
}

/// Normalizes a received response.
///
/// The service sometimes reports errors with `200 OK`, so the body is
/// checked for an `error` field before the status.
///
/// # Errors
///
/// Returns `InvalidSession` for error code 9, `Service` for any other error
/// body, for non-success statuses and for bodies that are not JSON.
pub fn interpret(status: StatusCode, body: &str, origin: &str) -> Result<Value> {
    let parsed = serde_json::from_str::<Value>(body);

    if let Ok(value) = &parsed {
        if value.get("error").is_some() {
            let api_error = serde_json::from_value::<ApiError>(value.clone())?;
            warn!("{origin}: {api_error}");

            return Err(if api_error.is_invalid_session() {
                Error::invalid_session(api_error)
            } else {
                Error::service(api_error)
            });
        }
    }

    if !status.is_success() {
        warn!("{origin}: HTTP {status}");
        return Err(Error::service(format!("HTTP {status}")));
    }

    match parsed {
        Ok(value) => {
            trace!("{origin}: {value:#?}");
            Ok(value)
        }
        // Parse again for the structured logging.
        Err(_) => protocol::json(body, origin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn passes_successful_bodies_through() {
        let value = interpret(StatusCode::OK, r#"{"token":"T1"}"#, "auth.getToken").unwrap();
        assert_eq!(value["token"], "T1");
    }

    #[test]
    fn maps_error_nine_to_invalid_session() {
        let err = interpret(
            StatusCode::FORBIDDEN,
            r#"{"error":9,"message":"Invalid session key - Please re-authenticate"}"#,
            "track.scrobble",
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSession);
        assert_eq!(err.downcast::<ApiError>().map(|e| e.code), Some(9));
    }

    #[test]
    fn maps_other_codes_to_service_errors() {
        let err = interpret(
            StatusCode::FORBIDDEN,
            r#"{"error":13,"message":"Invalid method signature supplied"}"#,
            "track.scrobble",
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Service);
        assert!(err.to_string().contains("Invalid method signature supplied"));
    }

    #[test]
    fn detects_errors_sent_with_success_status() {
        let err = interpret(StatusCode::OK, r#"{"error":29,"message":"Rate limit exceeded"}"#, "x")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Service);
    }

    #[test]
    fn maps_bare_failure_statuses_to_service_errors() {
        let err = interpret(StatusCode::BAD_GATEWAY, "<html>Bad Gateway</html>", "x").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Service);
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn rejects_malformed_success_bodies() {
        let err = interpret(StatusCode::OK, "not json", "x").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Service);
    }

    #[tokio::test]
    async fn unreachable_hosts_are_network_errors() {
        let config = Config::new("key", "secret").unwrap();
        // Port 9 (discard) on localhost is closed on any sane test machine.
        let transport =
            HttpTransport::with_endpoint(&config, "http://127.0.0.1:9/2.0/".parse().unwrap())
                .unwrap();

        let mut params = Params::new();
        params.insert("method", "auth.getToken").insert("api_key", "key");
        let err = transport
            .send_unauthenticated(&params, Method::GET)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
    }
}
