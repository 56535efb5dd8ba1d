//! Request parameters and their signatures.
//!
//! Last.fm authenticates write calls with `api_sig`: the MD5 of every
//! parameter name followed by its UTF-8 value, in lexicographic order of
//! the names, with the shared secret appended at the very end. Getting any
//! of this wrong does not produce a parse error. The service answers with
//! an authentication failure instead, so the construction is exact:
//!
//! ```text
//! api_sig = md5("api_key" + key + "method" + method + ... + secret)
//! ```
//!
//! `format` and `api_sig` itself are not part of the signature.
//!
//! # Example
//!
//! ```rust
//! use scrobbler::signer::{Params, Signer};
//!
//! let signer = Signer::new("secret");
//! let mut params = Params::new();
//! params.insert("method", "auth.getSession");
//! params.insert("api_key", "key");
//! params.insert("token", "T1");
//!
//! let signed = signer.sign(&params)?;
//! assert_eq!(signed.get("format"), Some("json"));
//! ```

use std::{borrow::Cow, collections::BTreeMap, fmt};

use veil::Redact;

use crate::{codec, digest::Hasher, error::Result};

/// Response format requested from the service.
pub const FORMAT: &str = "json";

/// Parameter names that never take part in the signature.
const UNSIGNED: [&str; 2] = ["api_sig", "format"];

/// A single parameter value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    /// Text in Rust's native UTF-8 representation.
    Text(String),
    /// Numbers, notably timestamps; signed in their decimal form.
    Number(i64),
    /// UTF-16 code units as delivered by hosts that speak UTF-16. May
    /// contain unpaired surrogates, which fail signing.
    Wide(Vec<u16>),
}

impl Value {
    /// The UTF-8 bytes this value contributes to a signature and a request.
    ///
    /// # Errors
    ///
    /// Fails when wide text contains an unpaired surrogate.
    pub fn to_utf8(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Self::Text(text) => Ok(Cow::Borrowed(text.as_bytes())),
            Self::Number(number) => Ok(Cow::Owned(number.to_string().into_bytes())),
            Self::Wide(units) => Ok(Cow::Owned(codec::to_utf8_bytes(units)?)),
        }
    }

    /// The value as wire text.
    ///
    /// # Errors
    ///
    /// Fails when wide text contains an unpaired surrogate.
    pub fn to_text(&self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Number(number) => Ok(number.to_string()),
            Self::Wide(units) => {
                let bytes = codec::to_utf8_bytes(units)?;
                // Cannot fail: the codec only produces well-formed UTF-8.
                String::from_utf8(bytes).map_err(|e| {
                    codec::Error::InvalidByteSequence {
                        offset: e.utf8_error().valid_up_to(),
                    }
                    .into()
                })
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<Vec<u16>> for Value {
    fn from(value: Vec<u16>) -> Self {
        Self::Wide(value)
    }
}

/// Parameters of a single call, kept in canonical (sorted) order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Iterates in lexicographic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts every value to wire text.
    ///
    /// # Errors
    ///
    /// Fails when a wide value contains an unpaired surrogate.
    pub fn to_pairs(&self) -> Result<Vec<(String, String)>> {
        self.iter()
            .map(|(key, value)| Ok((key.to_owned(), value.to_text()?)))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Parameters with `api_sig` and `format` attached, ready for the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRequest {
    params: BTreeMap<String, String>,
}

impl SignedRequest {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        self.get("api_sig").unwrap_or_default()
    }

    /// The service method this request calls, if set.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.get("method")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl fmt::Display for SignedRequest {
    /// Formats as `key=value` pairs with the session key masked, for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                write!(f, "&")?;
            }
            first = false;

            if key == "sk" {
                write!(f, "{key}=***")?;
            } else {
                write!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

/// Signs parameters with the application's shared secret.
#[derive(Clone, Redact)]
pub struct Signer {
    #[redact]
    secret: String,
}

impl Signer {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Computes `api_sig` for `params`.
    ///
    /// # Errors
    ///
    /// Fails when a value cannot be encoded as UTF-8.
    pub fn signature(&self, params: &Params) -> Result<String> {
        let mut hasher = Hasher::new();

        // `Params` iterates in lexicographic key order.
        for (key, value) in params.iter() {
            if UNSIGNED.contains(&key) {
                continue;
            }
            hasher.update(key);
            hasher.update(value.to_utf8()?);
        }

        // The secret always comes last, regardless of ordering.
        hasher.update(&self.secret);

        Ok(hasher.finalize())
    }

    /// Returns `params` with `api_sig` and `format` attached.
    ///
    /// Required parameters are not validated: a missing one only shows up as
    /// an error from the service.
    ///
    /// # Errors
    ///
    /// Fails when a value cannot be encoded as UTF-8.
    pub fn sign(&self, params: &Params) -> Result<SignedRequest> {
        let signature = self.signature(params)?;

        let mut signed: BTreeMap<String, String> = params.to_pairs()?.into_iter().collect();
        signed.insert("api_sig".to_owned(), signature);
        signed.insert("format".to_owned(), FORMAT.to_owned());

        Ok(SignedRequest { params: signed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{digest, error::ErrorKind};

    fn scrobble_params() -> Params {
        let mut params = Params::new();
        params
            .insert("method", "track.scrobble")
            .insert("api_key", "0123456789abcdef")
            .insert("sk", "session")
            .insert("artist", "Sigur Rós")
            .insert("track", "Hoppípolla")
            .insert("timestamp", 1_700_000_000_i64);
        params
    }

    #[test]
    fn signs_sorted_keys_with_secret_last() {
        let signer = Signer::new("s3cr3t");
        let expected = digest::digest(
            "api_key0123456789abcdefartistSigur Rósmethodtrack.scrobblesksession\
             timestamp1700000000trackHoppípollas3cr3t",
        );

        assert_eq!(signer.signature(&scrobble_params()).unwrap(), expected);
    }

    #[test]
    fn is_deterministic_regardless_of_insertion_order() {
        let signer = Signer::new("s3cr3t");
        let forward = scrobble_params();
        let reversed: Params = forward
            .iter()
            .map(|(key, value)| (key.to_owned(), value.clone()))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let first = signer.sign(&forward).unwrap();
        let second = signer.sign(&reversed).unwrap();
        assert_eq!(first.signature(), second.signature());
        assert_eq!(first, signer.sign(&forward).unwrap());
    }

    #[test]
    fn any_changed_character_changes_the_signature() {
        let signer = Signer::new("s3cr3t");
        let original = signer.signature(&scrobble_params()).unwrap();

        let mut changed = scrobble_params();
        changed.insert("track", "Hoppípollb");
        assert_ne!(signer.signature(&changed).unwrap(), original);

        let mut changed = scrobble_params();
        changed.insert("timestamp", 1_700_000_001_i64);
        assert_ne!(signer.signature(&changed).unwrap(), original);

        assert_ne!(
            Signer::new("s3cr3u").signature(&scrobble_params()).unwrap(),
            original
        );
    }

    #[test]
    fn numbers_sign_like_their_decimal_text() {
        let signer = Signer::new("s3cr3t");
        let mut text = scrobble_params();
        text.insert("timestamp", "1700000000");

        assert_eq!(
            signer.signature(&text).unwrap(),
            signer.signature(&scrobble_params()).unwrap()
        );
    }

    #[test]
    fn output_carries_signature_and_format_but_not_secret() {
        let signer = Signer::new("s3cr3t");
        let signed = signer.sign(&scrobble_params()).unwrap();

        assert_eq!(signed.get("format"), Some(FORMAT));
        assert_eq!(signed.signature().len(), 32);
        assert_eq!(signed.get("timestamp"), Some("1700000000"));
        assert_eq!(signed.method(), Some("track.scrobble"));
        assert!(signed.iter().all(|(_, value)| !value.contains("s3cr3t")));
        assert!(!format!("{signer:?}").contains("s3cr3t"));
        assert!(!signed.to_string().contains("session"));
    }

    #[test]
    fn format_is_not_signed() {
        let signer = Signer::new("s3cr3t");
        let mut with_format = scrobble_params();
        with_format.insert("format", "json");

        assert_eq!(
            signer.signature(&with_format).unwrap(),
            signer.signature(&scrobble_params()).unwrap()
        );
    }

    #[test]
    fn wide_text_signs_like_native_text() {
        let signer = Signer::new("s3cr3t");
        let mut wide = scrobble_params();
        wide.insert("artist", "Sigur Rós".encode_utf16().collect::<Vec<_>>());

        let signed = signer.sign(&wide).unwrap();
        assert_eq!(signed, signer.sign(&scrobble_params()).unwrap());
        assert_eq!(signed.get("artist"), Some("Sigur Rós"));
    }

    #[test]
    fn lone_surrogates_fail_signing() {
        let signer = Signer::new("s3cr3t");
        let mut params = scrobble_params();
        params.insert("track", vec![0x0041_u16, 0xD800]);

        let err = signer.sign(&params).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidScalarValue);
    }
}
