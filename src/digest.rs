//! MD5 digests as used by Last.fm request signatures.
//!
//! The service checks `api_sig` against the MD5 of the canonical parameter
//! string, so no other hash can be substituted here.

use md5::{Digest as _, Md5};

/// Incremental MD5 hasher producing lowercase hex output.
///
/// # Example
///
/// ```rust
/// use scrobbler::digest::Hasher;
///
/// let mut hasher = Hasher::new();
/// hasher.update(b"a");
/// hasher.update(b"bc");
/// assert_eq!(hasher.finalize(), "900150983cd24fb0d6963f7d28e17f72");
/// ```
#[derive(Clone, Debug, Default)]
pub struct Hasher {
    inner: Md5,
}

impl Hasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds more bytes into the digest.
    pub fn update(&mut self, bytes: impl AsRef<[u8]>) {
        self.inner.update(bytes);
    }

    /// Consumes the hasher and returns the 32-character lowercase hex digest.
    #[must_use]
    pub fn finalize(self) -> String {
        format!("{:x}", self.inner.finalize())
    }
}

/// Computes the lowercase hex MD5 digest of `bytes`.
#[must_use]
pub fn digest(bytes: impl AsRef<[u8]>) -> String {
    format!("{:x}", Md5::digest(bytes))
}
