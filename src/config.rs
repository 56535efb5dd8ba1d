use veil::Redact;

use crate::{
    error::{Error, Result},
    state::Preferences,
};

/// Application configuration.
#[derive(Clone, Redact, Hash, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    /// API key identifying this application to the service.
    pub api_key: String,

    /// Shared secret used to sign requests. Never sent over the wire.
    #[redact]
    pub api_secret: String,

    pub user_agent: String,

    /// Initial preferences; the engine state holds the live values.
    pub preferences: Preferences,
}

impl Config {
    /// Length of API keys and secrets issued by the service.
    const KEY_LENGTH: usize = 32;

    /// Creates a configuration for the given API account.
    ///
    /// # Errors
    ///
    /// Will return `Err` if:
    /// - the API key or secret are empty or contain whitespace
    /// - no valid `User-Agent` can be built from the package or OS
    ///   information
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        let api_secret = api_secret.into();

        for (name, value) in [("api key", &api_key), ("api secret", &api_secret)] {
            if value.is_empty() || value.contains(char::is_whitespace) {
                return Err(Error::invalid_argument(format!(
                    "{name} should be a non-empty string without whitespace"
                )));
            }
            let chars = value.chars().count();
            if chars != Self::KEY_LENGTH {
                // Keys of compatible services differ, so only warn.
                warn!("{name} should be {} characters long but is {chars}", Self::KEY_LENGTH);
            }
        }

        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
        {
            return Err(Error::invalid_argument(format!(
                "application name and/or version invalid (\"{app_name}\"; \"{app_version}\")"
            )));
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));
        if os_name.is_empty()
            || os_name.contains(illegal_chars)
            || os_version.is_empty()
            || os_version.contains(illegal_chars)
        {
            return Err(Error::invalid_argument(format!(
                "os name and/or version invalid (\"{os_name}\"; \"{os_version}\")"
            )));
        }

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})");
        trace!("user agent: {user_agent}");

        Ok(Self {
            app_name,
            app_version,

            api_key,
            api_secret,

            user_agent,

            preferences: Preferences::default(),
        })
    }
}
