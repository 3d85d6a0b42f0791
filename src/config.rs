//! Backend selection and client configuration.
//!
//! A [`ClientConfig`] names which Firestore deployment to talk to and which
//! credentials to use. Placeholder credentials are only accepted by the
//! local emulator; every other backend rejects them before any request is
//! made.

use crate::settings::Settings;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Placeholder shipped in place of a real project ID.
pub const PROJECT_ID_PLACEHOLDER: &str = "REPLACE_WITH_YOUR_PROJECT_ID";

/// Placeholder shipped in place of a real API key.
pub const API_KEY_PLACEHOLDER: &str = "REPLACE_WITH_YOUR_API_KEY";

const EMULATOR_PORT: u16 = 8080;

/// Errors raised while assembling a [`ClientConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The backend identifier is not one of `prod`, `emulator`, `nightly`, `qa`.
    #[error("unknown backend: {0:?} (expected one of prod, emulator, nightly, qa)")]
    UnknownBackend(String),
    /// The project ID is unset or still the placeholder.
    #[error("a real project ID is required for the {0} backend; set one with --projectId")]
    PlaceholderProjectId(Backend),
    /// The API key is unset or still the placeholder.
    #[error("a real API key is required for the {0} backend; set one with --apiKey")]
    PlaceholderApiKey(Backend),
}

/// The Firestore deployment to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    #[default]
    Prod,
    Emulator,
    Nightly,
    Qa,
}

impl Backend {
    pub const ALL: [Backend; 4] = [Backend::Prod, Backend::Emulator, Backend::Nightly, Backend::Qa];

    /// The symbolic name used on the command line and in persisted settings.
    pub fn name(self) -> &'static str {
        match self {
            Backend::Prod => "prod",
            Backend::Emulator => "emulator",
            Backend::Nightly => "nightly",
            Backend::Qa => "qa",
        }
    }

    pub fn host(self) -> &'static str {
        match self {
            Backend::Prod => "firestore.googleapis.com",
            Backend::Emulator => "127.0.0.1",
            Backend::Nightly => "test-firestore.sandbox.googleapis.com",
            Backend::Qa => "staging-firestore.sandbox.googleapis.com",
        }
    }

    pub fn port(self) -> Option<u16> {
        match self {
            Backend::Emulator => Some(EMULATOR_PORT),
            _ => None,
        }
    }

    /// Whether requests to this backend use TLS. Only the emulator runs in the clear.
    pub fn ssl(self) -> bool {
        !matches!(self, Backend::Emulator)
    }

    pub fn is_emulator(self) -> bool {
        matches!(self, Backend::Emulator)
    }

    /// Scheme, host and (for the emulator) port, with no trailing slash.
    pub fn base_url(self) -> String {
        let scheme = if self.ssl() { "https" } else { "http" };
        match self.port() {
            Some(port) => format!("{}://{}:{}", scheme, self.host(), port),
            None => format!("{}://{}", scheme, self.host()),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backend::ALL
            .into_iter()
            .find(|backend| backend.name() == s)
            .ok_or_else(|| ConfigError::UnknownBackend(s.to_string()))
    }
}

/// Returns `true` if `value` is empty or one of the shipped placeholders.
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.starts_with("REPLACE_WITH_YOUR_")
}

/// Everything needed to construct a client handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub backend: Backend,
    pub project_id: String,
    pub api_key: String,
}

impl ClientConfig {
    /// Creates a validated configuration.
    pub fn new(
        backend: Backend,
        project_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            backend,
            project_id: project_id.into(),
            api_key: api_key.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from the effective values of `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Self::new(settings.backend(), settings.project_id(), settings.api_key())
    }

    /// Rejects placeholder credentials unless the emulator is selected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.is_emulator() {
            return Ok(());
        }
        if is_placeholder(&self.project_id) {
            return Err(ConfigError::PlaceholderProjectId(self.backend));
        }
        if is_placeholder(&self.api_key) {
            return Err(ConfigError::PlaceholderApiKey(self.backend));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names_round_trip() {
        for backend in Backend::ALL {
            assert_eq!(backend.name().parse::<Backend>().unwrap(), backend);
        }
        assert_eq!(
            "staging".parse::<Backend>(),
            Err(ConfigError::UnknownBackend("staging".to_string()))
        );
    }

    #[test]
    fn test_emulator_is_plaintext_on_8080() {
        assert_eq!(Backend::Emulator.base_url(), "http://127.0.0.1:8080");
        assert!(!Backend::Emulator.ssl());
        assert_eq!(Backend::Prod.base_url(), "https://firestore.googleapis.com");
        assert_eq!(Backend::Qa.port(), None);
    }

    #[test]
    fn test_placeholders_rejected_off_emulator() {
        let err = ClientConfig::new(Backend::Prod, PROJECT_ID_PLACEHOLDER, "key").unwrap_err();
        assert_eq!(err, ConfigError::PlaceholderProjectId(Backend::Prod));

        let err = ClientConfig::new(Backend::Nightly, "my-project", API_KEY_PLACEHOLDER).unwrap_err();
        assert_eq!(err, ConfigError::PlaceholderApiKey(Backend::Nightly));

        let err = ClientConfig::new(Backend::Qa, "", "key").unwrap_err();
        assert_eq!(err, ConfigError::PlaceholderProjectId(Backend::Qa));
    }

    #[test]
    fn test_emulator_accepts_placeholders() {
        let config =
            ClientConfig::new(Backend::Emulator, PROJECT_ID_PLACEHOLDER, API_KEY_PLACEHOLDER)
                .unwrap();
        assert_eq!(config.project_id, PROJECT_ID_PLACEHOLDER);
    }
}
