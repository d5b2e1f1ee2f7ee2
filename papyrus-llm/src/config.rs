//! Generator endpoint configuration.

use std::time::Duration;

use papyrus_core::ConfigError;
use secrecy::SecretString;

/// Default request timeout for one generation call.
pub const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 600;

/// Where the generator lives and how to authenticate to it.
#[derive(Debug)]
pub struct GeneratorConfig {
    /// Full URL of the generation endpoint, e.g. `http://host:8000/api/qa`.
    pub url: String,
    /// Shared secret sent as the `sec` query parameter.
    pub secret: SecretString,
    /// Upper bound on a single request.
    pub timeout: Duration,
}

impl GeneratorConfig {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: SecretString::from(secret.into()),
            timeout: Duration::from_secs(DEFAULT_GENERATOR_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load from environment variables.
    ///
    /// - `PAPYRUS_GENERATOR_URL` (required)
    /// - `PAPYRUS_GENERATOR_SECRET` (required)
    /// - `PAPYRUS_GENERATOR_TIMEOUT_SECS` (default: 600)
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = required("PAPYRUS_GENERATOR_URL")?;
        let secret = required("PAPYRUS_GENERATOR_SECRET")?;

        let timeout_secs = match std::env::var("PAPYRUS_GENERATOR_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                field: "PAPYRUS_GENERATOR_TIMEOUT_SECS".to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            Err(_) => DEFAULT_GENERATOR_TIMEOUT_SECS,
        };

        Ok(Self::new(url, secret).with_timeout(Duration::from_secs(timeout_secs)))
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            field: name.to_string(),
        })
}
