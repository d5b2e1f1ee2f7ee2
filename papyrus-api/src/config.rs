//! API Configuration Module
//!
//! Configuration is loaded once at startup from environment variables and
//! passed down by value. Secrets are held as [`SecretString`] so they never
//! show up in `Debug` output or logs.

use std::net::SocketAddr;
use std::time::Duration;

use papyrus_core::ConfigError;
use secrecy::SecretString;

/// Default number of random draws before allocation gives up.
pub const DEFAULT_CODE_MAX_ATTEMPTS: u32 = 64;

/// Responses smaller than this are sent uncompressed.
pub const DEFAULT_COMPRESSION_MIN_BYTES: u16 = 1000;

/// Identity exchange timeout in seconds.
pub const DEFAULT_IDENTITY_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// HTTP server settings and shared secrets.
#[derive(Debug)]
pub struct ApiConfig {
    /// Secret required on every business route.
    pub api_secret: SecretString,

    /// Separate secret guarding activation code allocation.
    pub activation_secret: SecretString,

    /// Address to bind the listener to.
    pub bind_addr: SocketAddr,

    /// Retry ceiling for activation code allocation.
    pub code_max_attempts: u32,

    /// Minimum body size for gzip compression.
    pub compression_min_bytes: u16,
}

impl ApiConfig {
    /// Build a config with defaults for everything but the secrets.
    pub fn new(api_secret: impl Into<String>, activation_secret: impl Into<String>) -> Self {
        Self {
            api_secret: SecretString::from(api_secret.into()),
            activation_secret: SecretString::from(activation_secret.into()),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            code_max_attempts: DEFAULT_CODE_MAX_ATTEMPTS,
            compression_min_bytes: DEFAULT_COMPRESSION_MIN_BYTES,
        }
    }

    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PAPYRUS_API_SECRET`: shared secret for business routes (required)
    /// - `PAPYRUS_ACTIVATION_SECRET`: secret for code allocation (required)
    /// - `PAPYRUS_API_BIND`: full bind address, e.g. `127.0.0.1:8080`
    /// - `PORT`: port on `0.0.0.0` when `PAPYRUS_API_BIND` is unset (default: 3000)
    /// - `PAPYRUS_CODE_MAX_ATTEMPTS`: allocation retry ceiling (default: 64)
    /// - `PAPYRUS_COMPRESSION_MIN_BYTES`: gzip threshold (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_secret = required("PAPYRUS_API_SECRET")?;
        let activation_secret = required("PAPYRUS_ACTIVATION_SECRET")?;

        let mut config = Self::new(api_secret, activation_secret);
        config.bind_addr = resolve_bind_addr(
            std::env::var("PAPYRUS_API_BIND").ok(),
            std::env::var("PORT").ok(),
        )?;
        config.code_max_attempts =
            parse_or("PAPYRUS_CODE_MAX_ATTEMPTS", DEFAULT_CODE_MAX_ATTEMPTS)?;
        if config.code_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PAPYRUS_CODE_MAX_ATTEMPTS".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        config.compression_min_bytes =
            parse_or("PAPYRUS_COMPRESSION_MIN_BYTES", DEFAULT_COMPRESSION_MIN_BYTES)?;

        Ok(config)
    }
}

/// Pick the listen address. An explicit bind address wins over a bare port.
pub fn resolve_bind_addr(
    bind: Option<String>,
    port: Option<String>,
) -> Result<SocketAddr, ConfigError> {
    if let Some(bind) = bind.filter(|b| !b.trim().is_empty()) {
        return bind.trim().parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidValue {
                field: "PAPYRUS_API_BIND".to_string(),
                value: bind.clone(),
                reason: e.to_string(),
            }
        });
    }

    let port = match port.filter(|p| !p.trim().is_empty()) {
        Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
            field: "PORT".to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })?,
        None => 3000,
    };
    Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}

// ============================================================================
// IDENTITY PROVIDER CONFIGURATION
// ============================================================================

/// Credentials for the WeChat mini-program code exchange.
#[derive(Debug)]
pub struct WechatConfig {
    pub app_id: String,
    pub app_secret: SecretString,
    /// `jscode2session` endpoint.
    pub login_url: String,
    pub timeout: Duration,
}

impl WechatConfig {
    /// Load from environment variables.
    ///
    /// - `WECHAT_APPID` (required)
    /// - `WECHAT_SECRET` (required)
    /// - `WECHAT_LOGIN_URL` (required)
    /// - `WECHAT_TIMEOUT_SECS` (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            app_id: required("WECHAT_APPID")?,
            app_secret: SecretString::from(required("WECHAT_SECRET")?),
            login_url: required("WECHAT_LOGIN_URL")?,
            timeout: Duration::from_secs(parse_or(
                "WECHAT_TIMEOUT_SECS",
                DEFAULT_IDENTITY_TIMEOUT_SECS,
            )?),
        })
    }
}

// ============================================================================
// HELPERS
// ============================================================================

pub(crate) fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            field: name.to_string(),
        })
}

pub(crate) fn parse_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_bind_addr_prefers_explicit_bind() {
        let addr = resolve_bind_addr(Some("127.0.0.1:9000".to_string()), Some("4000".to_string()))
            .unwrap();
        assert_eq!(addr, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_bind_addr_from_port() {
        let addr = resolve_bind_addr(None, Some("4000".to_string())).unwrap();
        assert_eq!(addr, SocketAddr::from(([0, 0, 0, 0], 4000)));

        let addr = resolve_bind_addr(Some("  ".to_string()), None).unwrap();
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_bind_addr_rejects_garbage() {
        let err = resolve_bind_addr(None, Some("http".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "PORT"));

        let err = resolve_bind_addr(Some("nowhere".to_string()), None).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "PAPYRUS_API_BIND")
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ApiConfig::new("api-s3cret", "act-s3cret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("api-s3cret"));
        assert!(!rendered.contains("act-s3cret"));
        assert_eq!(config.api_secret.expose_secret(), "api-s3cret");
        assert_eq!(config.code_max_attempts, 64);
        assert_eq!(config.compression_min_bytes, 1000);
    }
}
