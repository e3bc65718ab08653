//! Client configuration and environment loading.
use reqwest::Url;
use std::{fmt, time::Duration};
use thiserror::Error;

/// Production gateway used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://invoice-api.amego.tw/";

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_TAX_ID: &str = "AMEGO_TAX_ID";
pub const ENV_APP_KEY: &str = "AMEGO_APP_KEY";
pub const ENV_BASE_URL: &str = "AMEGO_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "AMEGO_TIMEOUT_SECS";

/// Errors returned while assembling a [`Config`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(&'static str),
    #[error("seller tax id must be 8 digits, got {0:?}")]
    InvalidTaxId(String),
    #[error("app key must not be empty")]
    EmptyAppKey,
    #[error("invalid base url {input:?}: {message}")]
    InvalidBaseUrl { input: String, message: String },
    #[error("invalid timeout {input:?}")]
    InvalidTimeout { input: String },
}

/// Read-only settings shared by every request a client makes.
///
/// The app key is mixed into request signatures and never transmitted, so
/// the [`Debug`] output redacts it.
///
/// # Examples
/// ```rust
/// use amego_core::config::Config;
///
/// let config = Config::new("12345678", "sHeq7t8G1wiQvhAuIM27")?;
/// assert_eq!(config.base_url().as_str(), "https://invoice-api.amego.tw/");
/// # Ok::<(), amego_core::config::ConfigError>(())
/// ```
#[derive(Clone)]
pub struct Config {
    seller_tax_id: String,
    app_key: String,
    base_url: Url,
    timeout: Duration,
    time_offset: i64,
}

impl Config {
    /// Create a configuration pointing at the production gateway.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the seller tax id is not 8 digits or the app key is empty.
    pub fn new(
        seller_tax_id: impl Into<String>,
        app_key: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let seller_tax_id = seller_tax_id.into().trim().to_string();
        if seller_tax_id.len() != 8 || !seller_tax_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::InvalidTaxId(seller_tax_id));
        }
        let app_key = app_key.into();
        if app_key.is_empty() {
            return Err(ConfigError::EmptyAppKey);
        }

        Ok(Self {
            seller_tax_id,
            app_key,
            base_url: parse_base_url(DEFAULT_BASE_URL)?,
            timeout: DEFAULT_TIMEOUT,
            time_offset: 0,
        })
    }

    /// Load configuration from `AMEGO_*` environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] when the tax id or app key is unset, or
    /// a validation error for malformed values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let tax_id = std::env::var(ENV_TAX_ID).map_err(|_| ConfigError::Missing(ENV_TAX_ID))?;
        let app_key = std::env::var(ENV_APP_KEY).map_err(|_| ConfigError::Missing(ENV_APP_KEY))?;
        let mut config = Config::new(tax_id, app_key)?;

        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            config = config.with_base_url(&base_url)?;
        }
        if let Ok(raw) = std::env::var(ENV_TIMEOUT_SECS) {
            config = config.with_timeout(parse_timeout_secs(&raw)?)?;
        }
        Ok(config)
    }

    /// Override the gateway base URL. A trailing slash is added when missing so
    /// endpoint paths join under it.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidBaseUrl`] if the value does not parse.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        self.base_url = parse_base_url(base_url)?;
        Ok(self)
    }

    /// # Errors
    /// Returns [`ConfigError::InvalidTimeout`] for a zero duration.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                input: format!("{timeout:?}"),
            });
        }
        self.timeout = timeout;
        Ok(self)
    }

    /// Seconds added to the local clock when stamping requests.
    pub fn with_time_offset(mut self, seconds: i64) -> Self {
        self.time_offset = seconds;
        self
    }

    pub fn seller_tax_id(&self) -> &str {
        &self.seller_tax_id
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn time_offset(&self) -> i64 {
        self.time_offset
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("seller_tax_id", &self.seller_tax_id)
            .field("app_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("time_offset", &self.time_offset)
            .finish()
    }
}

fn parse_base_url(input: &str) -> Result<Url, ConfigError> {
    let trimmed = input.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&normalized).map_err(|err| ConfigError::InvalidBaseUrl {
        input: input.to_string(),
        message: err.to_string(),
    })
}

fn parse_timeout_secs(raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidTimeout {
            input: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_production_defaults() {
        let config = Config::new("12345678", "key").expect("config");
        assert_eq!(config.seller_tax_id(), "12345678");
        assert_eq!(config.base_url().as_str(), DEFAULT_BASE_URL);
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.time_offset(), 0);
    }

    #[test]
    fn new_rejects_bad_tax_id_and_empty_key() {
        assert_eq!(
            Config::new("1234567", "key").unwrap_err(),
            ConfigError::InvalidTaxId("1234567".into())
        );
        assert!(matches!(
            Config::new("1234567a", "key"),
            Err(ConfigError::InvalidTaxId(_))
        ));
        assert_eq!(
            Config::new("12345678", "").unwrap_err(),
            ConfigError::EmptyAppKey
        );
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = Config::new("12345678", "key")
            .expect("config")
            .with_base_url("http://127.0.0.1:8080/api")
            .expect("url");
        assert_eq!(config.base_url().as_str(), "http://127.0.0.1:8080/api/");
    }

    #[test]
    fn base_url_rejects_garbage() {
        let err = Config::new("12345678", "key")
            .expect("config")
            .with_base_url("not a url")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn timeout_must_be_positive() {
        let config = Config::new("12345678", "key").expect("config");
        assert!(config.clone().with_timeout(Duration::ZERO).is_err());
        assert_eq!(parse_timeout_secs(" 5 "), Ok(Duration::from_secs(5)));
        assert!(parse_timeout_secs("0").is_err());
        assert!(parse_timeout_secs("soon").is_err());
    }

    #[test]
    fn debug_redacts_app_key() {
        let config = Config::new("12345678", "super-secret").expect("config");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
