use std::time::Duration;

use crate::constants::{
    API_PREFIX, DEFAULT_CONSISTENCY_TIMEOUT, DEFAULT_RETRY_BACKOFF, DEFAULT_RETRY_TOTAL,
    DEFAULT_TIMEOUT, RETRY_STATUS_CODES,
};
use crate::error::{Error, Result};

/// How requests authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP Basic with a VergeOS username and password.
    Basic { username: String, password: String },
    /// Bearer API token.
    Token(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Token(_) => f.debug_tuple("Token").field(&"***").finish(),
        }
    }
}

/// Connection settings for a [`Client`](crate::Client).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use verge_api::ClientConfig;
///
/// let config = ClientConfig::new("verge.example.com")
///     .basic_auth("admin", "secret")
///     .verify_ssl(false)
///     .timeout(Duration::from_secs(60));
/// assert_eq!(config.api_base_url(), "https://verge.example.com/api/v4");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    host: String,
    credentials: Option<Credentials>,
    verify_ssl: bool,
    timeout: Duration,
    retry_total: u32,
    retry_backoff: Duration,
    retry_status_codes: Vec<u16>,
    consistency_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for `host`.
    ///
    /// A bare host name is reached over HTTPS. A host that already carries an
    /// `http://` or `https://` scheme keeps it.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            credentials: None,
            verify_ssl: true,
            timeout: DEFAULT_TIMEOUT,
            retry_total: DEFAULT_RETRY_TOTAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            retry_status_codes: RETRY_STATUS_CODES.to_vec(),
            consistency_timeout: DEFAULT_CONSISTENCY_TIMEOUT,
        }
    }

    /// Build a configuration from `VERGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    ///
    /// Recognised variables: `VERGE_HOST` (required), `VERGE_USERNAME`,
    /// `VERGE_PASSWORD`, `VERGE_TOKEN`, `VERGE_VERIFY_SSL`, `VERGE_TIMEOUT`,
    /// `VERGE_RETRY_TOTAL` and `VERGE_RETRY_BACKOFF`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = get("VERGE_HOST").ok_or(Error::MissingConfig("VERGE_HOST"))?;
        let mut config = Self::new(host.trim());

        if let Some(token) = get("VERGE_TOKEN") {
            config = config.token(token);
        } else if let Some(username) = get("VERGE_USERNAME") {
            let password = get("VERGE_PASSWORD").unwrap_or_default();
            config = config.basic_auth(username, password);
        }

        if let Some(value) = get("VERGE_VERIFY_SSL") {
            config.verify_ssl = parse_flag(&value);
        }
        if let Some(value) = get("VERGE_TIMEOUT") {
            config.timeout = Duration::from_secs(parse_number("VERGE_TIMEOUT", &value)?);
        }
        if let Some(value) = get("VERGE_RETRY_TOTAL") {
            config.retry_total = parse_number("VERGE_RETRY_TOTAL", &value)?;
        }
        if let Some(value) = get("VERGE_RETRY_BACKOFF") {
            let secs: f64 = parse_number("VERGE_RETRY_BACKOFF", &value)?;
            config.retry_backoff = Duration::try_from_secs_f64(secs).map_err(|_| {
                Error::InvalidArgument(format!("VERGE_RETRY_BACKOFF must be non-negative, got {value}"))
            })?;
        }

        Ok(config)
    }

    /// Authenticate with HTTP Basic credentials.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::Basic {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Authenticate with a bearer API token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::Token(token.into()));
        self
    }

    /// Verify the server's TLS certificate (default `true`).
    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    /// Per-request timeout (default 30 s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum number of retries for retryable status codes (default 3).
    pub fn retry_total(mut self, retries: u32) -> Self {
        self.retry_total = retries;
        self
    }

    /// Base delay between retries; doubled after every attempt (default 1 s).
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Status codes that trigger a retry.
    pub fn retry_status_codes(mut self, codes: impl Into<Vec<u16>>) -> Self {
        self.retry_status_codes = codes.into();
        self
    }

    /// How long a freshly created row may stay invisible before `create` gives up.
    pub fn consistency_timeout(mut self, timeout: Duration) -> Self {
        self.consistency_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_verify_ssl(&self) -> bool {
        self.verify_ssl
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retries(&self) -> u32 {
        self.retry_total
    }

    pub fn backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retry_status_codes.contains(&status)
    }

    pub fn consistency_window(&self) -> Duration {
        self.consistency_timeout
    }

    /// Base URL every API path is joined to.
    pub fn api_base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}/{API_PREFIX}")
        } else {
            format!("https://{host}/{API_PREFIX}")
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("{name} must be a number, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_requires_host() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::MissingConfig("VERGE_HOST")));
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[("VERGE_HOST", "10.0.0.1")])).unwrap();
        assert_eq!(config.api_base_url(), "https://10.0.0.1/api/v4");
        assert!(config.is_verify_ssl());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.retries(), 3);
        assert_eq!(config.backoff(), Duration::from_secs(1));
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_from_lookup_reads_everything() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("VERGE_HOST", "verge.local"),
            ("VERGE_USERNAME", "admin"),
            ("VERGE_PASSWORD", "pw"),
            ("VERGE_VERIFY_SSL", "no"),
            ("VERGE_TIMEOUT", "90"),
            ("VERGE_RETRY_TOTAL", "5"),
            ("VERGE_RETRY_BACKOFF", "0.5"),
        ]))
        .unwrap();

        assert_eq!(
            config.credentials(),
            Some(&Credentials::Basic {
                username: "admin".into(),
                password: "pw".into()
            })
        );
        assert!(!config.is_verify_ssl());
        assert_eq!(config.request_timeout(), Duration::from_secs(90));
        assert_eq!(config.retries(), 5);
        assert_eq!(config.backoff(), Duration::from_millis(500));
    }

    #[test]
    fn test_token_wins_over_basic() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("VERGE_HOST", "verge.local"),
            ("VERGE_USERNAME", "admin"),
            ("VERGE_PASSWORD", "pw"),
            ("VERGE_TOKEN", "abc"),
        ]))
        .unwrap();
        assert_eq!(config.credentials(), Some(&Credentials::Token("abc".into())));
    }

    #[test]
    fn test_verify_ssl_flags() {
        for (raw, expected) in [("TRUE", true), ("1", true), ("yes", true), ("off", false)] {
            let config = ClientConfig::from_lookup(lookup(&[
                ("VERGE_HOST", "h"),
                ("VERGE_VERIFY_SSL", raw),
            ]))
            .unwrap();
            assert_eq!(config.is_verify_ssl(), expected, "value {raw}");
        }
    }

    #[test]
    fn test_malformed_timeout_is_invalid_argument() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("VERGE_HOST", "h"),
            ("VERGE_TIMEOUT", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_explicit_scheme_is_kept() {
        let config = ClientConfig::new("http://127.0.0.1:8080/");
        assert_eq!(config.api_base_url(), "http://127.0.0.1:8080/api/v4");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = ClientConfig::new("h").basic_auth("admin", "hunter2");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
