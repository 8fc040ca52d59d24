use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, Credentials};
use crate::constants::{SYSTEM_FIELDS, UPLOAD_CHUNK_TIMEOUT};
use crate::error::{Error, Result};

/// Version information recorded when a session is established.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SystemInfo {
    #[serde(rename = "yb_version", default)]
    pub version: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub cloud_name: Option<String>,
}

/// Query-string pairs.
pub type Query = [(String, String)];

/// Connection to one VergeOS system.
///
/// Cloning is cheap; every clone shares the HTTP connection pool and the
/// session recorded by [`connect`](Self::connect).
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    config: ClientConfig,
    session: RwLock<Option<SystemInfo>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build a client. No request is sent until [`connect`](Self::connect).
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(!config.is_verify_ssl())
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: config.api_base_url(),
                config,
                session: RwLock::new(None),
            }),
        })
    }

    /// Build a client from `VERGE_*` environment variables and connect it.
    pub async fn from_env() -> Result<Self> {
        let client = Self::new(ClientConfig::from_env()?)?;
        client.connect().await?;
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Validate credentials against the system endpoint and open the session.
    pub async fn connect(&self) -> Result<SystemInfo> {
        let query = [("fields".to_owned(), SYSTEM_FIELDS.to_owned())];
        let response = self.execute(Method::GET, "system", &query, None).await?;

        let record = match response {
            Some(Value::Array(mut items)) if !items.is_empty() => items.swap_remove(0),
            Some(value @ Value::Object(_)) => value,
            _ => {
                return Err(Error::Connection(
                    "system endpoint returned no data".to_owned(),
                ));
            }
        };
        let info: SystemInfo = serde_json::from_value(record)?;

        info!(
            host = self.inner.config.host(),
            version = info.version.as_deref().unwrap_or("unknown"),
            "connected to VergeOS"
        );
        *self.inner.session.write().await = Some(info.clone());
        Ok(info)
    }

    /// Forget the session. Later requests fail with [`Error::NotConnected`].
    pub async fn disconnect(&self) {
        *self.inner.session.write().await = None;
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.session.read().await.is_some()
    }

    /// Information recorded by the last successful [`connect`](Self::connect).
    pub async fn system_info(&self) -> Option<SystemInfo> {
        self.inner.session.read().await.clone()
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.is_connected().await {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    // =========================================================================
    // JSON Requests
    // =========================================================================

    /// Send a JSON request and return the decoded body, if any.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        self.ensure_connected().await?;
        self.execute(method, path, query, body).await
    }

    /// GET `path`.
    pub async fn get(&self, path: &str, query: &Query) -> Result<Option<Value>> {
        self.request(Method::GET, path, query, None).await
    }

    /// POST a JSON body to `path`.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    /// PUT a JSON body to `path`.
    pub async fn put(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    /// DELETE `path`.
    pub async fn delete(&self, path: &str) -> Result<Option<Value>> {
        self.request(Method::DELETE, path, &[], None).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let url = self.url(path);
        let config = &self.inner.config;
        let mut attempt: u32 = 0;

        loop {
            debug!(%method, path, ?query, "VergeOS API request");

            let mut request = self.authorize(self.inner.http.request(method.clone(), &url));
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if !status.is_success()
                && attempt < config.retries()
                && config.is_retryable(status.as_u16())
            {
                let delay = retry_delay(config.backoff(), attempt);
                attempt += 1;
                warn!(
                    %method,
                    path,
                    status = status.as_u16(),
                    attempt,
                    ?delay,
                    "retrying VergeOS API request"
                );
                sleep(delay).await;
                continue;
            }

            return decode(&method, path, response).await;
        }
    }

    // =========================================================================
    // Raw Transfers
    // =========================================================================

    /// PUT a raw octet-stream chunk. Used for file uploads.
    pub async fn put_bytes(&self, path: &str, query: &Query, bytes: Vec<u8>) -> Result<()> {
        self.ensure_connected().await?;
        debug!(path, ?query, len = bytes.len(), "VergeOS chunk upload");

        let response = self
            .authorize(self.inner.http.put(self.url(path)))
            .query(query)
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(UPLOAD_CHUNK_TIMEOUT)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_response(status, &text));
        }
        Ok(())
    }

    /// GET a raw response for streaming. Used for file downloads.
    pub async fn get_raw(&self, path: &str, query: &Query) -> Result<Response> {
        self.ensure_connected().await?;
        debug!(path, ?query, "VergeOS raw download");

        let response = self
            .authorize(self.inner.http.get(self.url(path)))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_response(status, &text));
        }
        Ok(response)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.inner.config.credentials() {
            Some(Credentials::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(Credentials::Token(token)) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn retry_delay(backoff: Duration, attempt: u32) -> Duration {
    backoff.saturating_mul(2u32.saturating_pow(attempt))
}

async fn decode(method: &Method, path: &str, response: Response) -> Result<Option<Value>> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        warn!(%method, path, status = status.as_u16(), "VergeOS API request failed");
        return Err(Error::from_response(status, &text));
    }
    if !matches!(status, StatusCode::OK | StatusCode::CREATED) || text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&text)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles() {
        let base = Duration::from_millis(250);
        assert_eq!(retry_delay(base, 0), Duration::from_millis(250));
        assert_eq!(retry_delay(base, 1), Duration::from_millis(500));
        assert_eq!(retry_delay(base, 3), Duration::from_secs(2));
    }

    #[test]
    fn test_url_joining() {
        let client = Client::new(ClientConfig::new("http://127.0.0.1:9")).unwrap();
        assert_eq!(client.url("vms/3"), "http://127.0.0.1:9/api/v4/vms/3");
        assert_eq!(client.url("/vms"), "http://127.0.0.1:9/api/v4/vms");
    }

    #[tokio::test]
    async fn test_requests_before_connect_fail() {
        let client = Client::new(ClientConfig::new("http://127.0.0.1:9")).unwrap();
        let err = client.get("vms", &[]).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(!client.is_connected().await);
    }
}
