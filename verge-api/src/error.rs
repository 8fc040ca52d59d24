use std::time::Duration;

use reqwest::StatusCode;

/// Errors returned by the VergeOS client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The host could not be reached or the TLS handshake failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A request exceeded its deadline.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// An operation was attempted before [`Client::connect`](crate::Client::connect).
    #[error("not connected to VergeOS")]
    NotConnected,

    /// Credentials were rejected (401/403).
    #[error("authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    /// The resource does not exist (404, or an empty lookup result).
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or dependency constraint was violated (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request was rejected as invalid, by the server (422) or before sending.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Any other non-success response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// An asynchronous task finished in an error state.
    #[error("task {task_id} failed: {message}")]
    Task { task_id: String, message: String },

    /// An asynchronous task did not finish before the deadline.
    #[error("task {task_id} did not complete within {timeout:?}")]
    TaskTimeout { task_id: String, timeout: Duration },

    /// The caller supplied an invalid or incomplete set of arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing required configuration.
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// HTTP client error not covered by a more specific variant.
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// The response body was not the JSON shape we expected.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build the typed error for a non-success response.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = extract_message(status, body);
        match status.as_u16() {
            401 | 403 => Self::Authentication {
                status: status.as_u16(),
                message,
            },
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            422 => Self::Validation(message),
            code => Self::Api {
                status: code,
                message,
            },
        }
    }

    /// HTTP status associated with this error, if it came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::Conflict(_) => Some(409),
            Self::Validation(_) => Some(422),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True for every variant that represents an API-level rejection.
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            Self::Api { .. }
                | Self::Authentication { .. }
                | Self::NotFound(_)
                | Self::Conflict(_)
                | Self::Validation(_)
        )
    }

    /// Task identifier for task failures.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Task { task_id, .. } | Self::TaskTimeout { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

/// VergeOS reports failures under `err`, `error` or `message`, sometimes nested.
fn extract_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => {
            if let Some(object) = value.as_object() {
                for field in ["err", "error", "message"] {
                    match object.get(field) {
                        Some(serde_json::Value::String(msg)) => return msg.clone(),
                        Some(serde_json::Value::Object(inner)) => {
                            if let Some(msg) = inner.get("message") {
                                return match msg {
                                    serde_json::Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                };
                            }
                        }
                        _ => {}
                    }
                }
            }
            value.to_string()
        }
        Err(_) if !body.is_empty() => body.to_owned(),
        Err(_) => format!("HTTP {}", status.as_u16()),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            Error::from_response(StatusCode::UNAUTHORIZED, ""),
            Error::Authentication { status: 401, .. }
        ));
        assert!(matches!(
            Error::from_response(StatusCode::FORBIDDEN, ""),
            Error::Authentication { status: 403, .. }
        ));
        assert!(Error::from_response(StatusCode::NOT_FOUND, "").is_not_found());
        assert!(matches!(
            Error::from_response(StatusCode::CONFLICT, ""),
            Error::Conflict(_)
        ));
        assert!(matches!(
            Error::from_response(StatusCode::UNPROCESSABLE_ENTITY, ""),
            Error::Validation(_)
        ));
        assert!(matches!(
            Error::from_response(StatusCode::BAD_GATEWAY, ""),
            Error::Api { status: 502, .. }
        ));
    }

    #[test]
    fn test_message_from_err_field() {
        let err = Error::from_response(StatusCode::CONFLICT, r#"{"err":"name in use"}"#);
        assert_eq!(err.to_string(), "conflict: name in use");
    }

    #[test]
    fn test_message_from_nested_error() {
        let body = r#"{"error":{"message":"bad cidr","code":7}}"#;
        let err = Error::from_response(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(err.to_string(), "validation failed: bad cidr");
    }

    #[test]
    fn test_message_falls_back_to_text_then_status() {
        let err = Error::from_response(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(err.to_string(), "API error (HTTP 500): boom");

        let err = Error::from_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(err.to_string(), "API error (HTTP 500): HTTP 500");
    }

    #[test]
    fn test_unrecognised_json_is_rendered() {
        let err = Error::from_response(StatusCode::BAD_REQUEST, r#"{"detail":"x"}"#);
        assert_eq!(err.to_string(), r#"API error (HTTP 400): {"detail":"x"}"#);
    }

    #[test]
    fn test_status_code_and_api_classification() {
        assert_eq!(Error::NotFound("x".into()).status_code(), Some(404));
        assert!(Error::Conflict("x".into()).is_api_error());
        assert!(!Error::NotConnected.is_api_error());
        assert_eq!(Error::NotConnected.status_code(), None);
    }

    #[test]
    fn test_task_id() {
        let err = Error::TaskTimeout {
            task_id: "42".into(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.task_id(), Some("42"));
        assert_eq!(Error::NotConnected.task_id(), None);
    }
}
