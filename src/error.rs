use reqwest::StatusCode;

/// Failure taxonomy for every remote operation. Callers pattern-match on the
/// kind instead of mixing sentinel checks and exception-style handling.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Rate limits, 5xx responses, timeouts, connection resets. Retryable.
    #[error("transient service error: {0}")]
    Transient(String),

    /// The owning client could not authenticate. Fatal for that client for
    /// the rest of the process; surfaced on every subsequent call.
    #[error("not authenticated: {0}")]
    Auth(String),

    /// Malformed spreadsheet cell, unexpected response body, bad request.
    #[error("invalid data: {0}")]
    Data(String),

    /// Missing local file, disk trouble, subprocess failure.
    #[error("local resource error: {0}")]
    Resource(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }

    /// Classify an HTTP status plus a short body snippet.
    pub fn from_status(status: StatusCode, detail: &str) -> Self {
        let msg = format!("HTTP {}: {}", status.as_u16(), detail);
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            ServiceError::Transient(msg)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ServiceError::Auth(msg)
        } else {
            ServiceError::Data(msg)
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ServiceError::Transient(err.to_string())
        } else if let Some(status) = err.status() {
            ServiceError::from_status(status, "request failed")
        } else {
            ServiceError::Transient(err.to_string())
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Resource(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Data(err.to_string())
    }
}
