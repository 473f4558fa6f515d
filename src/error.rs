//! Failures at the HTTP boundary of the source clients.

/// Why a single request to a remote source produced no data.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network, TLS, timeout or overload errors that may succeed on retry.
    #[error("transient network error: {0}")]
    Transient(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Decode(String),

    /// The search API answered but reported an error in its payload.
    #[error("search API error: {0}")]
    Api(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) if code == 429 || code >= 500 => {
                FetchError::Transient(format!("HTTP status {code}"))
            }
            ureq::Error::StatusCode(code) => FetchError::Status(code),
            ureq::Error::Io(_)
            | ureq::Error::Timeout(_)
            | ureq::Error::HostNotFound
            | ureq::Error::ConnectionFailed
            | ureq::Error::Tls(_) => FetchError::Transient(err.to_string()),
            other => FetchError::Request(other.to_string()),
        }
    }
}
