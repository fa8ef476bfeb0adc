use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Cannot resolve host {host}: {message}")]
    Dns { host: String, message: String },

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Unexpected HTTP status {status}")]
    Http { status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn is_dns(&self) -> bool {
        matches!(self, ClientError::Dns { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status } => Some(*status),
            _ => None,
        }
    }

    /// Map a reqwest failure, keeping timeouts and resolution errors typed
    pub(crate) fn from_reqwest(host: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ClientError::Timeout(host.to_string());
        }
        if let Some(status) = err.status() {
            return ClientError::Http { status: status.as_u16() };
        }
        if err.is_decode() {
            return ClientError::Decode(err.to_string());
        }
        if err.is_connect() && is_resolution_failure(&err) {
            return ClientError::Dns {
                host: host.to_string(),
                message: err.to_string(),
            };
        }
        ClientError::Transport(err.to_string())
    }
}

fn is_resolution_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let text = e.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return true;
        }
        current = e.source();
    }
    false
}

pub type Result<T> = std::result::Result<T, ClientError>;
