use thiserror::Error;

/// Every way a backend call can fail.
///
/// The UI layer only shows `Display` text; `Unauthorized` additionally asks
/// the user to sign in again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response from backend: {0}")]
    Decode(String),

    #[error("Session expired, please sign in again")]
    Unauthorized,
}

impl FetchError {
    pub fn needs_reauth(&self) -> bool {
        matches!(self, FetchError::Unauthorized)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Unauthorized => Some(401),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

/// Result type alias for backend calls
pub type FetchResult<T> = std::result::Result<T, FetchError>;
