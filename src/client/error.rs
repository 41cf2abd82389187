use reqwest::StatusCode;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Failures surfaced by [`ApiClient`](super::ApiClient). Only the
/// unauthorized path is ever retried; everything else is reported once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("session expired")]
    SessionExpired,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(String),
}

impl ClientError {
    /// Maps a non-success, non-401 status to its error class.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status.as_u16() {
            401 => ClientError::SessionExpired,
            403 => ClientError::Forbidden(message),
            404 => ClientError::NotFound(message),
            s if s >= 500 => ClientError::Server { status: s, message },
            _ => ClientError::BadRequest(message),
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }

    /// Text shown to the user for this failure.
    pub fn notice(&self) -> String {
        match self {
            ClientError::LoginFailed(msg) => format!("Login failed: {}", msg),
            ClientError::SessionExpired | ClientError::RefreshFailed(_) => {
                "Your session has expired, please log in again".to_string()
            }
            ClientError::BadRequest(msg) => format!("Request rejected: {}", msg),
            ClientError::Forbidden(_) => "You do not have permission for this action".to_string(),
            ClientError::NotFound(_) => "The requested resource does not exist".to_string(),
            ClientError::Server { .. } => "The server failed to process the request".to_string(),
            ClientError::Network(_) => "Network error, please check your connection".to_string(),
            ClientError::Timeout => "The request timed out, please try again".to_string(),
            ClientError::UnsupportedFile(msg) => msg.clone(),
            ClientError::Decode(_) => "Received an unexpected response".to_string(),
            ClientError::Io(msg) => format!("Could not read local file: {}", msg),
        }
    }

    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            ClientError::SessionExpired | ClientError::RefreshFailed(_)
        )
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err.to_string())
    }
}
