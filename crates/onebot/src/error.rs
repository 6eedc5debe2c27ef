use thiserror::Error;

#[derive(Debug, Error)]
pub enum OneBotError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("action {action} failed: retcode={retcode}, {message}")]
    ActionFailed {
        action: &'static str,
        retcode: i64,
        message: String,
    },
    #[error("unauthorized (check access token)")]
    Unauthorized,
    #[error("parse error: {0}")]
    Parse(String),
}

impl OneBotError {
    /// Errors caused by the connection itself rather than the action.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Unauthorized)
    }
}
