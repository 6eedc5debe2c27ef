use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard OneBot v11 response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    /// "ok", "async" or "failed".
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    /// Implementations disagree on the name of the error text field.
    #[serde(default, alias = "msg")]
    pub message: Option<String>,
    #[serde(default)]
    pub wording: Option<String>,
}

impl ActionResponse {
    pub fn is_ok(&self) -> bool {
        self.retcode == 0 && self.status != "failed"
    }

    pub fn error_text(&self) -> String {
        self.wording
            .as_deref()
            .filter(|w| !w.is_empty())
            .or(self.message.as_deref())
            .unwrap_or("unknown error")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInfo {
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookiesData {
    #[serde(default)]
    pub cookies: String,
    #[serde(default)]
    pub bkn: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MessageId {
    pub message_id: i64,
}
