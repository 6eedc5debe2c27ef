//! Contract of the external publish endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::EndpointError;

/// Raw outcome of a publish call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub ok: bool,
    pub code: i64,
    pub message: String,
    /// Identifier of the created post, when the endpoint supplies one.
    pub external_id: Option<String>,
}

/// Account the cookie belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub uin: i64,
    pub nickname: String,
}

/// Login QR code.
#[derive(Debug, Clone)]
pub struct QrCode {
    /// PNG image data.
    pub image: Bytes,
    /// Opaque handle used to poll the login state.
    pub token: String,
}

/// State of a pending QR login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPollStatus {
    /// Not scanned yet.
    Waiting,
    /// Scanned, waiting for confirmation on the phone.
    Scanned,
    /// Confirmed; carries the new cookie.
    Success(String),
    /// Code expired.
    Expired,
}

/// The external social-network endpoint.
///
/// Implementations report rejected cookies as [`EndpointError::AuthExpired`].
#[async_trait]
pub trait PublishEndpoint: Send + Sync {
    async fn publish(
        &self,
        cookie: &str,
        text: &str,
        images: &[Bytes],
    ) -> Result<PublishResponse, EndpointError>;

    async fn user_info(&self, cookie: &str) -> Result<UserInfo, EndpointError>;

    async fn request_qr(&self) -> Result<QrCode, EndpointError>;

    async fn poll_qr(&self, token: &str) -> Result<QrPollStatus, EndpointError>;
}
