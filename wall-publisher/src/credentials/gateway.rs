//! JSON-over-HTTP client for the publish gateway.
//!
//! The gateway is a sidecar that owns the social network's wire protocol and
//! exposes four routes, all answering `{code, message, data}`:
//!
//! | route                    | request                          | `data`                 |
//! |--------------------------|----------------------------------|------------------------|
//! | `POST /publish`          | `Cookie`, `{text, images: [b64]}`| `{tid}`                |
//! | `GET /user/info`         | `Cookie`                         | `{uin, nickname}`      |
//! | `POST /qrcode`           |                                  | `{image: b64, token}`  |
//! | `GET /qrcode/poll?token=`|                                  | `{state, cookie?}`     |

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use reqwest::header::COOKIE;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

use super::{EndpointError, PublishEndpoint, PublishResponse, QrCode, QrPollStatus, UserInfo};

/// Response codes meaning the cookie is no longer accepted.
const AUTH_EXPIRED_CODES: [i64; 2] = [-3000, -100];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default, alias = "msg")]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct PublishData {
    #[serde(default, alias = "id")]
    tid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QrData {
    image: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct PollData {
    state: String,
    #[serde(default)]
    cookie: Option<String>,
}

/// [`PublishEndpoint`] backed by the publish gateway.
#[derive(Debug, Clone)]
pub struct GatewayEndpoint {
    http: Client,
    base_url: Url,
}

impl GatewayEndpoint {
    pub fn new(http: Client, base_url: &str) -> Result<Self, EndpointError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| EndpointError::Parse(format!("gateway url: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    fn url(&self, route: &str) -> Result<Url, EndpointError> {
        self.base_url
            .join(route)
            .map_err(|e| EndpointError::Parse(format!("route {route}: {e}")))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Envelope<T>, EndpointError> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(EndpointError::AuthExpired(format!("HTTP {status}")));
        }
        let response = response.error_for_status()?;
        let body = response.text().await?;
        trace!(body = %body, "Gateway response");
        decode_envelope(&body)
    }
}

fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<Envelope<T>, EndpointError> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| EndpointError::Parse(e.to_string()))?;
    if AUTH_EXPIRED_CODES.contains(&envelope.code) {
        return Err(EndpointError::AuthExpired(format!(
            "code {}: {}",
            envelope.code, envelope.message
        )));
    }
    Ok(envelope)
}

fn require_ok<T>(envelope: Envelope<T>) -> Result<T, EndpointError> {
    if envelope.code != 0 {
        return Err(EndpointError::Api {
            code: envelope.code,
            message: envelope.message,
        });
    }
    envelope
        .data
        .ok_or_else(|| EndpointError::Parse("response carries no data".to_string()))
}

fn parse_poll_state(data: PollData) -> Result<QrPollStatus, EndpointError> {
    match data.state.to_ascii_lowercase().as_str() {
        "waiting" => Ok(QrPollStatus::Waiting),
        "scanned" => Ok(QrPollStatus::Scanned),
        "expired" => Ok(QrPollStatus::Expired),
        "success" => match data.cookie {
            Some(cookie) if !cookie.trim().is_empty() => Ok(QrPollStatus::Success(cookie)),
            _ => Err(EndpointError::Parse(
                "login succeeded without a cookie".to_string(),
            )),
        },
        other => Err(EndpointError::Parse(format!("unknown QR state '{other}'"))),
    }
}

#[async_trait]
impl PublishEndpoint for GatewayEndpoint {
    async fn publish(
        &self,
        cookie: &str,
        text: &str,
        images: &[Bytes],
    ) -> Result<PublishResponse, EndpointError> {
        let images: Vec<String> = images.iter().map(|img| BASE64.encode(img)).collect();
        debug!(images = images.len(), "Publishing through gateway");
        let request = self
            .http
            .post(self.url("publish")?)
            .header(COOKIE, cookie)
            .json(&json!({ "text": text, "images": images }));

        let envelope: Envelope<PublishData> = self.send(request).await?;
        Ok(PublishResponse {
            ok: envelope.code == 0,
            code: envelope.code,
            message: envelope.message,
            external_id: envelope
                .data
                .unwrap_or_default()
                .tid
                .filter(|tid| !tid.is_empty()),
        })
    }

    async fn user_info(&self, cookie: &str) -> Result<UserInfo, EndpointError> {
        let request = self.http.get(self.url("user/info")?).header(COOKIE, cookie);
        require_ok(self.send(request).await?)
    }

    async fn request_qr(&self) -> Result<QrCode, EndpointError> {
        let data: QrData = require_ok(self.send(self.http.post(self.url("qrcode")?)).await?)?;
        let image = BASE64
            .decode(data.image.trim())
            .map_err(|e| EndpointError::Parse(format!("QR image: {e}")))?;
        Ok(QrCode {
            image: Bytes::from(image),
            token: data.token,
        })
    }

    async fn poll_qr(&self, token: &str) -> Result<QrPollStatus, EndpointError> {
        let request = self
            .http
            .get(self.url("qrcode/poll")?)
            .query(&[("token", token)]);
        parse_poll_state(require_ok(self.send(request).await?)?)
    }
}
