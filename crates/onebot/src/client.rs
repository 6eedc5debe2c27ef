use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace};
use url::Url;

use crate::error::OneBotError;
use crate::models::{ActionResponse, CookiesData, ImageData, LoginInfo, MessageId};

/// HTTP client for a single OneBot v11 endpoint.
///
/// Every action is a `POST {base}/{action}` with a JSON body; the response is
/// the standard `{status, retcode, data}` envelope.
#[derive(Debug, Clone)]
pub struct OneBotClient {
    http: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl OneBotClient {
    /// Create a client for `base_url`. The caller owns the `reqwest::Client`
    /// (and therefore its timeout and TLS setup).
    pub fn new(
        http: Client,
        base_url: &str,
        access_token: Option<String>,
    ) -> Result<Self, OneBotError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http,
            base_url,
            access_token: access_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Call an arbitrary action and return its `data` payload.
    pub async fn call(&self, action: &'static str, params: Value) -> Result<Value, OneBotError> {
        let url = self.base_url.join(action)?;
        let mut request = self.http.post(url).json(&params);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(OneBotError::Unauthorized);
        }
        let response = response.error_for_status()?;

        let body: ActionResponse = response
            .json()
            .await
            .map_err(|e| OneBotError::Parse(e.to_string()))?;
        trace!(action, retcode = body.retcode, "OneBot action response");

        decode_envelope(action, body)
    }

    async fn call_as<T: DeserializeOwned>(
        &self,
        action: &'static str,
        params: Value,
    ) -> Result<T, OneBotError> {
        let data = self.call(action, params).await?;
        serde_json::from_value(data).map_err(|e| OneBotError::Parse(format!("{action}: {e}")))
    }

    pub async fn get_login_info(&self) -> Result<LoginInfo, OneBotError> {
        self.call_as("get_login_info", json!({})).await
    }

    /// Cookies of the bot account for `domain`, as a `k=v; k=v` string.
    pub async fn get_cookies(&self, domain: &str) -> Result<String, OneBotError> {
        let data: CookiesData = self
            .call_as("get_cookies", json!({ "domain": domain }))
            .await?;
        Ok(data.cookies)
    }

    /// Raw media signing-key payload, returned untouched so callers can parse
    /// whichever shape the bot implementation produces.
    pub async fn get_rkey_raw(&self) -> Result<Vec<u8>, OneBotError> {
        let data = self.call("nc_get_rkey", json!({})).await?;
        serde_json::to_vec(&data).map_err(|e| OneBotError::Parse(e.to_string()))
    }

    pub async fn get_image(&self, file: &str) -> Result<ImageData, OneBotError> {
        debug!(file, "Resolving image token");
        self.call_as("get_image", json!({ "file": file })).await
    }

    pub async fn send_group_msg(&self, group_id: i64, text: &str) -> Result<i64, OneBotError> {
        let data: MessageId = self
            .call_as(
                "send_group_msg",
                json!({
                    "group_id": group_id,
                    "message": [{ "type": "text", "data": { "text": text } }],
                }),
            )
            .await?;
        Ok(data.message_id)
    }
}

fn decode_envelope(action: &'static str, body: ActionResponse) -> Result<Value, OneBotError> {
    if !body.is_ok() {
        return Err(OneBotError::ActionFailed {
            action,
            retcode: body.retcode,
            message: body.error_text(),
        });
    }
    Ok(body.data)
}
