use async_trait::async_trait;
use onebot_client::OneBotClient;

use super::{BotConnection, BotError};

/// A bot reachable over the OneBot v11 HTTP API.
#[derive(Debug, Clone)]
pub struct OneBotConnection {
    self_id: i64,
    nickname: String,
    client: OneBotClient,
}

impl OneBotConnection {
    pub fn new(self_id: i64, nickname: impl Into<String>, client: OneBotClient) -> Self {
        Self {
            self_id,
            nickname: nickname.into(),
            client,
        }
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn client(&self) -> &OneBotClient {
        &self.client
    }
}

#[async_trait]
impl BotConnection for OneBotConnection {
    fn self_id(&self) -> i64 {
        self.self_id
    }

    async fn get_cookies(&self, domain: &str) -> Result<String, BotError> {
        let cookies = self.client.get_cookies(domain).await?;
        if cookies.trim().is_empty() {
            return Err(BotError::Empty("cookies"));
        }
        Ok(cookies)
    }

    async fn raw_signature_blob(&self) -> Result<Vec<u8>, BotError> {
        Ok(self.client.get_rkey_raw().await?)
    }

    async fn resolve_local_token(&self, token: &str) -> Result<String, BotError> {
        let image = self.client.get_image(token).await?;
        if image.url.is_empty() {
            return Err(BotError::Empty("image url"));
        }
        Ok(image.url)
    }

    async fn send_group_message(&self, group_id: i64, text: &str) -> Result<(), BotError> {
        self.client.send_group_msg(group_id, text).await?;
        Ok(())
    }
}
