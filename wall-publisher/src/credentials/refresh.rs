//! Session-expired strategies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::{Credential, CredentialError};
use crate::bots::BotRegistry;
use crate::notification::AlertSink;
use crate::signature::SignatureCache;

/// Default cookie domain of the publish endpoint.
pub const DEFAULT_COOKIE_DOMAIN: &str = "qzone.qq.com";

/// Produces a replacement cookie when the endpoint rejects the current one.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self) -> Result<String, CredentialError>;
}

/// Refresher for sessions that must be renewed by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualRefresher;

#[async_trait]
impl SessionRefresher for ManualRefresher {
    async fn refresh(&self) -> Result<String, CredentialError> {
        Err(CredentialError::RefreshFailed(
            "automatic refresh is disabled".to_string(),
        ))
    }
}

/// Sources cookies from the live bot accounts.
///
/// Bots are asked in registration order and the first usable cookie wins.
/// Each bot's signing keys are folded into the signature cache on the way.
pub struct BotCookieRefresher {
    bots: Arc<dyn BotRegistry>,
    domain: String,
    call_timeout: Duration,
    signatures: Option<Arc<SignatureCache>>,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl BotCookieRefresher {
    pub fn new(bots: Arc<dyn BotRegistry>, domain: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            bots,
            domain: domain.into(),
            call_timeout,
            signatures: None,
            alerts: None,
        }
    }

    pub fn with_signatures(mut self, signatures: Arc<SignatureCache>) -> Self {
        self.signatures = Some(signatures);
        self
    }

    /// Alert operators when [`SessionRefresher::refresh`] comes back empty.
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Scan the bots once for a cookie.
    #[instrument(skip(self), fields(domain = %self.domain))]
    pub async fn fetch_cookie(&self) -> Result<String, CredentialError> {
        let bots = self.bots.list();
        if bots.is_empty() {
            debug!("No bot connection available for cookies");
            return Err(CredentialError::NoBotAvailable);
        }

        for bot in bots {
            let bot_id = bot.self_id();

            if let Some(signatures) = &self.signatures {
                match tokio::time::timeout(self.call_timeout, bot.raw_signature_blob()).await {
                    Ok(Ok(raw)) => {
                        if let Err(e) = signatures.update_from_raw(&raw, bot_id) {
                            debug!(bot_id, error = %e, "Ignoring malformed signature blob");
                        }
                    }
                    Ok(Err(e)) => debug!(bot_id, error = %e, "No signature blob from bot"),
                    Err(_) => debug!(bot_id, "Signature blob request timed out"),
                }
            }

            let cookie =
                match tokio::time::timeout(self.call_timeout, bot.get_cookies(&self.domain)).await {
                    Ok(Ok(cookie)) if !cookie.trim().is_empty() => cookie,
                    Ok(Ok(_)) => {
                        debug!(bot_id, "Bot returned empty cookies");
                        continue;
                    }
                    Ok(Err(e)) => {
                        debug!(bot_id, error = %e, "Bot cookie request failed");
                        continue;
                    }
                    Err(_) => {
                        debug!(bot_id, "Bot cookie request timed out");
                        continue;
                    }
                };

            match Credential::parse(&cookie) {
                Ok(credential) => {
                    info!(bot_id, uin = credential.uin(), "Cookie obtained from bot");
                    return Ok(cookie);
                }
                Err(e) => warn!(bot_id, error = %e, "Bot returned an unusable cookie"),
            }
        }

        Err(CredentialError::RefreshFailed(
            "no bot returned a usable cookie".to_string(),
        ))
    }
}

#[async_trait]
impl SessionRefresher for BotCookieRefresher {
    async fn refresh(&self) -> Result<String, CredentialError> {
        let result = self.fetch_cookie().await;
        if let (Err(e), Some(alerts)) = (&result, &self.alerts) {
            alerts
                .alert(&format!(
                    "Publish session expired and refreshing from bots failed ({e}); a QR login is required"
                ))
                .await;
        }
        result
    }
}
