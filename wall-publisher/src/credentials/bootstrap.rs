//! Background cookie bootstrap.
//!
//! The session starts with a placeholder cookie. This task gives the bots a
//! moment to connect, asks them for a real cookie a few times, and falls back
//! to a QR login only when none of them has one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::monitor::ensure_valid_on_startup;
use super::{CredentialError, CredentialSession, QrLogin, SessionRefresher};

/// Bootstrap schedule.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapPolicy {
    pub warmup: Duration,
    pub bot_attempts: u32,
    pub bot_retry_delay: Duration,
    pub startup_recheck_delay: Duration,
}

impl Default for BootstrapPolicy {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(2),
            bot_attempts: 5,
            bot_retry_delay: Duration::from_secs(1),
            startup_recheck_delay: super::monitor::DEFAULT_STARTUP_RECHECK_DELAY,
        }
    }
}

pub struct CookieBootstrap {
    bots: Arc<dyn SessionRefresher>,
    qr: QrLogin,
    policy: BootstrapPolicy,
}

impl CookieBootstrap {
    pub fn new(bots: Arc<dyn SessionRefresher>, qr: QrLogin, policy: BootstrapPolicy) -> Self {
        Self { bots, qr, policy }
    }

    /// Obtain a cookie from bots, then from a QR login.
    pub async fn obtain(&self) -> Result<String, CredentialError> {
        info!(warmup = ?self.policy.warmup, "Waiting for bot connections before fetching cookies");
        tokio::time::sleep(self.policy.warmup).await;

        for attempt in 1..=self.policy.bot_attempts {
            match self.bots.refresh().await {
                Ok(cookie) => {
                    info!(attempt, "Cookie obtained from bots");
                    return Ok(cookie);
                }
                Err(e) => info!(attempt, error = %e, "No cookie from bots yet"),
            }
            if attempt < self.policy.bot_attempts {
                tokio::time::sleep(self.policy.bot_retry_delay).await;
            }
        }

        warn!("No bot returned a cookie; falling back to QR login");
        self.qr.login().await
    }

    /// Run [`obtain`](Self::obtain) in the background, install the cookie into
    /// `session`, and run the startup validation.
    ///
    /// The receiver yields the installed cookie, or the error that stopped
    /// the bootstrap.
    pub fn spawn(
        self,
        session: Arc<CredentialSession>,
    ) -> oneshot::Receiver<Result<String, CredentialError>> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = self.install(&session).await;
            if let Err(e) = &result {
                error!(error = %e, "Cookie bootstrap failed; publishing stays degraded");
            }
            let _ = tx.send(result);
        });
        rx
    }

    async fn install(&self, session: &CredentialSession) -> Result<String, CredentialError> {
        let cookie = self.obtain().await?;
        session.update_cookie(&cookie)?;
        if let Err(e) = ensure_valid_on_startup(
            session,
            self.bots.as_ref(),
            self.policy.startup_recheck_delay,
        )
        .await
        {
            warn!(error = %e, "Startup validation failed; continuing in degraded mode");
        }
        Ok(cookie)
    }
}
