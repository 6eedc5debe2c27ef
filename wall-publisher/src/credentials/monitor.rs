//! Session keep-alive.
//!
//! ```text
//! Unknown -> Valid -> Expired -> Refreshing -> Valid
//!                                           -> Expired (until a manual login)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CredentialError, CredentialSession, SessionRefresher, UserInfo};
use crate::notification::AlertSink;

/// Delay before the startup sequence re-validates a rejected cookie.
pub const DEFAULT_STARTUP_RECHECK_DELAY: Duration = Duration::from_millis(500);

/// Validity of the publish session as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unknown,
    Valid,
    Expired,
    Refreshing,
}

/// Consecutive failed checks; alerts on the first failure and every third after it.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive: u32,
}

impl FailureTracker {
    /// Record a failure and report whether it should be alerted.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        (self.consecutive - 1) % 3 == 0
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// Periodically proves the session is usable and repairs it from bots.
pub struct KeepAliveMonitor {
    session: Arc<CredentialSession>,
    refresher: Arc<dyn SessionRefresher>,
    alerts: Arc<dyn AlertSink>,
    interval: Duration,
    state: watch::Sender<SessionState>,
    failures: parking_lot::Mutex<FailureTracker>,
}

impl KeepAliveMonitor {
    /// `interval == 0` disables the periodic loop.
    pub fn new(
        session: Arc<CredentialSession>,
        refresher: Arc<dyn SessionRefresher>,
        alerts: Arc<dyn AlertSink>,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        Self {
            session,
            refresher,
            alerts,
            interval,
            state,
            failures: parking_lot::Mutex::new(FailureTracker::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "Session state changed");
            *current = state;
            true
        });
    }

    /// Run one validation cycle and return the resulting state.
    pub async fn check_once(&self) -> SessionState {
        match self.session.identity_check().await {
            Ok(info) => {
                debug!(uin = info.uin, "Session cookie valid");
                self.mark_valid();
                return SessionState::Valid;
            }
            Err(e) => warn!(error = %e, "Session cookie rejected; refreshing from bots"),
        }

        self.set_state(SessionState::Expired);
        self.set_state(SessionState::Refreshing);

        let outcome = match self.refresher.refresh().await {
            Ok(cookie) => match self.session.update_cookie(&cookie) {
                Ok(_) => self.session.identity_check().await.map(|_| ()),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!(uin = self.session.uin(), "Session restored from bot cookie");
                self.mark_valid();
                SessionState::Valid
            }
            Err(e) => {
                self.set_state(SessionState::Expired);
                let should_alert = self.failures.lock().record_failure();
                if should_alert {
                    self.alerts
                        .alert(&format!(
                            "Publish session expired and could not be refreshed ({e}); please log in again"
                        ))
                        .await;
                }
                SessionState::Expired
            }
        }
    }

    fn mark_valid(&self) {
        self.failures.lock().reset();
        self.set_state(SessionState::Valid);
    }

    /// Check on every interval until cancelled.
    pub async fn run(self: Arc<Self>, cancellation_token: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "Keep-alive monitor started");

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Keep-alive monitor stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.check_once().await;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run), unless the interval is zero.
    pub fn start(self: &Arc<Self>, cancellation_token: CancellationToken) -> Option<JoinHandle<()>> {
        if self.interval.is_zero() {
            info!("Keep-alive monitor disabled");
            return None;
        }
        Some(tokio::spawn(self.clone().run(cancellation_token)))
    }
}

/// One-shot startup validation.
///
/// Validate; on failure wait `recheck_delay` and validate again; if still
/// rejected, refresh once from bots and validate a last time.
pub async fn ensure_valid_on_startup(
    session: &CredentialSession,
    refresher: &dyn SessionRefresher,
    recheck_delay: Duration,
) -> Result<UserInfo, CredentialError> {
    match session.identity_check().await {
        Ok(info) => {
            info!(uin = info.uin, nickname = %info.nickname, "Startup: session cookie valid");
            return Ok(info);
        }
        Err(e) => info!(error = %e, "Startup: session cookie invalid"),
    }

    tokio::time::sleep(recheck_delay).await;
    if let Ok(info) = session.identity_check().await {
        info!(uin = info.uin, "Startup: session became valid on re-check");
        return Ok(info);
    }

    let cookie = refresher.refresh().await?;
    session.update_cookie(&cookie)?;
    let info = session.identity_check().await?;
    info!(uin = info.uin, nickname = %info.nickname, "Startup: session refreshed from bot");
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_schedule() {
        let mut tracker = FailureTracker::default();
        let alerts: Vec<bool> = (0..7).map(|_| tracker.record_failure()).collect();
        assert_eq!(alerts, vec![true, false, false, true, false, false, true]);

        tracker.reset();
        assert_eq!(tracker.consecutive(), 0);
        assert!(tracker.record_failure());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Refreshing.to_string(), "refreshing");
    }
}
