use std::sync::Arc;
use std::time::Duration;

use onebot_client::OneBotClient;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ConnectionRegistry, OneBotConnection};

/// Keeps the registry in sync with the configured OneBot endpoints.
///
/// Each endpoint is probed with `get_login_info`; a reachable endpoint is
/// registered under the account id it reports, an unreachable one is removed.
pub struct BotSupervisor {
    registry: Arc<ConnectionRegistry>,
    clients: Vec<OneBotClient>,
    probe_interval: Duration,
    call_timeout: Duration,
}

impl BotSupervisor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        clients: Vec<OneBotClient>,
        probe_interval: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            clients,
            probe_interval,
            call_timeout,
        }
    }

    /// Probe every endpoint once. `bound[i]` is the account last seen on endpoint `i`.
    pub async fn probe_once(&self, bound: &mut [Option<i64>]) {
        for (client, slot) in self.clients.iter().zip(bound.iter_mut()) {
            let probe = tokio::time::timeout(self.call_timeout, client.get_login_info()).await;
            match probe {
                Ok(Ok(info)) => {
                    if let Some(previous) = slot.filter(|id| *id != info.user_id) {
                        self.registry.unregister(previous);
                    }
                    if !self.registry.contains(info.user_id) {
                        info!(
                            bot_id = info.user_id,
                            nickname = %info.nickname,
                            endpoint = %client.base_url(),
                            "Bot endpoint online"
                        );
                    }
                    self.registry.register(Arc::new(OneBotConnection::new(
                        info.user_id,
                        info.nickname,
                        client.clone(),
                    )));
                    *slot = Some(info.user_id);
                }
                Ok(Err(e)) => {
                    debug!(endpoint = %client.base_url(), error = %e, "Bot probe failed");
                    if let Some(previous) = slot.take() {
                        warn!(bot_id = previous, error = %e, "Bot endpoint went offline");
                        self.registry.unregister(previous);
                    }
                }
                Err(_) => {
                    if let Some(previous) = slot.take() {
                        warn!(bot_id = previous, timeout = ?self.call_timeout, "Bot probe timed out");
                        self.registry.unregister(previous);
                    }
                }
            }
        }
    }

    /// Probe until cancelled.
    pub async fn run(self, cancellation_token: CancellationToken) {
        if self.clients.is_empty() {
            info!("No bot endpoints configured");
            return;
        }

        let mut bound = vec![None; self.clients.len()];
        let mut interval = tokio::time::interval(self.probe_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("Bot supervisor stopping");
                    return;
                }
                _ = interval.tick() => {
                    self.probe_once(&mut bound).await;
                }
            }
        }
    }
}
