//! Operator alerts.
//!
//! Alerts are best-effort: a sink logs delivery failures and never returns
//! them, so callers can alert from any error path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::bots::BotRegistry;

/// Destination for operator-facing alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Sink name for logs.
    fn sink_type(&self) -> &'static str;

    async fn alert(&self, text: &str);
}

/// Writes alerts to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlert;

#[async_trait]
impl AlertSink for LogAlert {
    fn sink_type(&self) -> &'static str {
        "log"
    }

    async fn alert(&self, text: &str) {
        warn!(alert = %text, "Operator alert");
    }
}

/// Sends alerts to the management group through the first bot that accepts.
pub struct BotGroupAlert {
    bots: Arc<dyn BotRegistry>,
    group_id: i64,
    call_timeout: Duration,
}

impl BotGroupAlert {
    pub fn new(bots: Arc<dyn BotRegistry>, group_id: i64, call_timeout: Duration) -> Self {
        Self {
            bots,
            group_id,
            call_timeout,
        }
    }

    /// A group id of zero or less disables delivery.
    pub fn is_enabled(&self) -> bool {
        self.group_id > 0
    }
}

#[async_trait]
impl AlertSink for BotGroupAlert {
    fn sink_type(&self) -> &'static str {
        "bot_group"
    }

    async fn alert(&self, text: &str) {
        warn!(alert = %text, group_id = self.group_id, "Operator alert");
        if !self.is_enabled() {
            return;
        }

        for bot in self.bots.list() {
            let bot_id = bot.self_id();
            match tokio::time::timeout(
                self.call_timeout,
                bot.send_group_message(self.group_id, text),
            )
            .await
            {
                Ok(Ok(())) => {
                    debug!(bot_id, group_id = self.group_id, "Alert delivered");
                    return;
                }
                Ok(Err(e)) => debug!(bot_id, error = %e, "Alert delivery failed"),
                Err(_) => debug!(bot_id, "Alert delivery timed out"),
            }
        }
        warn!(group_id = self.group_id, "No bot could deliver the alert");
    }
}
