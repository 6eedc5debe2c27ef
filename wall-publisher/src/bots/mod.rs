//! Inbound bot connections.
//!
//! Every live bot account doubles as a credential source: it can hand out
//! cookies for the publish domain, the current media signing keys, and URLs for
//! the local file tokens it issued. [`BotRegistry::list`] is the only way the
//! rest of the crate enumerates them.

mod onebot;
mod registry;
mod supervisor;

pub use onebot::OneBotConnection;
pub use registry::ConnectionRegistry;
pub use supervisor::BotSupervisor;

use std::sync::Arc;

use async_trait::async_trait;
use onebot_client::OneBotError;

/// Errors from a single bot connection.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("bot {0} is not connected")]
    Disconnected(i64),

    #[error("bot call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("bot returned no {0}")]
    Empty(&'static str),

    #[error(transparent)]
    OneBot(#[from] OneBotError),
}

/// One live inbound bot connection.
#[async_trait]
pub trait BotConnection: Send + Sync {
    /// Account id of the bot.
    fn self_id(&self) -> i64;

    /// Cookie string of the bot account for `domain`.
    async fn get_cookies(&self, domain: &str) -> Result<String, BotError>;

    /// Raw media signing-key payload, in whatever shape the bot produces.
    async fn raw_signature_blob(&self) -> Result<Vec<u8>, BotError>;

    /// Turn a bot-local file token into a fetchable URL.
    async fn resolve_local_token(&self, token: &str) -> Result<String, BotError>;

    async fn send_group_message(&self, group_id: i64, text: &str) -> Result<(), BotError>;
}

/// Source of the currently connected bots.
pub trait BotRegistry: Send + Sync {
    /// Live connections in registration order.
    fn list(&self) -> Vec<Arc<dyn BotConnection>>;
}
