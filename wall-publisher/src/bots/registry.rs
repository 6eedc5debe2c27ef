use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{BotConnection, BotRegistry};

/// Registration-ordered set of live bot connections, keyed by account id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<Vec<Arc<dyn BotConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. A reconnecting account keeps its original position.
    pub fn register(&self, connection: Arc<dyn BotConnection>) {
        let self_id = connection.self_id();
        let mut connections = self.connections.write();
        if let Some(slot) = connections.iter_mut().find(|c| c.self_id() == self_id) {
            *slot = connection;
            return;
        }
        connections.push(connection);
        info!(bot_id = self_id, total = connections.len(), "Bot connection registered");
    }

    /// Remove a connection. Returns whether it was present.
    pub fn unregister(&self, self_id: i64) -> bool {
        let mut connections = self.connections.write();
        let before = connections.len();
        connections.retain(|c| c.self_id() != self_id);
        let removed = connections.len() != before;
        if removed {
            info!(bot_id = self_id, total = connections.len(), "Bot connection removed");
        }
        removed
    }

    pub fn contains(&self, self_id: i64) -> bool {
        self.connections.read().iter().any(|c| c.self_id() == self_id)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

impl BotRegistry for ConnectionRegistry {
    fn list(&self) -> Vec<Arc<dyn BotConnection>> {
        self.connections.read().clone()
    }
}
