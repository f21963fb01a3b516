//! A [`Broadcaster`] backed by one Tokio channel per connection.
//!
//! The transport registers each accepted connection and forwards whatever
//! arrives on the returned receiver to its socket. Delivery never blocks:
//! the channels are unbounded and a closed receiver just drops the event.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use watchparty_protocol::{ConnectionId, ServerEvent};
use watchparty_room::Broadcaster;

/// Channel sender for delivering events to one connection.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Routes events to per-connection channels.
///
/// Cheap to clone; clones share the same connection table.
#[derive(Debug, Clone, Default)]
pub struct ChannelBroadcaster {
    connections: Arc<RwLock<HashMap<ConnectionId, EventSender>>>,
}

impl ChannelBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns the stream of events for it.
    /// Registering the same id again replaces the previous channel.
    pub fn register(&self, connection: ConnectionId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().insert(connection, tx);
        rx
    }

    pub fn unregister(&self, connection: &ConnectionId) {
        self.connections.write().remove(connection);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn send(&self, connection: &ConnectionId, event: &ServerEvent) {
        let connections = self.connections.read();
        match connections.get(connection) {
            Some(tx) => {
                if tx.send(event.clone()).is_err() {
                    tracing::trace!(%connection, "receiver dropped, event discarded");
                }
            }
            None => tracing::trace!(%connection, "unknown connection, event discarded"),
        }
    }
}
