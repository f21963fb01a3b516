//! `WatchPartyBuilder`: wires a registry, a manager, and a codec together.

use std::sync::Arc;

use watchparty_protocol::JsonCodec;
use watchparty_room::{
    Broadcaster, Clock, RoomConfig, RoomRegistry, RoomStateManager, SystemClock, UserLookup,
};

use crate::WatchParty;

/// Builder for a [`WatchParty`] coordinator.
///
/// # Example
///
/// ```rust
/// use watchparty::prelude::*;
///
/// let users = InMemoryUsers::new().with_user("alice", "Alice");
/// let party = WatchPartyBuilder::new()
///     .room_config(RoomConfig {
///         capacity: 8,
///         ..RoomConfig::default()
///     })
///     .build(users, ChannelBroadcaster::new());
/// assert_eq!(party.manager().config().capacity, 8);
/// ```
pub struct WatchPartyBuilder {
    room_config: RoomConfig,
    clock: Arc<dyn Clock>,
    registry: Option<Arc<RoomRegistry>>,
}

impl WatchPartyBuilder {
    /// Creates a builder with default room settings and the system clock.
    pub fn new() -> Self {
        Self {
            room_config: RoomConfig::default(),
            clock: Arc::new(SystemClock),
            registry: None,
        }
    }

    /// Sets the configuration applied to every room.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Sets the clock used for playback reconciliation and timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Shares an existing registry instead of starting with an empty one.
    pub fn registry(mut self, registry: Arc<RoomRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the coordinator. Uses `JsonCodec` on the wire.
    pub fn build<L, B>(self, users: L, broadcaster: B) -> WatchParty<L, B, JsonCodec>
    where
        L: UserLookup,
        B: Broadcaster,
    {
        let registry = self.registry.unwrap_or_default();
        let manager =
            RoomStateManager::new(registry, users, self.room_config).with_clock(self.clock);

        tracing::debug!(
            capacity = manager.config().capacity,
            approval = ?manager.config().approval,
            "watchparty coordinator built"
        );
        WatchParty::new(manager, broadcaster, JsonCodec)
    }
}

impl Default for WatchPartyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
