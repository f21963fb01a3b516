//! Room registry: the keyed store that owns every live room.
//!
//! # Locking
//!
//! The registry map has one lock; each room has its own. Whenever both
//! are needed the order is always registry → room, and the registry lock
//! is never held while a room operation runs. Operations on different
//! rooms therefore never wait on each other.
//!
//! Removal marks the room closed under its own lock before dropping it
//! from the map. A joiner that fetched the handle just before removal
//! will see `is_closed()` once it gets the lock and must come back here,
//! so a concurrent join can never land in a room nobody can reach.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use watchparty_protocol::{ConnectionId, RoomId, UserRef};

use crate::RoomState;

/// A room behind its exclusive lock.
pub type SharedRoom = Arc<Mutex<RoomState>>;

/// Thread-safe mapping `RoomId → RoomState`.
///
/// Construct one per process (or per test) and hand it to the
/// [`RoomStateManager`](crate::RoomStateManager). There is no global
/// instance: two registries are two independent worlds, which is what
/// lets every test start from a clean slate.
///
/// ## Why two levels of locking?
///
/// The outer map lock is held only long enough to look up, insert, or
/// remove a handle. It never covers a room operation, so a slow join in
/// one room cannot stall a chat message in another.
///
/// Each [`SharedRoom`] carries its own `tokio::sync::Mutex`. The async
/// mutex is async (rather than blocking) because the
/// registry holds the map lock while it awaits a room lock in
/// [`remove_if_empty`](Self::remove_if_empty), and a blocking lock there
/// would park a runtime worker thread.
///
/// ## Creation and removal
///
/// - [`get_or_create`](Self::get_or_create) is atomic: under concurrent
///   first joins exactly one caller sees `created == true` and becomes host.
/// - [`remove_if_empty`](Self::remove_if_empty) re-checks emptiness under
///   the room lock, so a user who joined between the caller's check and
///   the removal keeps the room alive.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, SharedRoom>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the room, creating it with `creator` as host if it doesn't
    /// exist. The flag is `true` only for the caller that created it.
    pub async fn get_or_create(
        &self,
        room_id: &RoomId,
        creator: &UserRef,
        connection: &ConnectionId,
        now_millis: u64,
    ) -> (SharedRoom, bool) {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(room_id) {
            return (Arc::clone(room), false);
        }

        let room = Arc::new(Mutex::new(RoomState::new(
            room_id.clone(),
            creator.clone(),
            connection.clone(),
            now_millis,
        )));
        rooms.insert(room_id.clone(), Arc::clone(&room));
        tracing::info!(%room_id, host = %creator.id, "room created");
        (room, true)
    }

    /// Returns the room if it exists.
    pub async fn try_get(&self, room_id: &RoomId) -> Option<SharedRoom> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    /// Removes the room iff it is empty right now.
    ///
    /// Returns the connections that were still waiting for approval when
    /// the room was removed, or `None` if nothing was removed.
    pub async fn remove_if_empty(&self, room_id: &RoomId) -> Option<Vec<ConnectionId>> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.get(room_id).cloned()?;

        let mut state = room.lock().await;
        if !state.is_empty() {
            return None;
        }
        let orphaned = state.close();
        drop(state);

        rooms.remove(room_id);
        tracing::info!(%room_id, orphaned = orphaned.len(), "room removed");
        Some(orphaned)
    }

    /// Returns the number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Lists live room ids, sorted.
    pub async fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
