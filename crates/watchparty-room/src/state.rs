//! The per-room aggregate: membership, approval queue, bans, playback, chat.
//!
//! A `RoomState` is owned by the [`RoomRegistry`](crate::RoomRegistry)
//! behind its own mutex and mutated only by the
//! [`RoomStateManager`](crate::RoomStateManager). The read accessors are
//! public so callers holding the lock (tests, diagnostics) can inspect it.

use std::collections::{HashMap, HashSet};

use watchparty_protocol::{
    ConnectionId, PlaybackSync, RoomId, RoomMessage, UserId, UserRef, VideoId,
    VideoRef,
};

use crate::{MemberState, Playback};

/// A user queued for the host's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub user: UserRef,
    pub connection: ConnectionId,
}

/// A snapshot of room metadata, safe to hand out without the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub host: UserRef,
    pub host_present: bool,
    pub member_count: usize,
    pub waiting_count: usize,
    pub banned_count: usize,
    pub playback: PlaybackSync,
    pub current_video: Option<VideoRef>,
}

/// Everything the server knows about one room.
#[derive(Debug)]
pub struct RoomState {
    pub(crate) room_id: RoomId,
    pub(crate) host: UserRef,
    pub(crate) host_connection: ConnectionId,
    pub(crate) host_present: bool,
    /// Admitted users. The host is in here exactly while present.
    pub(crate) members: HashMap<UserId, UserRef>,
    /// The live connection of each member.
    pub(crate) connections: HashMap<UserId, ConnectionId>,
    pub(crate) waiting: HashMap<UserId, Pending>,
    pub(crate) banned: HashSet<UserId>,
    pub(crate) messages: Vec<RoomMessage>,
    pub(crate) playlist: Vec<VideoRef>,
    pub(crate) current_video: Option<VideoId>,
    pub(crate) playback: Playback,
    /// Set once the registry drops the room. Anyone still holding the
    /// handle must go back to the registry.
    pub(crate) closed: bool,
}

impl RoomState {
    /// Creates a room with `host` as its first and only member.
    pub fn new(
        room_id: RoomId,
        host: UserRef,
        connection: ConnectionId,
        now_millis: u64,
    ) -> Self {
        let mut members = HashMap::new();
        members.insert(host.id.clone(), host.clone());
        let mut connections = HashMap::new();
        connections.insert(host.id.clone(), connection.clone());

        Self {
            room_id,
            host,
            host_connection: connection,
            host_present: true,
            members,
            connections,
            waiting: HashMap::new(),
            banned: HashSet::new(),
            messages: Vec::new(),
            playlist: Vec::new(),
            current_video: None,
            playback: Playback::new(now_millis),
            closed: false,
        }
    }

    // -- Reads --

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn host(&self) -> &UserRef {
        &self.host
    }

    pub fn host_connection(&self) -> &ConnectionId {
        &self.host_connection
    }

    pub fn is_host_present(&self) -> bool {
        self.host_present
    }

    pub fn is_host(&self, user_id: &UserId) -> bool {
        self.host.id == *user_id
    }

    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.members.contains_key(user_id)
    }

    pub fn is_waiting(&self, user_id: &UserId) -> bool {
        self.waiting.contains_key(user_id)
    }

    pub fn is_banned(&self, user_id: &UserId) -> bool {
        self.banned.contains(user_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Member ids, sorted for stable output.
    pub fn member_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.members.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn connection_of(&self, user_id: &UserId) -> Option<&ConnectionId> {
        self.connections.get(user_id)
    }

    pub fn messages(&self) -> &[RoomMessage] {
        &self.messages
    }

    pub fn playlist(&self) -> &[VideoRef] {
        &self.playlist
    }

    pub fn current_video(&self) -> Option<&VideoRef> {
        let id = self.current_video.as_ref()?;
        self.playlist.iter().find(|v| v.id == *id)
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    /// Where `user_id` stands in this room.
    pub fn member_state(&self, user_id: &UserId) -> MemberState {
        if self.banned.contains(user_id) {
            MemberState::Banned
        } else if self.host_present && self.is_host(user_id) {
            MemberState::Host
        } else if self.members.contains_key(user_id) {
            MemberState::Member
        } else if self.waiting.contains_key(user_id) {
            MemberState::WaitingApproval
        } else {
            MemberState::NotInRoom
        }
    }

    /// The user currently bound to `connection`, member or waiting.
    pub fn connection_owner(&self, connection: &ConnectionId) -> Option<&UserId> {
        self.connections
            .iter()
            .find(|(_, c)| *c == connection)
            .map(|(u, _)| u)
            .or_else(|| {
                self.waiting
                    .iter()
                    .find(|(_, p)| p.connection == *connection)
                    .map(|(u, _)| u)
            })
    }

    /// Live member connections, optionally skipping one user.
    pub fn member_connections(&self, except: Option<&UserId>) -> Vec<ConnectionId> {
        let mut conns: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(user, _)| Some(*user) != except)
            .map(|(_, conn)| conn.clone())
            .collect();
        conns.sort();
        conns
    }

    /// A room with nobody admitted and no host is ready for removal.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && !self.host_present
    }

    /// Checks the structural invariants every operation must preserve.
    pub fn invariants_hold(&self) -> bool {
        let disjoint = self.members.keys().all(|u| !self.banned.contains(u))
            && self.waiting.keys().all(|u| !self.banned.contains(u))
            && self.waiting.keys().all(|u| !self.members.contains_key(u));

        let mut seen = HashSet::new();
        let unique_connections = self
            .connections
            .values()
            .chain(self.waiting.values().map(|p| &p.connection))
            .all(|c| seen.insert(c));

        let host_member = !self.host_present || self.members.contains_key(&self.host.id);
        let bound = self.connections.keys().all(|u| self.members.contains_key(u));

        disjoint && unique_connections && host_member && bound
    }

    pub fn info(&self, now_millis: u64) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id.clone(),
            host: self.host.clone(),
            host_present: self.host_present,
            member_count: self.members.len(),
            waiting_count: self.waiting.len(),
            banned_count: self.banned.len(),
            playback: self.playback.sync(now_millis),
            current_video: self.current_video().cloned(),
        }
    }

    // -- Mutations (manager only) --

    /// Admits `user` under `connection`, replacing any previous binding.
    pub(crate) fn admit(&mut self, user: UserRef, connection: ConnectionId) {
        self.waiting.remove(&user.id);
        if self.is_host(&user.id) {
            self.host_present = true;
            self.host_connection = connection.clone();
        }
        self.connections.insert(user.id.clone(), connection);
        self.members.insert(user.id.clone(), user);
    }

    /// Removes `user_id` from members and connections. Returns the removed
    /// user, if they were a member.
    pub(crate) fn evict(&mut self, user_id: &UserId) -> Option<UserRef> {
        self.connections.remove(user_id);
        let user = self.members.remove(user_id);
        if self.is_host(user_id) {
            self.host_present = false;
        }
        user
    }

    /// Bans `user_id`, dropping every other claim they had on the room.
    pub(crate) fn ban(&mut self, user_id: &UserId) {
        self.evict(user_id);
        self.waiting.remove(user_id);
        self.banned.insert(user_id.clone());
    }

    /// Marks the room closed and hands back the connections that were
    /// still waiting for approval.
    pub(crate) fn close(&mut self) -> Vec<ConnectionId> {
        self.closed = true;
        let mut conns: Vec<ConnectionId> =
            self.waiting.drain().map(|(_, p)| p.connection).collect();
        conns.sort();
        conns
    }
}
