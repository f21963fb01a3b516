//! The two narrow capabilities the room core depends on.
//!
//! The core never talks to sockets or to the identity subsystem directly.
//! It consumes:
//!
//! - [`UserLookup`]: resolve a `UserId` to a [`UserRef`], and
//! - [`Broadcaster`]: deliver a [`ServerEvent`] to one connection.
//!
//! Manager operations return [`Outbound`] instructions instead of sending
//! anything; the transport adapter hands them to a `Broadcaster` after every
//! room lock has been released.

use std::collections::HashMap;
use std::future::Future;

use watchparty_protocol::{ConnectionId, ServerEvent, UserId, UserRef};

/// Resolves user identities.
///
/// The lookup is async because real identity services live behind a
/// database or an HTTP call. The manager calls it once per join, before
/// taking any lock, so a slow lookup never holds up a room.
///
/// ## Trait bounds explained
///
/// - `Send + Sync + 'static`: the manager that owns the lookup is shared
///   across connection tasks.
/// - The returned future is `Send` so `join_room` can run inside
///   `tokio::spawn`. Writing the method as `async fn` in an impl satisfies
///   this as long as the body holds nothing `!Send` across an `.await`.
///
/// # Example
///
/// ```rust
/// use watchparty_protocol::{UserId, UserRef};
/// use watchparty_room::UserLookup;
///
/// /// Uses the id as the display name. Development only.
/// struct EchoUsers;
///
/// impl UserLookup for EchoUsers {
///     async fn lookup(&self, user_id: &UserId) -> Option<UserRef> {
///         Some(UserRef::new(user_id.clone(), user_id.as_str()))
///     }
/// }
/// ```
pub trait UserLookup: Send + Sync + 'static {
    /// Returns the user, or `None` if the identity subsystem doesn't know
    /// them.
    fn lookup(&self, user_id: &UserId) -> impl Future<Output = Option<UserRef>> + Send;
}

/// Delivers events to connections.
///
/// Implementations must not block: the adapter calls `send` for every
/// recipient of every instruction in turn. Delivery to a connection that
/// is already gone is silently dropped.
///
/// `send` is synchronous on purpose. It is only ever called after every
/// room lock has been released, and the usual implementation pushes onto
/// an unbounded channel that a per-connection writer task drains (see
/// `watchparty::ChannelBroadcaster`).
pub trait Broadcaster: Send + Sync + 'static {
    fn send(&self, connection: &ConnectionId, event: &ServerEvent);
}

/// One delivery instruction: send `event` to every connection in `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: Vec<ConnectionId>,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn unicast(connection: ConnectionId, event: ServerEvent) -> Self {
        Self {
            to: vec![connection],
            event,
        }
    }

    pub fn multicast(connections: Vec<ConnectionId>, event: ServerEvent) -> Self {
        Self {
            to: connections,
            event,
        }
    }
}

/// Hands every instruction to the broadcaster.
pub fn deliver(broadcaster: &impl Broadcaster, outbound: &[Outbound]) {
    for instruction in outbound {
        for connection in &instruction.to {
            broadcaster.send(connection, &instruction.event);
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryUsers
// ---------------------------------------------------------------------------

/// A fixed user directory. Handy for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUsers {
    users: HashMap<UserId, UserRef>,
}

impl InMemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user, builder style.
    pub fn with_user(mut self, id: &str, display_name: &str) -> Self {
        self.insert(UserRef::new(id, display_name));
        self
    }

    pub fn insert(&mut self, user: UserRef) {
        self.users.insert(user.id.clone(), user);
    }
}

impl UserLookup for InMemoryUsers {
    async fn lookup(&self, user_id: &UserId) -> Option<UserRef> {
        self.users.get(user_id).cloned()
    }
}
