//! # watchparty
//!
//! Server-side coordinator for synchronized group viewing.
//!
//! Users gather in rooms around a shared virtual video player. The creator
//! becomes the host and controls playback; newcomers may have to wait for
//! the host's approval; everyone shares a chat history and a playlist; a
//! late joiner lands at the position the group is actually watching.
//!
//! The crate is split in three layers:
//!
//! - `watchparty-protocol`: ids, commands, events, and the wire codec
//! - `watchparty-room`: the room state machine and its capabilities
//! - `watchparty` (this crate): the adapter a transport drives
//!
//! ## Quick Start
//!
//! ```rust
//! use watchparty::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), WatchPartyError> {
//! let broadcaster = ChannelBroadcaster::new();
//! let users = InMemoryUsers::new().with_user("alice", "Alice");
//! let party = WatchPartyBuilder::new().build(users, broadcaster.clone());
//!
//! let conn = ConnectionId::from("conn-1");
//! let mut events = broadcaster.register(conn.clone());
//!
//! party
//!     .handle_frame(
//!         &conn,
//!         &UserId::from("alice"),
//!         br#"{"type":"JoinRoom","room_id":"movie-night"}"#,
//!     )
//!     .await?;
//!
//! assert!(matches!(events.recv().await, Some(ServerEvent::YouAreHost { .. })));
//! # Ok(())
//! # }
//! ```

mod adapter;
mod broadcast;
mod builder;
mod error;
mod telemetry;

pub use adapter::WatchParty;
pub use broadcast::{ChannelBroadcaster, EventSender};
pub use builder::WatchPartyBuilder;
pub use error::WatchPartyError;
pub use telemetry::init_tracing;

pub use watchparty_protocol as protocol;
pub use watchparty_room as room;

pub mod prelude {
    pub use crate::{ChannelBroadcaster, WatchParty, WatchPartyBuilder, WatchPartyError};
    pub use watchparty_protocol::{
        ClientCommand, Codec, ConnectionId, JsonCodec, PlaybackSync, RoomId, RoomMessage,
        ServerEvent, UserId, UserRef, VideoId, VideoRef,
    };
    pub use watchparty_room::{
        ApprovalPolicy, Broadcaster, InMemoryUsers, RoomConfig, RoomError, UserLookup,
    };
}
