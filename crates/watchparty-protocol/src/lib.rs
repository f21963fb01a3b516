//! Wire protocol for watchparty.
//!
//! This crate defines the "language" spoken between viewers' clients and
//! the room coordinator:
//!
//! - **Identifiers** ([`UserId`], [`RoomId`], [`ConnectionId`], [`VideoId`])
//! - **Data** ([`UserRef`], [`VideoRef`], [`RoomMessage`], [`PlaybackSync`])
//! - **Commands and events** ([`ClientCommand`], [`ServerEvent`]): what a
//!   client asks for and what the coordinator tells it.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about rooms, locks, or sockets. It is
//! shared by the room core (which produces [`ServerEvent`]s) and the
//! transport adapter (which decodes [`ClientCommand`]s).
//!
//! ```text
//! Transport (bytes) → Protocol (ClientCommand) → Room core → ServerEvent → bytes
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientCommand, ConnectionId, PlaybackSync, RoomId, RoomMessage, ServerEvent,
    UserId, UserRef, VideoId, VideoRef,
};
