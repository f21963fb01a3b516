//! Unified error type for the watchparty facade.

use watchparty_protocol::ProtocolError;
use watchparty_room::RoomError;

/// Top-level error that wraps the crate-specific errors.
///
/// By the time the adapter returns one of these, the requesting
/// connection has already been sent a `ServerEvent::Error`; the caller
/// only needs to log it.
#[derive(Debug, thiserror::Error)]
pub enum WatchPartyError {
    /// A frame could not be decoded (or an event encoded).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room operation was refused (not host, room full, banned, ...).
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl WatchPartyError {
    /// HTTP-style status code reported to the client.
    pub fn code(&self) -> u16 {
        match self {
            Self::Protocol(_) => 400,
            Self::Room(err) => err.code(),
        }
    }
}
