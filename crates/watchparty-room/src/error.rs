//! Error types for the room layer.

use watchparty_protocol::{ConnectionId, RoomId, UserId, VideoId};

/// Errors that can occur during room operations.
///
/// Every variant is raised before any mutation, so a failed operation
/// leaves the room exactly as it was.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// The identity subsystem doesn't know this user, or the user is not
    /// waiting where the operation expected them.
    #[error("user {0} not found")]
    UserNotFound(UserId),

    /// A host-only operation was attempted by someone else.
    #[error("user {0} is not the host of room {1}")]
    NotHost(UserId, RoomId),

    /// The room has reached its member capacity.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The user is banned from this room.
    #[error("user {0} is banned from room {1}")]
    Banned(UserId, RoomId),

    /// The user is already admitted.
    #[error("user {0} already in room {1}")]
    AlreadyMember(UserId, RoomId),

    /// The user is not a member of this room.
    #[error("user {0} not in room {1}")]
    NotInRoom(UserId, RoomId),

    /// Chat content was empty or too long.
    #[error("invalid message content: {0}")]
    InvalidContent(String),

    /// A playback position was negative or not a finite number.
    #[error("invalid playback position {0}")]
    InvalidPosition(f64),

    /// The current video is missing from the playlist.
    #[error("current video is not in the playlist of room {0}")]
    InvalidPlaylistPosition(RoomId),

    /// The video is already queued in this room.
    #[error("video {0} already in playlist")]
    DuplicateVideo(VideoId),

    /// The connection is bound to a different user in this room.
    #[error("connection {0} belongs to another user")]
    ConnectionInUse(ConnectionId),
}

impl RoomError {
    /// HTTP-style status code used when reporting the error to a client.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidContent(_) | Self::InvalidPosition(_) => 400,
            Self::NotHost(..) | Self::Banned(..) | Self::NotInRoom(..) => 403,
            Self::RoomNotFound(_) | Self::UserNotFound(_) => 404,
            Self::RoomFull(_)
            | Self::AlreadyMember(..)
            | Self::DuplicateVideo(_)
            | Self::ConnectionInUse(_)
            | Self::InvalidPlaylistPosition(_) => 409,
        }
    }
}
