//! Core protocol types for watchparty's wire format.
//!
//! Everything in this module travels "on the wire": it gets serialized,
//! sent to a viewer's client, and deserialized on the other side (or the
//! reverse for [`ClientCommand`]).

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Declares a string newtype identifier.
///
/// Each id is a distinct type so a `RoomId` can never be passed where a
/// `UserId` is expected, even though both are strings underneath.
/// `#[serde(transparent)]` keeps the JSON form a bare string.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// A stable user identity, issued by the identity subsystem.
    UserId
);

string_id!(
    /// A room's stable identifier. Rooms are named by their creators
    /// (e.g. a share code), not allocated by the server.
    RoomId
);

string_id!(
    /// An opaque transport connection handle. One user may reconnect under
    /// a new connection id; the room always tracks the latest one.
    ConnectionId
);

string_id!(
    /// Identifies a video in a room's playlist.
    VideoId
);

// ---------------------------------------------------------------------------
// Data carried inside events
// ---------------------------------------------------------------------------

/// A resolved user: identity plus the name shown to other viewers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub display_name: String,
}

impl UserRef {
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A playlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    pub id: VideoId,
    pub title: String,
}

impl VideoRef {
    pub fn new(id: impl Into<VideoId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// A chat message stored in a room's replayable history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMessage {
    pub sender: UserRef,
    pub content: String,
    /// Server-assigned timestamp, Unix milliseconds.
    pub sent_at: u64,
}

/// The playback position a client should jump to.
///
/// `current_time` is already drift-corrected: the server added the wall
/// clock time elapsed since the host last touched the player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSync {
    /// Position in seconds.
    pub current_time: f64,
    pub is_playing: bool,
}

// ---------------------------------------------------------------------------
// ClientCommand: what clients ask for
// ---------------------------------------------------------------------------

/// A command sent by a client.
///
/// The sender's identity is not part of the command: the transport knows
/// which authenticated user owns each connection and passes it alongside.
///
/// `#[serde(tag = "type")]` produces the "internally tagged" JSON form:
/// `{ "type": "Play", "room_id": "r1", "current_time": 12.0 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    JoinRoom { room_id: RoomId },
    AcceptUser { room_id: RoomId, user_id: UserId },
    RejectUser { room_id: RoomId, user_id: UserId },
    BanUser { room_id: RoomId, user_id: UserId },
    LeaveRoom { room_id: RoomId },
    Play { room_id: RoomId, current_time: f64 },
    Pause { room_id: RoomId, current_time: f64 },
    Seek { room_id: RoomId, current_time: f64 },
    /// Ask for a fresh drift-corrected position.
    SyncTime { room_id: RoomId },
    SendMessage { room_id: RoomId, content: String },
    GetHistory { room_id: RoomId },
    AddVideo { room_id: RoomId, video: VideoRef },
    NextVideo { room_id: RoomId },
}

impl ClientCommand {
    /// Every command targets exactly one room.
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::JoinRoom { room_id }
            | Self::AcceptUser { room_id, .. }
            | Self::RejectUser { room_id, .. }
            | Self::BanUser { room_id, .. }
            | Self::LeaveRoom { room_id }
            | Self::Play { room_id, .. }
            | Self::Pause { room_id, .. }
            | Self::Seek { room_id, .. }
            | Self::SyncTime { room_id }
            | Self::SendMessage { room_id, .. }
            | Self::GetHistory { room_id }
            | Self::AddVideo { room_id, .. }
            | Self::NextVideo { room_id } => room_id,
        }
    }
}

// ---------------------------------------------------------------------------
// ServerEvent: what the coordinator tells clients
// ---------------------------------------------------------------------------

/// An event delivered to one or more connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    // -- Admission --
    /// You created the room, or resumed it as its host.
    YouAreHost { room_id: RoomId },
    JoinedToRoom { room_id: RoomId },
    /// Where the shared player is right now. Only ever unicast.
    SyncVideoState(PlaybackSync),
    /// Your join request is queued for the host's decision.
    NeedsApproval { room_id: RoomId },
    /// Host only: someone is waiting to be let in.
    ApprovalRequested { room_id: RoomId, user: UserRef },
    Rejected { room_id: RoomId },
    RoomFull { room_id: RoomId },

    // -- Presence --
    HostInRoom { host: UserRef },
    HostLeftRoom { host: UserRef },
    UserJoined { user: UserRef },
    UserLeft { user: UserRef },
    LeavedRoom { room_id: RoomId },
    /// The room was torn down while you were still waiting for approval.
    RoomClosed { room_id: RoomId },

    // -- Playback --
    ReceivePlay { current_time: f64 },
    ReceivePause { current_time: f64 },
    ReceiveSeek { current_time: f64 },
    PlaylistUpdated { playlist: Vec<VideoRef> },
    VideoChanged { video: VideoRef },

    // -- Chat --
    ReceiveMessage { message: RoomMessage },
    History { room_id: RoomId, messages: Vec<RoomMessage> },

    // -- Errors --
    /// `code` follows HTTP-style conventions (403 = not allowed,
    /// 404 = not found, 409 = conflict, ...).
    Error { code: u16, message: String },
}
