//! Room configuration and the per-user membership state machine.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration shared by every room a manager coordinates.
///
/// Override fields with struct-update syntax:
///
/// ```rust
/// use watchparty_room::{ApprovalPolicy, RoomConfig};
///
/// let config = RoomConfig {
///     capacity: 4,
///     approval: ApprovalPolicy::Never,
///     ..RoomConfig::default()
/// };
/// assert!(config.host_only_playback);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Maximum number of members (host included while present).
    pub capacity: usize,

    /// When newcomers must wait for the host to let them in.
    pub approval: ApprovalPolicy,

    /// If `true`, only the host may play, pause, or seek.
    pub host_only_playback: bool,

    /// Longest accepted chat message, in characters.
    pub max_message_len: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            approval: ApprovalPolicy::WhenHostPresent,
            host_only_playback: true,
            max_message_len: 2000,
        }
    }
}

/// Whether a join request is admitted directly or queued for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ApprovalPolicy {
    /// Queue newcomers while the host is present; admit directly otherwise.
    #[default]
    WhenHostPresent,
    /// Always queue newcomers. Requests made while the host is away are
    /// presented when the host reconnects.
    Always,
    /// Admit everyone who isn't banned.
    Never,
}

impl ApprovalPolicy {
    /// Returns `true` if a newcomer must be approved given host presence.
    pub fn requires_approval(self, host_present: bool) -> bool {
        match self {
            Self::WhenHostPresent => host_present,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

// ---------------------------------------------------------------------------
// MemberState
// ---------------------------------------------------------------------------

/// Where a user stands in one room.
///
/// ```text
/// NotInRoom → WaitingApproval → Member → Host
///     │              │             │
///     └──────────────┴─────────────┴──→ Banned (terminal)
/// ```
///
/// The host can never be banned. A host who leaves drops back to
/// `NotInRoom` but keeps the host identity, so rejoining resumes `Host`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberState {
    NotInRoom,
    WaitingApproval,
    Member,
    Host,
    Banned,
}

impl MemberState {
    /// Returns `true` if the user is admitted to the shared session.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Member | Self::Host)
    }

    /// Returns `true` if a ban may be applied from this state.
    pub fn can_be_banned(&self) -> bool {
        matches!(self, Self::NotInRoom | Self::WaitingApproval | Self::Member)
    }
}

impl std::fmt::Display for MemberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInRoom => write!(f, "NotInRoom"),
            Self::WaitingApproval => write!(f, "WaitingApproval"),
            Self::Member => write!(f, "Member"),
            Self::Host => write!(f, "Host"),
            Self::Banned => write!(f, "Banned"),
        }
    }
}
