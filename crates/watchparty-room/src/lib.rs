//! Room coordination for watchparty.
//!
//! A room is a shared virtual video player: one host drives playback,
//! members follow along, newcomers wait for the host's approval, abusers
//! get banned, and late joiners receive a drift-corrected position plus
//! the chat history.
//!
//! # Key types
//!
//! - [`RoomStateManager`]: the state machine; the only thing that mutates rooms
//! - [`RoomRegistry`]: owns every live room, one lock per room
//! - [`RoomState`]: membership, playback, chat, playlist of one room
//! - [`Playback`] / [`corrected_time`]: playback clock reconciliation
//! - [`UserLookup`] / [`Broadcaster`]: the capabilities the core consumes
//! - [`RoomConfig`]: capacity, approval policy, playback authority

#![allow(async_fn_in_trait)]

mod capability;
mod config;
mod error;
mod manager;
mod playback;
mod registry;
mod state;

pub use capability::{Broadcaster, InMemoryUsers, Outbound, UserLookup, deliver};
pub use config::{ApprovalPolicy, MemberState, RoomConfig};
pub use error::RoomError;
pub use manager::{JoinOutcome, Reply, RoomStateManager};
pub use playback::{
    Clock, ManualClock, Playback, PlaybackAction, SystemClock, corrected_time,
};
pub use registry::{RoomRegistry, SharedRoom};
pub use state::{Pending, RoomInfo, RoomState};
