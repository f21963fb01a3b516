//! Transport adapter: frames in, events out.
//!
//! The transport owns sockets and identity. For every frame a connection
//! sends it calls [`WatchParty::handle_frame`] with the connection id and
//! the authenticated user, and when the socket goes away it calls
//! [`WatchParty::connection_closed`]. Everything the rooms have to say
//! comes back through the [`Broadcaster`].
//!
//! Refused commands are answered with `ServerEvent::Error { code, message }`
//! on the requesting connection only.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use watchparty_protocol::{
    ClientCommand, Codec, ConnectionId, JsonCodec, ProtocolError, RoomId, ServerEvent,
    UserId,
};
use watchparty_room::{
    Broadcaster, JoinOutcome, Outbound, PlaybackAction, RoomError, RoomStateManager,
    UserLookup, deliver,
};

use crate::WatchPartyError;

/// Rooms a connection may still have a footprint in.
#[derive(Debug)]
struct Session {
    user_id: UserId,
    rooms: HashSet<RoomId>,
}

/// The coordinator as the transport sees it.
///
/// Usually built with [`WatchPartyBuilder`](crate::WatchPartyBuilder).
pub struct WatchParty<L: UserLookup, B: Broadcaster, C: Codec = JsonCodec> {
    manager: RoomStateManager<L>,
    broadcaster: B,
    codec: C,
    sessions: Mutex<HashMap<ConnectionId, Session>>,
}

impl<L, B, C> WatchParty<L, B, C>
where
    L: UserLookup,
    B: Broadcaster,
    C: Codec,
{
    pub fn new(manager: RoomStateManager<L>, broadcaster: B, codec: C) -> Self {
        Self {
            manager,
            broadcaster,
            codec,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn manager(&self) -> &RoomStateManager<L> {
        &self.manager
    }

    pub fn broadcaster(&self) -> &B {
        &self.broadcaster
    }

    /// Serializes an event for the wire with the configured codec.
    pub fn encode_event(&self, event: &ServerEvent) -> Result<Vec<u8>, WatchPartyError> {
        Ok(self.codec.encode(event)?)
    }

    /// Decodes one frame and handles the command in it.
    ///
    /// An undecodable frame is answered with a 400 error event.
    pub async fn handle_frame(
        &self,
        connection: &ConnectionId,
        user_id: &UserId,
        frame: &[u8],
    ) -> Result<(), WatchPartyError> {
        let decoded = if frame.iter().all(u8::is_ascii_whitespace) {
            Err(ProtocolError::InvalidMessage("empty frame".into()))
        } else {
            self.codec.decode(frame)
        };
        let command: ClientCommand = match decoded {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(%connection, %user_id, error = %e, "failed to decode command");
                self.send_error(connection, 400, &format!("invalid command: {e}"));
                return Err(e.into());
            }
        };
        self.handle_command(connection, user_id, command).await
    }

    /// Runs one command and delivers whatever it produced.
    pub async fn handle_command(
        &self,
        connection: &ConnectionId,
        user_id: &UserId,
        command: ClientCommand,
    ) -> Result<(), WatchPartyError> {
        let room_id = command.room_id().clone();

        match self.dispatch(connection, user_id, command).await {
            Ok(outbound) => {
                deliver(&self.broadcaster, &outbound);
                Ok(())
            }
            Err(err) => {
                tracing::debug!(%connection, %user_id, %room_id, error = %err, "command refused");
                self.send_error(connection, err.code(), &err.to_string());
                Err(err.into())
            }
        }
    }

    /// Leaves every room the connection joined or queued for.
    ///
    /// Safe to call more than once; later calls find nothing to do.
    pub async fn connection_closed(&self, connection: &ConnectionId) {
        let removed = self.sessions.lock().remove(connection);
        let Some(session) = removed else {
            return;
        };

        let mut rooms: Vec<RoomId> = session.rooms.into_iter().collect();
        rooms.sort();
        tracing::debug!(%connection, user_id = %session.user_id, rooms = rooms.len(), "connection closed");

        for room_id in rooms {
            match self
                .manager
                .leave_room(&room_id, &session.user_id, connection)
                .await
            {
                Ok(reply) => deliver(&self.broadcaster, &reply.outbound),
                Err(e) => {
                    tracing::warn!(%connection, %room_id, error = %e, "leave on disconnect failed");
                }
            }
        }
    }

    /// Rooms currently tracked for a connection, sorted.
    pub fn tracked_rooms(&self, connection: &ConnectionId) -> Vec<RoomId> {
        let sessions = self.sessions.lock();
        let mut rooms: Vec<RoomId> = sessions
            .get(connection)
            .map(|s| s.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    async fn dispatch(
        &self,
        connection: &ConnectionId,
        user_id: &UserId,
        command: ClientCommand,
    ) -> Result<Vec<Outbound>, RoomError> {
        let manager = &self.manager;

        let outbound = match command {
            ClientCommand::JoinRoom { room_id } => {
                let reply = manager.join_room(&room_id, user_id, connection).await?;
                if reply.outcome.is_admitted() || matches!(reply.outcome, JoinOutcome::NeedsApproval) {
                    self.track(connection, user_id, room_id);
                }
                reply.outbound
            }
            ClientCommand::AcceptUser {
                room_id,
                user_id: target,
            } => manager.accept_user(&room_id, user_id, &target).await?.outbound,
            ClientCommand::RejectUser {
                room_id,
                user_id: target,
            } => {
                let reply = manager.reject_user(&room_id, user_id, &target).await?;
                if !reply.outcome {
                    tracing::debug!(%room_id, user_id = %target, "nobody to reject");
                }
                reply.outbound
            }
            ClientCommand::BanUser {
                room_id,
                user_id: target,
            } => manager.ban_user(&room_id, user_id, &target).await?.outbound,
            ClientCommand::LeaveRoom { room_id } => {
                let reply = manager.leave_room(&room_id, user_id, connection).await?;
                self.untrack(connection, &room_id);
                reply.outbound
            }
            ClientCommand::Play {
                room_id,
                current_time,
            } => {
                manager
                    .update_playback(&room_id, user_id, PlaybackAction::Play(current_time))
                    .await?
                    .outbound
            }
            ClientCommand::Pause {
                room_id,
                current_time,
            } => {
                manager
                    .update_playback(&room_id, user_id, PlaybackAction::Pause(current_time))
                    .await?
                    .outbound
            }
            ClientCommand::Seek {
                room_id,
                current_time,
            } => {
                manager
                    .update_playback(&room_id, user_id, PlaybackAction::Seek(current_time))
                    .await?
                    .outbound
            }
            ClientCommand::SyncTime { room_id } => {
                let sync = manager.playback_sync(&room_id).await?;
                vec![Outbound::unicast(
                    connection.clone(),
                    ServerEvent::SyncVideoState(sync),
                )]
            }
            ClientCommand::SendMessage { room_id, content } => {
                manager.post_message(&room_id, user_id, &content).await?.outbound
            }
            ClientCommand::GetHistory { room_id } => {
                let messages = manager.get_history(&room_id).await;
                vec![Outbound::unicast(
                    connection.clone(),
                    ServerEvent::History { room_id, messages },
                )]
            }
            ClientCommand::AddVideo { room_id, video } => {
                manager.add_video(&room_id, user_id, video).await?.outbound
            }
            ClientCommand::NextVideo { room_id } => {
                manager.advance_playlist_by(&room_id, user_id).await?.outbound
            }
        };

        Ok(outbound)
    }

    fn track(&self, connection: &ConnectionId, user_id: &UserId, room_id: RoomId) {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .entry(connection.clone())
            .or_insert_with(|| Session {
                user_id: user_id.clone(),
                rooms: HashSet::new(),
            });
        session.rooms.insert(room_id);
    }

    fn untrack(&self, connection: &ConnectionId, room_id: &RoomId) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(connection) {
            session.rooms.remove(room_id);
            if session.rooms.is_empty() {
                sessions.remove(connection);
            }
        }
    }

    fn send_error(&self, connection: &ConnectionId, code: u16, message: &str) {
        self.broadcaster.send(
            connection,
            &ServerEvent::Error {
                code,
                message: message.to_owned(),
            },
        );
    }
}
