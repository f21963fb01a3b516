//! Room state manager: the only entry point that mutates rooms.
//!
//! Every operation follows the same shape:
//!
//! 1. Resolve the room through the [`RoomRegistry`] (registry lock, brief).
//! 2. Take that room's lock for the rest of the operation.
//! 3. Check every precondition, and only then mutate.
//! 4. Return a [`Reply`]: the typed outcome plus the [`Outbound`]
//!    instructions the caller delivers *after* the lock is gone.
//!
//! Nothing here performs I/O besides the user lookup, which happens before
//! any lock is taken.

use std::sync::Arc;

use watchparty_protocol::{
    ConnectionId, PlaybackSync, RoomId, RoomMessage, ServerEvent, UserId, UserRef,
    VideoRef,
};

use crate::registry::SharedRoom;
use crate::state::Pending;
use crate::{
    Clock, Outbound, PlaybackAction, RoomConfig, RoomError, RoomInfo, RoomRegistry,
    RoomState, SystemClock, UserLookup,
};

/// The result of a manager operation plus what to tell whom.
///
/// `outcome` is for the caller (the adapter, or a test). `outbound` lists
/// the events to deliver, with recipients already resolved to concrete
/// connections while the room lock was held. Handing them to a
/// [`Broadcaster`](crate::Broadcaster) afterwards means no socket write
/// ever happens under a room lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub outcome: T,
    pub outbound: Vec<Outbound>,
}

impl<T> Reply<T> {
    fn new(outcome: T, outbound: Vec<Outbound>) -> Self {
        Self { outcome, outbound }
    }

    /// An outcome nobody needs to hear about.
    fn silent(outcome: T) -> Self {
        Self::new(outcome, Vec::new())
    }
}

/// How a join request was resolved.
///
/// The admitted variants carry the drift-corrected playback position for
/// the joining connection. It is delivered to that connection only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinOutcome {
    /// The room didn't exist; the joiner is now its host.
    Created(PlaybackSync),
    /// The host came back and resumed control without approval.
    HostReconnected(PlaybackSync),
    Accepted(PlaybackSync),
    /// Queued for the host's decision. Not a member yet.
    NeedsApproval,
    /// Banned from this room.
    Rejected,
    RoomIsFull,
}

impl JoinOutcome {
    /// Returns `true` if the joiner is now a member.
    pub fn is_admitted(&self) -> bool {
        self.sync().is_some()
    }

    /// The playback position to hand the joiner, if admitted.
    pub fn sync(&self) -> Option<PlaybackSync> {
        match *self {
            Self::Created(sync) | Self::HostReconnected(sync) | Self::Accepted(sync) => {
                Some(sync)
            }
            Self::NeedsApproval | Self::Rejected | Self::RoomIsFull => None,
        }
    }
}

/// Coordinates membership, playback, chat, and playlists across rooms.
pub struct RoomStateManager<L: UserLookup> {
    registry: Arc<RoomRegistry>,
    users: L,
    config: RoomConfig,
    clock: Arc<dyn Clock>,
}

impl<L: UserLookup> RoomStateManager<L> {
    /// Creates a manager over `registry`, reading the system clock.
    pub fn new(registry: Arc<RoomRegistry>, users: L, config: RoomConfig) -> Self {
        Self {
            registry,
            users,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock (e.g. with a [`ManualClock`](crate::ManualClock)).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Asks to enter `room_id`, creating it if needed.
    ///
    /// Precedence: ban → creation → host reconnect → rejoin by a member →
    /// capacity → approval gate → admission.
    ///
    /// A user already in the approval queue goes through the same capacity
    /// and approval checks as a newcomer. If the room no longer requires
    /// approval (say the host has left) they are admitted directly.
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        connection: &ConnectionId,
    ) -> Result<Reply<JoinOutcome>, RoomError> {
        let user = self.resolve(user_id).await?;

        loop {
            let now = self.now();
            let (room, created) = self
                .registry
                .get_or_create(room_id, &user, connection, now)
                .await;
            let mut state = room.lock().await;

            // Removed between lookup and lock: the registry no longer
            // knows this handle, so start over.
            if state.is_closed() {
                continue;
            }

            let reply = if created {
                let sync = state.playback.sync(now);
                Reply::new(
                    JoinOutcome::Created(sync),
                    vec![
                        Outbound::unicast(
                            connection.clone(),
                            ServerEvent::YouAreHost {
                                room_id: room_id.clone(),
                            },
                        ),
                        Outbound::unicast(connection.clone(), ServerEvent::SyncVideoState(sync)),
                    ],
                )
            } else {
                self.join_existing(&mut state, user, connection, now)?
            };

            audit(&state);
            tracing::info!(
                %room_id,
                %user_id,
                %connection,
                outcome = ?reply.outcome,
                members = state.member_count(),
                "join resolved"
            );
            return Ok(reply);
        }
    }

    fn join_existing(
        &self,
        state: &mut RoomState,
        user: UserRef,
        connection: &ConnectionId,
        now: u64,
    ) -> Result<Reply<JoinOutcome>, RoomError> {
        let room_id = state.room_id.clone();

        if state.is_banned(&user.id) {
            return Ok(Reply::new(
                JoinOutcome::Rejected,
                vec![Outbound::unicast(
                    connection.clone(),
                    ServerEvent::Rejected { room_id },
                )],
            ));
        }

        if let Some(owner) = state.connection_owner(connection) {
            if *owner != user.id {
                return Err(RoomError::ConnectionInUse(connection.clone()));
            }
        }

        if state.is_host(&user.id) && !state.host_present {
            state.admit(user.clone(), connection.clone());
            let sync = state.playback.sync(now);

            let mut outbound = vec![
                Outbound::unicast(
                    connection.clone(),
                    ServerEvent::YouAreHost {
                        room_id: room_id.clone(),
                    },
                ),
                Outbound::unicast(connection.clone(), ServerEvent::SyncVideoState(sync)),
                Outbound::multicast(
                    state.member_connections(Some(&user.id)),
                    ServerEvent::HostInRoom { host: user },
                ),
            ];
            // Requests that piled up while the host was away.
            let mut pending: Vec<&Pending> = state.waiting.values().collect();
            pending.sort_by(|a, b| a.user.id.cmp(&b.user.id));
            outbound.extend(pending.into_iter().map(|p| {
                Outbound::unicast(
                    connection.clone(),
                    ServerEvent::ApprovalRequested {
                        room_id: room_id.clone(),
                        user: p.user.clone(),
                    },
                )
            }));

            return Ok(Reply::new(JoinOutcome::HostReconnected(sync), outbound));
        }

        if state.is_member(&user.id) {
            // Same user, fresh connection: rebind and resync.
            let greeting = if state.is_host(&user.id) {
                ServerEvent::YouAreHost { room_id }
            } else {
                ServerEvent::JoinedToRoom { room_id }
            };
            state.admit(user, connection.clone());
            let sync = state.playback.sync(now);
            return Ok(Reply::new(
                JoinOutcome::Accepted(sync),
                vec![
                    Outbound::unicast(connection.clone(), greeting),
                    Outbound::unicast(connection.clone(), ServerEvent::SyncVideoState(sync)),
                ],
            ));
        }

        // Everyone below is neither host nor member, queued or not.
        if state.member_count() >= self.config.capacity {
            return Ok(Reply::new(
                JoinOutcome::RoomIsFull,
                vec![Outbound::unicast(
                    connection.clone(),
                    ServerEvent::RoomFull { room_id },
                )],
            ));
        }

        if self.config.approval.requires_approval(state.host_present) {
            // Already queued: keep the place, follow the new connection.
            if let Some(pending) = state.waiting.get_mut(&user.id) {
                pending.connection = connection.clone();
                return Ok(Reply::new(
                    JoinOutcome::NeedsApproval,
                    vec![Outbound::unicast(
                        connection.clone(),
                        ServerEvent::NeedsApproval { room_id },
                    )],
                ));
            }

            state.waiting.insert(
                user.id.clone(),
                Pending {
                    user: user.clone(),
                    connection: connection.clone(),
                },
            );
            let mut outbound = vec![Outbound::unicast(
                connection.clone(),
                ServerEvent::NeedsApproval {
                    room_id: room_id.clone(),
                },
            )];
            if state.host_present {
                outbound.push(Outbound::unicast(
                    state.host_connection.clone(),
                    ServerEvent::ApprovalRequested { room_id, user },
                ));
            }
            return Ok(Reply::new(JoinOutcome::NeedsApproval, outbound));
        }

        state.admit(user.clone(), connection.clone());
        let sync = state.playback.sync(now);
        Ok(Reply::new(
            JoinOutcome::Accepted(sync),
            vec![
                Outbound::unicast(connection.clone(), ServerEvent::JoinedToRoom { room_id }),
                Outbound::unicast(connection.clone(), ServerEvent::SyncVideoState(sync)),
                Outbound::multicast(
                    state.member_connections(Some(&user.id)),
                    ServerEvent::UserJoined { user },
                ),
            ],
        ))
    }

    /// Host lets a queued user in. The outcome is the user's corrected
    /// playback position.
    ///
    /// Fails with `Banned` if the target was banned after queueing,
    /// `AlreadyMember` if they got in some other way (e.g. rejoined while
    /// the host was away), and `RoomFull` if the room filled up meanwhile.
    pub async fn accept_user(
        &self,
        room_id: &RoomId,
        requesting_host: &UserId,
        target: &UserId,
    ) -> Result<Reply<PlaybackSync>, RoomError> {
        let room = self.open_room(room_id).await?;
        let mut state = room.lock().await;
        ensure_open(&state)?;
        ensure_host(&state, requesting_host)?;
        if state.is_banned(target) {
            return Err(RoomError::Banned(target.clone(), room_id.clone()));
        }
        if state.is_member(target) {
            return Err(RoomError::AlreadyMember(target.clone(), room_id.clone()));
        }

        let pending = state
            .waiting
            .get(target)
            .cloned()
            .ok_or_else(|| RoomError::UserNotFound(target.clone()))?;
        if state.member_count() >= self.config.capacity {
            return Err(RoomError::RoomFull(room_id.clone()));
        }

        state.admit(pending.user.clone(), pending.connection.clone());
        let sync = state.playback.sync(self.now());
        let outbound = vec![
            Outbound::unicast(
                pending.connection.clone(),
                ServerEvent::JoinedToRoom {
                    room_id: room_id.clone(),
                },
            ),
            Outbound::unicast(pending.connection.clone(), ServerEvent::SyncVideoState(sync)),
            Outbound::multicast(
                state.member_connections(Some(target)),
                ServerEvent::UserJoined { user: pending.user },
            ),
        ];

        audit(&state);
        tracing::info!(%room_id, user_id = %target, "user accepted");
        Ok(Reply::new(sync, outbound))
    }

    /// Host turns a queued user away. The user is banned from the room, so
    /// they can't simply queue again.
    ///
    /// Returns `false` (and changes nothing) if the room is gone, the
    /// requester isn't the present host, or the target isn't waiting.
    pub async fn reject_user(
        &self,
        room_id: &RoomId,
        requesting_host: &UserId,
        target: &UserId,
    ) -> Result<Reply<bool>, RoomError> {
        let Some(room) = self.registry.try_get(room_id).await else {
            return Ok(Reply::silent(false));
        };
        let mut state = room.lock().await;
        if state.is_closed() {
            return Ok(Reply::silent(false));
        }
        if ensure_host(&state, requesting_host).is_err() {
            tracing::debug!(%room_id, user_id = %requesting_host, "reject by non-host ignored");
            return Ok(Reply::silent(false));
        }

        let Some(pending) = state.waiting.remove(target) else {
            return Ok(Reply::silent(false));
        };
        state.banned.insert(target.clone());

        audit(&state);
        tracing::info!(%room_id, user_id = %target, "user rejected");
        Ok(Reply::new(
            true,
            vec![Outbound::unicast(
                pending.connection,
                ServerEvent::Rejected {
                    room_id: room_id.clone(),
                },
            )],
        ))
    }

    /// Host bans a user (member, queued, or not yet seen) for the rest of
    /// the room's life. Banning the host, or someone already banned, does
    /// nothing.
    pub async fn ban_user(
        &self,
        room_id: &RoomId,
        requesting_host: &UserId,
        target: &UserId,
    ) -> Result<Reply<()>, RoomError> {
        let room = self.open_room(room_id).await?;
        let mut state = room.lock().await;
        ensure_open(&state)?;
        ensure_host(&state, requesting_host)?;

        let standing = state.member_state(target);
        if !standing.can_be_banned() || state.is_host(target) {
            tracing::debug!(%room_id, user_id = %target, %standing, "ban ignored");
            return Ok(Reply::silent(()));
        }

        let connection = state
            .connection_of(target)
            .cloned()
            .or_else(|| state.waiting.get(target).map(|p| p.connection.clone()));
        let evicted = state.members.get(target).cloned();
        state.ban(target);

        let mut outbound = Vec::new();
        if let Some(connection) = connection {
            outbound.push(Outbound::unicast(
                connection,
                ServerEvent::Rejected {
                    room_id: room_id.clone(),
                },
            ));
        }
        if let Some(user) = evicted {
            outbound.push(Outbound::multicast(
                state.member_connections(None),
                ServerEvent::UserLeft { user },
            ));
        }

        audit(&state);
        tracing::info!(%room_id, user_id = %target, "user banned");
        Ok(Reply::new((), outbound))
    }

    /// Leaves the room from `connection`.
    ///
    /// Unknown rooms and stale connections (the user has since rejoined
    /// elsewhere) are ignored. A departing host keeps the host identity and
    /// may come back. The room is removed once nobody is left.
    pub async fn leave_room(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        connection: &ConnectionId,
    ) -> Result<Reply<()>, RoomError> {
        let Some(room) = self.registry.try_get(room_id).await else {
            return Ok(Reply::silent(()));
        };

        let (mut outbound, empty) = {
            let mut state = room.lock().await;
            if state.is_closed() {
                return Ok(Reply::silent(()));
            }

            let left = Outbound::unicast(
                connection.clone(),
                ServerEvent::LeavedRoom {
                    room_id: room_id.clone(),
                },
            );
            let mut outbound = Vec::new();

            let queued_here = state
                .waiting
                .get(user_id)
                .is_some_and(|p| p.connection == *connection);
            if queued_here {
                state.waiting.remove(user_id);
                outbound.push(left);
            } else if state.connection_of(user_id) == Some(connection) {
                let user = state
                    .evict(user_id)
                    .unwrap_or_else(|| UserRef::new(user_id.clone(), user_id.as_str()));
                let notice = if state.is_host(user_id) {
                    ServerEvent::HostLeftRoom { host: user }
                } else {
                    ServerEvent::UserLeft { user }
                };
                outbound.push(left);
                outbound.push(Outbound::multicast(state.member_connections(None), notice));
            } else {
                tracing::debug!(%room_id, %user_id, %connection, "stale leave ignored");
                return Ok(Reply::silent(()));
            }

            audit(&state);
            tracing::info!(
                %room_id,
                %user_id,
                members = state.member_count(),
                host_present = state.is_host_present(),
                "user left"
            );
            (outbound, state.is_empty())
        };

        if empty {
            if let Some(orphaned) = self.registry.remove_if_empty(room_id).await {
                outbound.push(Outbound::multicast(
                    orphaned,
                    ServerEvent::RoomClosed {
                        room_id: room_id.clone(),
                    },
                ));
            }
        }

        Ok(Reply::new((), outbound))
    }

    // -----------------------------------------------------------------------
    // Playback
    // -----------------------------------------------------------------------

    /// Records a play/pause/seek and relays it to everyone but the sender.
    pub async fn update_playback(
        &self,
        room_id: &RoomId,
        requesting_user: &UserId,
        action: PlaybackAction,
    ) -> Result<Reply<()>, RoomError> {
        let position = action.position();
        if !position.is_finite() || position < 0.0 {
            return Err(RoomError::InvalidPosition(position));
        }

        let room = self.open_room(room_id).await?;
        let mut state = room.lock().await;
        ensure_open(&state)?;
        if !state.is_member(requesting_user) {
            return Err(RoomError::NotInRoom(requesting_user.clone(), room_id.clone()));
        }
        if self.config.host_only_playback {
            ensure_host(&state, requesting_user)?;
        }

        state.playback.apply(action, self.now());

        tracing::debug!(%room_id, user_id = %requesting_user, ?action, "playback updated");
        Ok(Reply::new(
            (),
            vec![Outbound::multicast(
                state.member_connections(Some(requesting_user)),
                action.to_event(),
            )],
        ))
    }

    /// The drift-corrected playback position, in seconds.
    pub async fn sync_time(&self, room_id: &RoomId) -> Result<f64, RoomError> {
        Ok(self.playback_sync(room_id).await?.current_time)
    }

    /// The drift-corrected position together with the play/pause flag.
    pub async fn playback_sync(&self, room_id: &RoomId) -> Result<PlaybackSync, RoomError> {
        let room = self.open_room(room_id).await?;
        let state = room.lock().await;
        ensure_open(&state)?;
        Ok(state.playback.sync(self.now()))
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    /// Appends a chat message from a member and broadcasts it to the room.
    ///
    /// The returned message carries everything a persistence collaborator
    /// needs (sender, content, server timestamp).
    pub async fn post_message(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        content: &str,
    ) -> Result<Reply<RoomMessage>, RoomError> {
        if content.trim().is_empty() {
            return Err(RoomError::InvalidContent("message is empty".into()));
        }
        if content.chars().count() > self.config.max_message_len {
            return Err(RoomError::InvalidContent(format!(
                "message exceeds {} characters",
                self.config.max_message_len
            )));
        }

        let room = self.open_room(room_id).await?;
        let mut state = room.lock().await;
        ensure_open(&state)?;
        let author = state
            .members
            .get(sender)
            .cloned()
            .ok_or_else(|| RoomError::NotInRoom(sender.clone(), room_id.clone()))?;

        let message = RoomMessage {
            sender: author,
            content: content.to_owned(),
            sent_at: self.now(),
        };
        state.messages.push(message.clone());

        tracing::debug!(%room_id, user_id = %sender, history = state.messages.len(), "message posted");
        Ok(Reply::new(
            message.clone(),
            vec![Outbound::multicast(
                state.member_connections(None),
                ServerEvent::ReceiveMessage { message },
            )],
        ))
    }

    /// A copy of the room's chat history, oldest first. Empty for unknown
    /// rooms.
    pub async fn get_history(&self, room_id: &RoomId) -> Vec<RoomMessage> {
        let Some(room) = self.registry.try_get(room_id).await else {
            return Vec::new();
        };
        let state = room.lock().await;
        if state.is_closed() {
            return Vec::new();
        }
        state.messages.clone()
    }

    // -----------------------------------------------------------------------
    // Playlist
    // -----------------------------------------------------------------------

    /// Host appends a video. The first video queued becomes current.
    pub async fn add_video(
        &self,
        room_id: &RoomId,
        requesting_host: &UserId,
        video: VideoRef,
    ) -> Result<Reply<()>, RoomError> {
        let room = self.open_room(room_id).await?;
        let mut state = room.lock().await;
        ensure_open(&state)?;
        ensure_host(&state, requesting_host)?;
        if state.playlist.iter().any(|v| v.id == video.id) {
            return Err(RoomError::DuplicateVideo(video.id));
        }

        if state.current_video.is_none() {
            state.current_video = Some(video.id.clone());
        }
        tracing::debug!(%room_id, video_id = %video.id, "video queued");
        state.playlist.push(video);

        Ok(Reply::new(
            (),
            vec![Outbound::multicast(
                state.member_connections(None),
                ServerEvent::PlaylistUpdated {
                    playlist: state.playlist.clone(),
                },
            )],
        ))
    }

    /// Moves to the next video, wrapping around at the end, and rewinds
    /// the player to a paused start. `None` for an empty playlist.
    ///
    /// No authorization: use [`advance_playlist_by`](Self::advance_playlist_by)
    /// for client requests.
    pub async fn advance_playlist(
        &self,
        room_id: &RoomId,
    ) -> Result<Reply<Option<VideoRef>>, RoomError> {
        let room = self.open_room(room_id).await?;
        let mut state = room.lock().await;
        ensure_open(&state)?;
        self.advance_locked(&mut state)
    }

    /// [`advance_playlist`](Self::advance_playlist) on behalf of a user who
    /// must be the present host. The check and the advance share one lock.
    pub async fn advance_playlist_by(
        &self,
        room_id: &RoomId,
        requesting_host: &UserId,
    ) -> Result<Reply<Option<VideoRef>>, RoomError> {
        let room = self.open_room(room_id).await?;
        let mut state = room.lock().await;
        ensure_open(&state)?;
        ensure_host(&state, requesting_host)?;
        self.advance_locked(&mut state)
    }

    fn advance_locked(&self, state: &mut RoomState) -> Result<Reply<Option<VideoRef>>, RoomError> {
        let room_id = state.room_id.clone();
        if state.playlist.is_empty() {
            return Ok(Reply::silent(None));
        }

        let index = state
            .current_video
            .as_ref()
            .and_then(|id| state.playlist.iter().position(|v| v.id == *id))
            .ok_or_else(|| RoomError::InvalidPlaylistPosition(room_id.clone()))?;
        let next = state.playlist[(index + 1) % state.playlist.len()].clone();

        state.current_video = Some(next.id.clone());
        let now = self.now();
        state.playback.reset(now);

        tracing::info!(%room_id, video_id = %next.id, "playlist advanced");
        Ok(Reply::new(
            Some(next.clone()),
            vec![Outbound::multicast(
                state.member_connections(None),
                ServerEvent::VideoChanged { video: next },
            )],
        ))
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// A metadata snapshot of the room, if it exists.
    pub async fn room_info(&self, room_id: &RoomId) -> Option<RoomInfo> {
        let room = self.registry.try_get(room_id).await?;
        let state = room.lock().await;
        if state.is_closed() {
            return None;
        }
        Some(state.info(self.now()))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    async fn resolve(&self, user_id: &UserId) -> Result<UserRef, RoomError> {
        self.users
            .lookup(user_id)
            .await
            .ok_or_else(|| RoomError::UserNotFound(user_id.clone()))
    }

    async fn open_room(&self, room_id: &RoomId) -> Result<SharedRoom, RoomError> {
        self.registry
            .try_get(room_id)
            .await
            .ok_or_else(|| RoomError::RoomNotFound(room_id.clone()))
    }
}

fn ensure_open(state: &RoomState) -> Result<(), RoomError> {
    if state.is_closed() {
        return Err(RoomError::RoomNotFound(state.room_id.clone()));
    }
    Ok(())
}

/// The requester must be the host *and* currently in the room.
fn ensure_host(state: &RoomState, user_id: &UserId) -> Result<(), RoomError> {
    if state.host_present && state.is_host(user_id) {
        Ok(())
    } else {
        Err(RoomError::NotHost(user_id.clone(), state.room_id.clone()))
    }
}

fn audit(state: &RoomState) {
    debug_assert!(
        state.invariants_hold(),
        "room {} violates its invariants",
        state.room_id
    );
}
