//! Integration tests for the room system: membership, approval, bans,
//! playback reconciliation, chat, and playlists.

use std::sync::Arc;
use std::time::Duration;

use watchparty_protocol::{ConnectionId, RoomId, ServerEvent, UserId, VideoRef};
use watchparty_room::{
    ApprovalPolicy, InMemoryUsers, JoinOutcome, ManualClock, MemberState, Outbound,
    PlaybackAction, RoomConfig, RoomError, RoomRegistry, RoomStateManager,
};

// =========================================================================
// Helpers
// =========================================================================

const T0: u64 = 1_700_000_000_000;

fn users() -> InMemoryUsers {
    InMemoryUsers::new()
        .with_user("alice", "Alice")
        .with_user("bob", "Bob")
        .with_user("carol", "Carol")
        .with_user("dave", "Dave")
}

fn manager_with(config: RoomConfig) -> (RoomStateManager<InMemoryUsers>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let mgr = RoomStateManager::new(Arc::new(RoomRegistry::new()), users(), config)
        .with_clock(clock.clone());
    (mgr, clock)
}

fn manager() -> (RoomStateManager<InMemoryUsers>, Arc<ManualClock>) {
    manager_with(RoomConfig::default())
}

fn rid(id: &str) -> RoomId {
    RoomId::from(id)
}

fn uid(id: &str) -> UserId {
    UserId::from(id)
}

fn cid(id: &str) -> ConnectionId {
    ConnectionId::from(id)
}

/// Events addressed to `conn`, in order.
fn events_for(outbound: &[Outbound], conn: &str) -> Vec<ServerEvent> {
    outbound
        .iter()
        .filter(|o| o.to.contains(&cid(conn)))
        .map(|o| o.event.clone())
        .collect()
}

/// Alice hosts r1, Bob has been accepted.
async fn room_with_alice_and_bob(mgr: &RoomStateManager<InMemoryUsers>) {
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();
    mgr.accept_user(&rid("r1"), &uid("alice"), &uid("bob")).await.unwrap();
}

async fn member_state(
    mgr: &RoomStateManager<InMemoryUsers>,
    room: &str,
    user: &str,
) -> MemberState {
    let room = mgr.registry().try_get(&rid(room)).await.unwrap();
    let state = room.lock().await;
    assert!(state.invariants_hold());
    state.member_state(&uid(user))
}

// =========================================================================
// Join / creation
// =========================================================================

#[tokio::test]
async fn test_first_join_creates_room_with_host() {
    let (mgr, _) = manager();
    let reply = mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();

    assert!(matches!(reply.outcome, JoinOutcome::Created(_)));
    let info = mgr.room_info(&rid("r1")).await.unwrap();
    assert_eq!(info.host.id, uid("alice"));
    assert!(info.host_present);
    assert_eq!(info.member_count, 1);

    let events = events_for(&reply.outbound, "c1");
    assert!(matches!(events[0], ServerEvent::YouAreHost { .. }));
    assert!(matches!(events[1], ServerEvent::SyncVideoState(_)));
}

#[tokio::test]
async fn test_unknown_user_cannot_join() {
    let (mgr, _) = manager();
    let result = mgr.join_room(&rid("r1"), &uid("mallory"), &cid("c9")).await;
    assert!(matches!(result, Err(RoomError::UserNotFound(_))));
    assert_eq!(mgr.registry().room_count().await, 0);
}

#[tokio::test]
async fn test_approval_gate() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();

    let reply = mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();
    assert_eq!(reply.outcome, JoinOutcome::NeedsApproval);
    assert_eq!(member_state(&mgr, "r1", "bob").await, MemberState::WaitingApproval);

    // The host hears about it; bob hears he's queued.
    assert!(matches!(
        events_for(&reply.outbound, "c1")[0],
        ServerEvent::ApprovalRequested { .. }
    ));
    assert!(matches!(
        events_for(&reply.outbound, "c2")[0],
        ServerEvent::NeedsApproval { .. }
    ));

    let accepted = mgr.accept_user(&rid("r1"), &uid("alice"), &uid("bob")).await.unwrap();
    assert_eq!(member_state(&mgr, "r1", "bob").await, MemberState::Member);
    let to_bob = events_for(&accepted.outbound, "c2");
    assert!(matches!(to_bob[0], ServerEvent::JoinedToRoom { .. }));
    assert_eq!(to_bob[1], ServerEvent::SyncVideoState(accepted.outcome));
}

#[tokio::test]
async fn test_accept_requires_host() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();

    let result = mgr.accept_user(&rid("r1"), &uid("bob"), &uid("bob")).await;
    assert!(matches!(result, Err(RoomError::NotHost(..))));
    assert_eq!(member_state(&mgr, "r1", "bob").await, MemberState::WaitingApproval);
}

#[tokio::test]
async fn test_accept_unknown_waiting_user() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    let result = mgr.accept_user(&rid("r1"), &uid("alice"), &uid("carol")).await;
    assert!(matches!(result, Err(RoomError::UserNotFound(_))));
}

#[tokio::test]
async fn test_without_approval_users_are_accepted_directly() {
    let (mgr, _) = manager_with(RoomConfig {
        approval: ApprovalPolicy::Never,
        ..RoomConfig::default()
    });
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    let reply = mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();

    assert!(matches!(reply.outcome, JoinOutcome::Accepted(_)));
    assert!(matches!(
        events_for(&reply.outbound, "c1")[0],
        ServerEvent::UserJoined { .. }
    ));
}

#[tokio::test]
async fn test_room_full_takes_precedence_over_approval() {
    let (mgr, _) = manager_with(RoomConfig {
        capacity: 2,
        ..RoomConfig::default()
    });
    room_with_alice_and_bob(&mgr).await;

    let reply = mgr.join_room(&rid("r1"), &uid("carol"), &cid("c3")).await.unwrap();
    assert_eq!(reply.outcome, JoinOutcome::RoomIsFull);
    assert_eq!(member_state(&mgr, "r1", "carol").await, MemberState::NotInRoom);
}

#[tokio::test]
async fn test_member_rejoin_rebinds_connection() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;

    let reply = mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2b")).await.unwrap();
    assert!(matches!(reply.outcome, JoinOutcome::Accepted(_)));

    let room = mgr.registry().try_get(&rid("r1")).await.unwrap();
    assert_eq!(room.lock().await.connection_of(&uid("bob")), Some(&cid("c2b")));
}

#[tokio::test]
async fn test_connection_cannot_be_shared() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    let result = mgr.join_room(&rid("r1"), &uid("bob"), &cid("c1")).await;
    assert!(matches!(result, Err(RoomError::ConnectionInUse(_))));
}

#[tokio::test]
async fn test_queued_rejoin_keeps_place_and_follows_connection() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();

    let reply = mgr.join_room(&rid("r1"), &uid("bob"), &cid("c5")).await.unwrap();
    assert_eq!(reply.outcome, JoinOutcome::NeedsApproval);
    assert_eq!(mgr.room_info(&rid("r1")).await.unwrap().waiting_count, 1);

    let accepted = mgr.accept_user(&rid("r1"), &uid("alice"), &uid("bob")).await.unwrap();
    assert!(matches!(
        events_for(&accepted.outbound, "c5")[0],
        ServerEvent::JoinedToRoom { .. }
    ));
    assert!(events_for(&accepted.outbound, "c2").is_empty());
}

#[tokio::test]
async fn test_queued_user_admitted_once_host_is_gone() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;
    let queued = mgr.join_room(&rid("r1"), &uid("carol"), &cid("c3")).await.unwrap();
    assert_eq!(queued.outcome, JoinOutcome::NeedsApproval);
    mgr.leave_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();

    // Newcomers get straight in while the host is away, and so does carol.
    let dave = mgr.join_room(&rid("r1"), &uid("dave"), &cid("c4")).await.unwrap();
    assert!(matches!(dave.outcome, JoinOutcome::Accepted(_)));
    let carol = mgr.join_room(&rid("r1"), &uid("carol"), &cid("c5")).await.unwrap();
    assert!(matches!(carol.outcome, JoinOutcome::Accepted(_)));

    assert_eq!(member_state(&mgr, "r1", "carol").await, MemberState::Member);
    let info = mgr.room_info(&rid("r1")).await.unwrap();
    assert_eq!(info.waiting_count, 0);
    assert_eq!(info.member_count, 3);
    assert!(matches!(
        events_for(&carol.outbound, "c2")[0],
        ServerEvent::UserJoined { .. }
    ));
}

#[tokio::test]
async fn test_queued_rejoin_into_full_room_is_refused() {
    let (mgr, _) = manager_with(RoomConfig {
        capacity: 2,
        ..RoomConfig::default()
    });
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("carol"), &cid("c3")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();
    mgr.accept_user(&rid("r1"), &uid("alice"), &uid("bob")).await.unwrap();

    let reply = mgr.join_room(&rid("r1"), &uid("carol"), &cid("c5")).await.unwrap();
    assert_eq!(reply.outcome, JoinOutcome::RoomIsFull);
    assert!(matches!(
        events_for(&reply.outbound, "c5")[0],
        ServerEvent::RoomFull { .. }
    ));
    // Still queued, under the original connection.
    assert_eq!(member_state(&mgr, "r1", "carol").await, MemberState::WaitingApproval);
    let room = mgr.registry().try_get(&rid("r1")).await.unwrap();
    assert_eq!(room.lock().await.connection_owner(&cid("c3")), Some(&uid("carol")));
}

#[tokio::test]
async fn test_accept_refused_once_room_filled_up() {
    let (mgr, _) = manager_with(RoomConfig {
        capacity: 2,
        ..RoomConfig::default()
    });
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("carol"), &cid("c3")).await.unwrap();
    mgr.accept_user(&rid("r1"), &uid("alice"), &uid("bob")).await.unwrap();

    let result = mgr.accept_user(&rid("r1"), &uid("alice"), &uid("carol")).await;
    assert!(matches!(result, Err(RoomError::RoomFull(_))));
    assert_eq!(member_state(&mgr, "r1", "carol").await, MemberState::WaitingApproval);
}

#[tokio::test]
async fn test_accepting_a_member_again_is_a_conflict() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;

    let result = mgr.accept_user(&rid("r1"), &uid("alice"), &uid("bob")).await;
    let err = result.unwrap_err();
    assert!(matches!(err, RoomError::AlreadyMember(..)));
    assert_eq!(err.code(), 409);
}

// =========================================================================
// Reject / ban
// =========================================================================

#[tokio::test]
async fn test_rejected_user_stays_out() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();

    let reply = mgr.reject_user(&rid("r1"), &uid("alice"), &uid("bob")).await.unwrap();
    assert!(reply.outcome);
    assert!(matches!(
        events_for(&reply.outbound, "c2")[0],
        ServerEvent::Rejected { .. }
    ));

    let again = mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();
    assert_eq!(again.outcome, JoinOutcome::Rejected);
    assert_eq!(member_state(&mgr, "r1", "bob").await, MemberState::Banned);
}

#[tokio::test]
async fn test_reject_by_non_host_changes_nothing() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("carol"), &cid("c3")).await.unwrap();

    let reply = mgr.reject_user(&rid("r1"), &uid("carol"), &uid("bob")).await.unwrap();
    assert!(!reply.outcome);
    assert!(reply.outbound.is_empty());
    assert_eq!(member_state(&mgr, "r1", "bob").await, MemberState::WaitingApproval);
}

#[tokio::test]
async fn test_reject_user_not_waiting_returns_false() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    let reply = mgr.reject_user(&rid("r1"), &uid("alice"), &uid("bob")).await.unwrap();
    assert!(!reply.outcome);

    let missing = mgr.reject_user(&rid("nope"), &uid("alice"), &uid("bob")).await.unwrap();
    assert!(!missing.outcome);
}

#[tokio::test]
async fn test_ban_member_evicts_and_notifies() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;

    let reply = mgr.ban_user(&rid("r1"), &uid("alice"), &uid("bob")).await.unwrap();
    assert!(matches!(
        events_for(&reply.outbound, "c2")[0],
        ServerEvent::Rejected { .. }
    ));
    assert!(matches!(
        events_for(&reply.outbound, "c1")[0],
        ServerEvent::UserLeft { .. }
    ));
    assert_eq!(member_state(&mgr, "r1", "bob").await, MemberState::Banned);

    let again = mgr.join_room(&rid("r1"), &uid("bob"), &cid("c5")).await.unwrap();
    assert_eq!(again.outcome, JoinOutcome::Rejected);
}

#[tokio::test]
async fn test_ban_queued_user() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();

    let reply = mgr.ban_user(&rid("r1"), &uid("alice"), &uid("bob")).await.unwrap();
    assert_eq!(
        events_for(&reply.outbound, "c2"),
        vec![ServerEvent::Rejected { room_id: rid("r1") }]
    );
    // Never a member, so nobody hears that they left.
    assert!(events_for(&reply.outbound, "c1").is_empty());
    assert_eq!(member_state(&mgr, "r1", "bob").await, MemberState::Banned);
    assert_eq!(mgr.room_info(&rid("r1")).await.unwrap().waiting_count, 0);

    let result = mgr.accept_user(&rid("r1"), &uid("alice"), &uid("bob")).await;
    let err = result.unwrap_err();
    assert!(matches!(err, RoomError::Banned(..)));
    assert_eq!(err.code(), 403);
}

#[tokio::test]
async fn test_ban_requires_host() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;
    mgr.join_room(&rid("r1"), &uid("carol"), &cid("c3")).await.unwrap();

    let result = mgr.ban_user(&rid("r1"), &uid("bob"), &uid("carol")).await;
    assert!(matches!(result, Err(RoomError::NotHost(..))));
    assert_eq!(member_state(&mgr, "r1", "carol").await, MemberState::WaitingApproval);
}

#[tokio::test]
async fn test_host_cannot_be_banned() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    let reply = mgr.ban_user(&rid("r1"), &uid("alice"), &uid("alice")).await.unwrap();
    assert!(reply.outbound.is_empty());
    assert_eq!(member_state(&mgr, "r1", "alice").await, MemberState::Host);
}

// =========================================================================
// Leave / host reconnection / cleanup
// =========================================================================

#[tokio::test]
async fn test_host_reconnection() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;

    let left = mgr.leave_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    assert!(matches!(
        events_for(&left.outbound, "c2")[0],
        ServerEvent::HostLeftRoom { .. }
    ));
    assert!(matches!(
        events_for(&left.outbound, "c1")[0],
        ServerEvent::LeavedRoom { .. }
    ));

    let info = mgr.room_info(&rid("r1")).await.unwrap();
    assert!(!info.host_present);
    assert_eq!(info.host.id, uid("alice"));

    let back = mgr.join_room(&rid("r1"), &uid("alice"), &cid("c3")).await.unwrap();
    assert!(matches!(back.outcome, JoinOutcome::HostReconnected(_)));
    assert!(matches!(
        events_for(&back.outbound, "c2")[0],
        ServerEvent::HostInRoom { .. }
    ));
    assert_eq!(member_state(&mgr, "r1", "alice").await, MemberState::Host);
}

#[tokio::test]
async fn test_reconnected_host_sees_queued_requests() {
    let (mgr, _) = manager_with(RoomConfig {
        approval: ApprovalPolicy::Always,
        ..RoomConfig::default()
    });
    room_with_alice_and_bob(&mgr).await;
    mgr.leave_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();

    let queued = mgr.join_room(&rid("r1"), &uid("carol"), &cid("c3")).await.unwrap();
    assert_eq!(queued.outcome, JoinOutcome::NeedsApproval);

    let back = mgr.join_room(&rid("r1"), &uid("alice"), &cid("c4")).await.unwrap();
    let to_host = events_for(&back.outbound, "c4");
    assert!(to_host.iter().any(|e| matches!(
        e,
        ServerEvent::ApprovalRequested { user, .. } if user.id == uid("carol")
    )));
}

#[tokio::test]
async fn test_empty_room_is_removed() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;

    mgr.leave_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    assert!(mgr.registry().try_get(&rid("r1")).await.is_some());

    mgr.leave_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();
    assert!(mgr.registry().try_get(&rid("r1")).await.is_none());
}

#[tokio::test]
async fn test_waiting_users_hear_room_closed() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();

    let reply = mgr.leave_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    assert!(matches!(
        events_for(&reply.outbound, "c2")[0],
        ServerEvent::RoomClosed { .. }
    ));
    assert_eq!(mgr.registry().room_count().await, 0);
}

#[tokio::test]
async fn test_stale_leave_is_ignored() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;
    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2b")).await.unwrap();

    let reply = mgr.leave_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();
    assert!(reply.outbound.is_empty());
    assert_eq!(member_state(&mgr, "r1", "bob").await, MemberState::Member);
}

#[tokio::test]
async fn test_leave_unknown_room_is_noop() {
    let (mgr, _) = manager();
    let reply = mgr.leave_room(&rid("nope"), &uid("bob"), &cid("c2")).await.unwrap();
    assert!(reply.outbound.is_empty());
}

#[tokio::test]
async fn test_recreated_room_gets_new_host() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.leave_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();

    let reply = mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();
    assert!(matches!(reply.outcome, JoinOutcome::Created(_)));
    assert_eq!(mgr.room_info(&rid("r1")).await.unwrap().host.id, uid("bob"));
}

// =========================================================================
// Playback
// =========================================================================

#[tokio::test]
async fn test_drift_correction_on_join() {
    let (mgr, clock) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.update_playback(&rid("r1"), &uid("alice"), PlaybackAction::Play(10.0))
        .await
        .unwrap();

    clock.advance(Duration::from_secs(5));
    assert_eq!(mgr.sync_time(&rid("r1")).await.unwrap(), 15.0);

    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();
    let accepted = mgr.accept_user(&rid("r1"), &uid("alice"), &uid("bob")).await.unwrap();
    assert_eq!(accepted.outcome.current_time, 15.0);
    assert!(accepted.outcome.is_playing);

    // The corrected position is for bob only.
    assert!(
        events_for(&accepted.outbound, "c1")
            .iter()
            .all(|e| !matches!(e, ServerEvent::SyncVideoState(_)))
    );
}

#[tokio::test]
async fn test_paused_sync_is_stable() {
    let (mgr, clock) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.update_playback(&rid("r1"), &uid("alice"), PlaybackAction::Pause(42.0))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(30));
    assert_eq!(mgr.sync_time(&rid("r1")).await.unwrap(), 42.0);
}

#[tokio::test]
async fn test_playback_relayed_to_others_only() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;

    let reply = mgr
        .update_playback(&rid("r1"), &uid("alice"), PlaybackAction::Seek(90.0))
        .await
        .unwrap();
    assert!(events_for(&reply.outbound, "c1").is_empty());
    assert_eq!(
        events_for(&reply.outbound, "c2"),
        vec![ServerEvent::ReceiveSeek { current_time: 90.0 }]
    );
}

#[tokio::test]
async fn test_only_host_drives_playback() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;

    let result = mgr
        .update_playback(&rid("r1"), &uid("bob"), PlaybackAction::Play(1.0))
        .await;
    assert!(matches!(result, Err(RoomError::NotHost(..))));
}

#[tokio::test]
async fn test_members_drive_playback_when_allowed() {
    let (mgr, _) = manager_with(RoomConfig {
        host_only_playback: false,
        ..RoomConfig::default()
    });
    room_with_alice_and_bob(&mgr).await;

    mgr.update_playback(&rid("r1"), &uid("bob"), PlaybackAction::Play(3.0))
        .await
        .unwrap();
    assert!(mgr.playback_sync(&rid("r1")).await.unwrap().is_playing);
}

#[tokio::test]
async fn test_invalid_position_rejected() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    let result = mgr
        .update_playback(&rid("r1"), &uid("alice"), PlaybackAction::Seek(f64::NAN))
        .await;
    assert!(matches!(result, Err(RoomError::InvalidPosition(_))));
}

#[tokio::test]
async fn test_sync_time_unknown_room() {
    let (mgr, _) = manager();
    assert!(matches!(
        mgr.sync_time(&rid("nope")).await,
        Err(RoomError::RoomNotFound(_))
    ));
}

// =========================================================================
// Chat
// =========================================================================

#[tokio::test]
async fn test_history_is_ordered_and_idempotent() {
    let (mgr, clock) = manager();
    room_with_alice_and_bob(&mgr).await;

    mgr.post_message(&rid("r1"), &uid("alice"), "first").await.unwrap();
    clock.advance(Duration::from_millis(10));
    let reply = mgr.post_message(&rid("r1"), &uid("bob"), "second").await.unwrap();
    assert_eq!(reply.outcome.sent_at, T0 + 10);
    assert_eq!(reply.outbound[0].to.len(), 2);

    let h1 = mgr.get_history(&rid("r1")).await;
    let h2 = mgr.get_history(&rid("r1")).await;
    assert_eq!(h1, h2);
    assert_eq!(h1.len(), 2);
    assert_eq!(h1[0].content, "first");
    assert_eq!(h1[1].sender.display_name, "Bob");
}

#[tokio::test]
async fn test_empty_and_oversized_messages_rejected() {
    let (mgr, _) = manager_with(RoomConfig {
        max_message_len: 5,
        ..RoomConfig::default()
    });
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();

    assert!(matches!(
        mgr.post_message(&rid("r1"), &uid("alice"), "   ").await,
        Err(RoomError::InvalidContent(_))
    ));
    assert!(matches!(
        mgr.post_message(&rid("r1"), &uid("alice"), "too long").await,
        Err(RoomError::InvalidContent(_))
    ));
    assert!(mgr.get_history(&rid("r1")).await.is_empty());
}

#[tokio::test]
async fn test_waiting_user_cannot_chat() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.join_room(&rid("r1"), &uid("bob"), &cid("c2")).await.unwrap();
    let result = mgr.post_message(&rid("r1"), &uid("bob"), "let me in").await;
    assert!(matches!(result, Err(RoomError::NotInRoom(..))));
}

#[tokio::test]
async fn test_history_of_unknown_room_is_empty() {
    let (mgr, _) = manager();
    assert!(mgr.get_history(&rid("nope")).await.is_empty());
}

// =========================================================================
// Playlist
// =========================================================================

#[tokio::test]
async fn test_playlist_advances_cyclically() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    for id in ["v1", "v2", "v3"] {
        mgr.add_video(&rid("r1"), &uid("alice"), VideoRef::new(id, id))
            .await
            .unwrap();
    }
    let current = mgr.room_info(&rid("r1")).await.unwrap().current_video.unwrap();
    assert_eq!(current.id.as_str(), "v1");

    let mut seen = Vec::new();
    for _ in 0..3 {
        let reply = mgr.advance_playlist(&rid("r1")).await.unwrap();
        seen.push(reply.outcome.unwrap().id.0);
    }
    assert_eq!(seen, vec!["v2", "v3", "v1"]);
}

#[tokio::test]
async fn test_advance_resets_playback() {
    let (mgr, clock) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.add_video(&rid("r1"), &uid("alice"), VideoRef::new("v1", "One"))
        .await
        .unwrap();
    mgr.add_video(&rid("r1"), &uid("alice"), VideoRef::new("v2", "Two"))
        .await
        .unwrap();
    mgr.update_playback(&rid("r1"), &uid("alice"), PlaybackAction::Play(50.0))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(1));

    mgr.advance_playlist(&rid("r1")).await.unwrap();
    let sync = mgr.playback_sync(&rid("r1")).await.unwrap();
    assert_eq!(sync.current_time, 0.0);
    assert!(!sync.is_playing);
}

#[tokio::test]
async fn test_advance_on_request_is_host_only() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;
    for id in ["v1", "v2"] {
        mgr.add_video(&rid("r1"), &uid("alice"), VideoRef::new(id, id))
            .await
            .unwrap();
    }

    let result = mgr.advance_playlist_by(&rid("r1"), &uid("bob")).await;
    assert!(matches!(result, Err(RoomError::NotHost(..))));
    let current = mgr.room_info(&rid("r1")).await.unwrap().current_video.unwrap();
    assert_eq!(current.id.as_str(), "v1");

    let reply = mgr.advance_playlist_by(&rid("r1"), &uid("alice")).await.unwrap();
    assert_eq!(reply.outcome.unwrap().id.as_str(), "v2");
    assert!(matches!(
        events_for(&reply.outbound, "c2")[0],
        ServerEvent::VideoChanged { .. }
    ));
}

#[tokio::test]
async fn test_absent_host_cannot_advance() {
    let (mgr, _) = manager();
    room_with_alice_and_bob(&mgr).await;
    mgr.add_video(&rid("r1"), &uid("alice"), VideoRef::new("v1", "One"))
        .await
        .unwrap();
    mgr.leave_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();

    let result = mgr.advance_playlist_by(&rid("r1"), &uid("alice")).await;
    assert!(matches!(result, Err(RoomError::NotHost(..))));
}

#[tokio::test]
async fn test_empty_playlist_advances_to_none() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    let reply = mgr.advance_playlist(&rid("r1")).await.unwrap();
    assert!(reply.outcome.is_none());
}

#[tokio::test]
async fn test_duplicate_video_rejected() {
    let (mgr, _) = manager();
    mgr.join_room(&rid("r1"), &uid("alice"), &cid("c1")).await.unwrap();
    mgr.add_video(&rid("r1"), &uid("alice"), VideoRef::new("v1", "One"))
        .await
        .unwrap();
    let result = mgr
        .add_video(&rid("r1"), &uid("alice"), VideoRef::new("v1", "Again"))
        .await;
    assert!(matches!(result, Err(RoomError::DuplicateVideo(_))));
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_joiners_elect_one_host() {
    let (mgr, _) = manager_with(RoomConfig {
        approval: ApprovalPolicy::Never,
        ..RoomConfig::default()
    });
    let mgr = Arc::new(mgr);

    let mut tasks = Vec::new();
    for (i, user) in ["alice", "bob", "carol", "dave"].into_iter().enumerate() {
        let mgr = Arc::clone(&mgr);
        tasks.push(tokio::spawn(async move {
            mgr.join_room(&rid("r1"), &uid(user), &cid(&format!("c{i}")))
                .await
                .unwrap()
                .outcome
        }));
    }

    let mut created = 0;
    for task in tasks {
        if matches!(task.await.unwrap(), JoinOutcome::Created(_)) {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(mgr.room_info(&rid("r1")).await.unwrap().member_count, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_racing_removal_is_never_lost() {
    let (mgr, _) = manager();
    let mgr = Arc::new(mgr);

    for round in 0..50 {
        let room = rid(&format!("r{round}"));
        mgr.join_room(&room, &uid("alice"), &cid("c1")).await.unwrap();

        let leaver = {
            let mgr = Arc::clone(&mgr);
            let room = room.clone();
            tokio::spawn(async move {
                mgr.leave_room(&room, &uid("alice"), &cid("c1")).await.unwrap();
            })
        };
        let joiner = {
            let mgr = Arc::clone(&mgr);
            let room = room.clone();
            tokio::spawn(async move {
                mgr.join_room(&room, &uid("bob"), &cid("c2")).await.unwrap().outcome
            })
        };
        leaver.await.unwrap();
        let outcome = joiner.await.unwrap();

        // Bob either queued in alice's room (which then closed on him) or
        // created a fresh one. If he holds a seat, the room must exist.
        if outcome.is_admitted() {
            let info = mgr.room_info(&room).await.expect("admitted into a live room");
            assert_eq!(info.host.id, uid("bob"));
        }
    }
}
