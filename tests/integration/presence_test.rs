//! Integration tests for connection lifecycle, grace periods and roster
//! notifications.

mod helpers;

use std::time::Duration;

use beacon_core::traits::Clock;
use beacon_core::types::{CloseReason, ConnectionHandle};
use beacon_realtime::OutboundMessage;
use tokio::time::sleep;

use helpers::TestEngine;

#[tokio::test(start_paused = true)]
async fn test_connect_brings_identity_online_once() {
    let t = TestEngine::start();
    let (alice, handle) = t.connected("alice").await;

    let record = t.record(&alice).await;
    assert!(record.online);
    assert_eq!(record.connection, Some(handle));
    assert_eq!(t.transport.broadcasts_of("presence_online").len(), 1);

    // A heartbeat on the same connection is not a transition.
    t.engine.liveness(alice.clone(), Some(handle)).await.unwrap();
    t.settle().await;
    assert_eq!(t.transport.broadcasts_of("presence_online").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_close_then_reconnect_within_grace_stays_online() {
    let t = TestEngine::start();
    let (alice, first) = t.connected("alice").await;
    t.transport.clear();

    t.transport.drop_live(first);
    t.engine
        .connection_closed(alice.clone(), first, CloseReason::Transient)
        .await
        .unwrap();
    sleep(Duration::from_secs(3)).await;

    let second = ConnectionHandle::new();
    t.transport.add_live(&alice, second);
    t.engine
        .connection_opened(alice.clone(), second)
        .await
        .unwrap();
    sleep(Duration::from_secs(10)).await;
    t.settle().await;

    let record = t.record(&alice).await;
    assert!(record.online);
    assert_eq!(record.connection, Some(second));
    assert!(t.transport.broadcasts_of("presence_offline").is_empty());
    assert!(t.transport.broadcasts_of("presence_online").is_empty());

    let metrics = t.engine.metrics();
    assert_eq!(metrics.grace_scheduled, 1);
    assert_eq!(metrics.grace_cancelled, 1);
    assert_eq!(metrics.grace_expired, 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_close_without_signal_goes_offline_after_grace() {
    let t = TestEngine::start();
    let (alice, handle) = t.connected("alice").await;
    sleep(Duration::from_secs(2)).await;
    t.transport.clear();

    t.transport.drop_live(handle);
    let closed_at = t.clock.now();
    t.engine
        .connection_closed(alice.clone(), handle, CloseReason::Transient)
        .await
        .unwrap();

    sleep(Duration::from_secs(5)).await;
    t.settle().await;
    assert!(t.record(&alice).await.online);
    assert_eq!(t.engine.snapshot().await.unwrap().pending_disconnects, 1);

    sleep(Duration::from_secs(6)).await;
    t.settle().await;

    let record = t.record(&alice).await;
    assert!(!record.online);
    assert_eq!(record.connection, None);
    assert_eq!(record.last_seen, closed_at);

    let offline = t.transport.broadcasts_of("presence_offline");
    assert_eq!(offline.len(), 1);
    assert_eq!(
        offline[0],
        OutboundMessage::PresenceOffline {
            identity: alice.clone(),
            last_seen: closed_at,
        }
    );

    let snapshot = t.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.bound_sessions, 0);
    assert_eq!(snapshot.pending_disconnects, 0);
}

#[tokio::test(start_paused = true)]
async fn test_intentional_close_goes_offline_immediately() {
    let t = TestEngine::start();
    let (alice, handle) = t.connected("alice").await;
    sleep(Duration::from_secs(2)).await;

    let closed_at = t.clock.now();
    t.engine
        .connection_closed(alice.clone(), handle, CloseReason::Intentional)
        .await
        .unwrap();
    t.settle().await;

    let record = t.record(&alice).await;
    assert!(!record.online);
    assert_eq!(record.last_seen, closed_at);
    assert_eq!(t.transport.broadcasts_of("presence_offline").len(), 1);
    assert_eq!(t.engine.metrics().grace_scheduled, 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_of_superseded_connection_is_ignored() {
    let t = TestEngine::start();
    let (alice, first) = t.connected("alice").await;

    let second = ConnectionHandle::new();
    t.transport.add_live(&alice, second);
    t.engine
        .connection_opened(alice.clone(), second)
        .await
        .unwrap();
    t.engine
        .connection_closed(alice.clone(), first, CloseReason::Intentional)
        .await
        .unwrap();
    t.settle().await;

    let record = t.record(&alice).await;
    assert!(record.online);
    assert_eq!(record.connection, Some(second));
    assert!(t.transport.broadcasts_of("presence_offline").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_activity_after_disconnect_keeps_identity_online() {
    let t = TestEngine::start();
    let (alice, handle) = t.connected("alice").await;

    t.transport.drop_live(handle);
    t.engine
        .connection_closed(alice.clone(), handle, CloseReason::Transient)
        .await
        .unwrap();
    sleep(Duration::from_secs(3)).await;

    // Connectionless liveness, e.g. an HTTP ping.
    t.engine.liveness(alice.clone(), None).await.unwrap();
    sleep(Duration::from_secs(8)).await;
    t.settle().await;

    let record = t.record(&alice).await;
    assert!(record.online);
    assert_eq!(record.connection, None);
    assert!(t.transport.broadcasts_of("presence_offline").is_empty());

    let snapshot = t.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.bound_sessions, 0);
    assert_eq!(snapshot.pending_disconnects, 0);
    assert_eq!(t.engine.metrics().grace_cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_flapping_connection_ends_offline_at_last_disconnect() {
    let t = TestEngine::start();
    let (alice, first) = t.connected("alice").await;
    t.engine.liveness(alice.clone(), Some(first)).await.unwrap();

    // Network blip: reconnect inside the grace window.
    t.transport.drop_live(first);
    t.engine
        .connection_closed(alice.clone(), first, CloseReason::Transient)
        .await
        .unwrap();
    sleep(Duration::from_secs(4)).await;
    let second = ConnectionHandle::new();
    t.transport.add_live(&alice, second);
    t.engine
        .connection_opened(alice.clone(), second)
        .await
        .unwrap();
    sleep(Duration::from_secs(20)).await;
    t.settle().await;
    assert!(t.record(&alice).await.online);

    // Second drop, no return.
    t.transport.drop_live(second);
    let dropped_at = t.clock.now();
    t.engine
        .connection_closed(alice.clone(), second, CloseReason::Transient)
        .await
        .unwrap();
    sleep(Duration::from_secs(11)).await;
    t.settle().await;

    let record = t.record(&alice).await;
    assert!(!record.online);
    assert_eq!(record.last_seen, dropped_at);
    assert_eq!(t.transport.broadcasts_of("presence_online").len(), 1);
    assert_eq!(t.transport.broadcasts_of("presence_offline").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_identity_gets_not_found() {
    let t = TestEngine::start();
    let ghost = helpers::id("ghost");
    let handle = ConnectionHandle::new();

    t.engine
        .connection_opened(ghost.clone(), handle)
        .await
        .unwrap();
    t.settle().await;

    assert_eq!(
        t.transport.sent_to(handle),
        vec![OutboundMessage::IdentityNotFound {
            identity: "ghost".to_string()
        }]
    );
    assert!(t.store.is_empty());
    assert_eq!(t.engine.snapshot().await.unwrap().bound_sessions, 0);
}

#[tokio::test(start_paused = true)]
async fn test_register_is_idempotent_and_updates_location() {
    use beacon_core::types::LocationHint;

    let t = TestEngine::start();
    let alice = t.registered("alice").await;
    let first = t.record(&alice).await;
    assert!(!first.online);
    assert!(first.location.is_none());

    sleep(Duration::from_secs(5)).await;
    let location = LocationHint::from_parts(Some("NL".to_string()), None);
    let status = t
        .engine
        .register(alice.clone(), location.clone())
        .await
        .unwrap();

    let record = t.record(&alice).await;
    assert_eq!(record.location, location);
    assert_eq!(record.last_seen, first.last_seen);
    assert_eq!(status.last_seen, first.last_seen);
    assert_eq!(t.store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_roster_changes_are_coalesced() {
    let t = TestEngine::start();
    for name in ["ann", "ben", "cat", "dan", "eve"] {
        t.connected(name).await;
    }

    sleep(Duration::from_millis(200)).await;
    t.settle().await;
    assert!(t.transport.broadcasts_of("roster_changed").is_empty());

    sleep(Duration::from_millis(400)).await;
    t.settle().await;
    assert_eq!(
        t.transport.broadcasts_of("roster_changed"),
        vec![OutboundMessage::RosterChanged { changed: 5 }]
    );

    // A change after the flush opens a new window.
    t.connected("fay").await;
    sleep(Duration::from_millis(600)).await;
    t.settle().await;
    assert_eq!(t.transport.broadcasts_of("roster_changed").len(), 2);
    assert_eq!(t.engine.metrics().roster_broadcasts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_mark_offline_cancels_pending_disconnect() {
    let t = TestEngine::start();
    let (alice, handle) = t.connected("alice").await;
    t.engine
        .connection_closed(alice.clone(), handle, CloseReason::Transient)
        .await
        .unwrap();

    let status = t.engine.mark_offline(alice.clone()).await.unwrap();
    assert!(!status.online);

    sleep(Duration::from_secs(11)).await;
    t.settle().await;
    assert_eq!(t.transport.broadcasts_of("presence_offline").len(), 1);
    assert_eq!(t.engine.metrics().grace_expired, 0);

    let err = t.engine.mark_offline(helpers::id("ghost")).await.unwrap_err();
    assert_eq!(err.kind, beacon_core::error::ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_is_expired_and_disconnected() {
    let t = TestEngine::start();
    let (alice, handle) = t.connected("alice").await;

    sleep(Duration::from_secs(36 * 60)).await;
    t.settle().await;

    let expired = t.transport.sent_to_of(handle, "session_expired");
    assert_eq!(expired.len(), 1);
    assert_eq!(t.transport.disconnected(), vec![handle]);
    assert!(!t.record(&alice).await.online);

    // The transport reports the server-side close afterwards.
    t.engine
        .connection_closed(alice.clone(), handle, CloseReason::Intentional)
        .await
        .unwrap();
    t.settle().await;
    assert_eq!(t.transport.broadcasts_of("presence_offline").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_online_write_is_retried_on_next_heartbeat() {
    let (t, store) = TestEngine::flaky();
    let alice = t.registered("alice").await;
    let handle = ConnectionHandle::new();
    t.transport.add_live(&alice, handle);

    store.fail_next_upserts(1);
    t.engine
        .connection_opened(alice.clone(), handle)
        .await
        .unwrap();
    t.settle().await;

    assert!(!t.record(&alice).await.online);
    assert!(t.transport.broadcasts_of("presence_online").is_empty());
    assert_eq!(t.engine.metrics().store_errors, 1);

    sleep(Duration::from_secs(1)).await;
    t.engine.liveness(alice.clone(), Some(handle)).await.unwrap();
    t.settle().await;

    let record = t.record(&alice).await;
    assert!(record.online);
    assert_eq!(record.connection, Some(handle));
    assert_eq!(t.transport.broadcasts_of("presence_online").len(), 1);
    assert_eq!(t.engine.metrics().store_errors, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_offline_write_is_corrected_by_sweep() {
    let (t, store) = TestEngine::flaky();
    let (alice, handle) = t.connected("alice").await;
    let connected_at = t.record(&alice).await.last_seen;

    t.transport.drop_live(handle);
    store.fail_next_upserts(1);
    t.engine
        .connection_closed(alice.clone(), handle, CloseReason::Transient)
        .await
        .unwrap();

    // Grace expires at 10s but the offline write is lost.
    sleep(Duration::from_secs(11)).await;
    t.settle().await;
    assert!(t.record(&alice).await.online);
    assert!(t.transport.broadcasts_of("presence_offline").is_empty());
    assert_eq!(t.engine.metrics().store_errors, 1);
    assert_eq!(t.engine.snapshot().await.unwrap().bound_sessions, 0);

    // The sweep at 180s is the first to find the record past staleness.
    sleep(Duration::from_secs(170)).await;
    t.settle().await;

    let record = t.record(&alice).await;
    assert!(!record.online);
    assert_eq!(record.connection, None);
    assert_eq!(record.last_seen, connected_at);
    assert_eq!(t.transport.broadcasts_of("presence_offline").len(), 1);

    let metrics = t.engine.metrics();
    assert_eq!(metrics.sweep_corrections, 1);
    assert_eq!(metrics.store_errors, 1);
}
