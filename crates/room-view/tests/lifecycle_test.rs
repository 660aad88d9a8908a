//! Session lifecycle integration tests
//!
//! Connect failures, leave and disconnect teardown, host hooks and the
//! mobile camera release/re-acquire cycle.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p room-view --test lifecycle_test
//! ```

mod harness;

use harness::RoomHarness;
use room_view::{
    CameraStatus, CollectingQualitySink, Error, HostEvent, HostEventKind, ManualHost, Platform,
    RoomViewConfig, RoomViewSession, SharedDom, SimulatedRoom, TrackKind, Visibility,
};
use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// Connect
// ============================================================================

#[tokio::test]
async fn test_connect_failure_surfaces_to_caller() {
    harness::init_logging();
    let room = SimulatedRoom::new("alice").reject_connect("no media devices available");
    let dom = SharedDom::new();
    let host = ManualHost::new(Platform::Mobile);

    let result = RoomViewSession::connect(
        Arc::new(room),
        "token",
        RoomViewConfig::new("integration"),
        Box::new(dom.clone()),
        Box::new(CollectingQualitySink::new()),
        &host,
    )
    .await;

    match result {
        Err(e) => {
            assert!(e.is_fatal());
            assert!(matches!(e, Error::Connection(_)));
        }
        Ok(_) => panic!("connect should have been rejected"),
    }
    assert!(dom.snapshot().containers.is_empty());
    assert_eq!(host.listener_count(), 0);
}

#[tokio::test]
async fn test_connect_renders_existing_participants() {
    let room = SimulatedRoom::new("alice")
        .with_participant("bob", true)
        .with_participant("carol", false);
    let mut h = RoomHarness::start(room, Platform::Desktop).await;

    let page = h.page();
    assert_eq!(page.containers.len(), 3);
    let identities: Vec<_> = page.containers.iter().map(|c| c.identity.as_str()).collect();
    assert_eq!(identities, vec!["alice", "bob", "carol"]);
    assert!(page.containers.iter().all(|c| c.audio.visible));

    let options = h.room.connect_options().unwrap();
    assert_eq!(options.name, "integration");
    assert_eq!((options.network_quality.local, options.network_quality.remote), (3, 3));
    assert!(options.dominant_speaker);

    h.leave().await.unwrap();
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_leave_clears_page_and_stops_camera() {
    let room = SimulatedRoom::new("alice").with_participant("bob", true);
    let mut h = RoomHarness::start(room, Platform::Mobile).await;
    let camera = h.room.created_tracks()[1].clone();
    assert_eq!(camera.kind(), TrackKind::Video);
    assert_eq!(h.host.listener_count(), 3);

    h.leave().await.unwrap();

    assert!(camera.is_stopped());
    assert_eq!(h.room.disconnect_count(), 1);
    assert_eq!(h.host.listener_count(), 0);
    let page = h.page();
    assert!(page.containers.is_empty());
    assert!(page.main.source.is_none());
    assert!(!page.main.visible);
    assert_eq!(page.attached_node_count(), 0);

    // A second leave is a no-op, every other command reports the closed session
    h.handle.leave().await.unwrap();
    assert_eq!(h.room.disconnect_count(), 1);
    assert!(matches!(
        h.handle.toggle_pin(&h.room.local_sid()).await,
        Err(Error::SessionClosed)
    ));
    assert!(matches!(
        h.handle.set_visibility(Visibility::Hidden).await,
        Err(Error::SessionClosed)
    ));
}

#[tokio::test]
async fn test_abnormal_disconnect_resolves_join_with_error() {
    let mut h = RoomHarness::start(SimulatedRoom::new("alice"), Platform::Mobile).await;
    let bob = h.room.join("bob", true);
    h.handle.toggle_pin(&bob).await.unwrap();

    h.room.fail(Some(53000), "signaling connection lost");
    let err = h.outcome().await.unwrap_err();

    assert!(err.is_fatal());
    match err {
        Error::Disconnected(reason) => {
            assert_eq!(reason.code, Some(53000));
            assert_eq!(reason.message, "signaling connection lost");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(h.page().containers.is_empty());
    assert_eq!(h.host.listener_count(), 0);
    assert!(h.room.created_tracks()[1].is_stopped());
}

#[tokio::test]
async fn test_before_unload_leaves_room() {
    let mut h = RoomHarness::start(SimulatedRoom::new("alice"), Platform::Desktop).await;
    assert_eq!(h.host.listener_count_for(HostEventKind::BeforeUnload), 1);
    assert_eq!(h.host.listener_count_for(HostEventKind::VisibilityChange), 0);

    h.host.fire(HostEvent::BeforeUnload);
    h.outcome().await.unwrap();

    assert_eq!(h.room.disconnect_count(), 1);
    assert_eq!(h.host.listener_count(), 0);
    assert!(h.page().containers.is_empty());
}

#[tokio::test]
async fn test_page_hide_leaves_room_on_mobile() {
    let mut h = RoomHarness::start(SimulatedRoom::new("alice"), Platform::Mobile).await;

    h.host.fire(HostEvent::PageHide);
    h.outcome().await.unwrap();

    assert_eq!(h.room.disconnect_count(), 1);
    assert_eq!(h.host.listener_count(), 0);
}

#[tokio::test]
async fn test_repeated_join_leave_cycles_release_hooks() {
    let host = ManualHost::new(Platform::Mobile);

    for _ in 0..3 {
        let room = SimulatedRoom::new("alice");
        let (session, handle) = RoomViewSession::connect(
            Arc::new(room),
            "token",
            RoomViewConfig::new("integration"),
            Box::new(SharedDom::new()),
            Box::new(CollectingQualitySink::new()),
            &host,
        )
        .await
        .unwrap();
        assert_eq!(host.listener_count(), 3);

        let joined = tokio::spawn(session.run());
        handle.leave().await.unwrap();
        joined.await.unwrap().unwrap();
        assert_eq!(host.listener_count(), 0);
    }
}

// ============================================================================
// Mobile camera handling
// ============================================================================

#[tokio::test]
async fn test_visibility_cycles_do_not_leak_tracks() {
    let mut h = RoomHarness::start(SimulatedRoom::new("alice"), Platform::Mobile).await;
    let local = h.room.local_sid();

    for cycle in 1..=3 {
        h.handle.set_visibility(Visibility::Hidden).await.unwrap();
        let state = h.state().await;
        assert_eq!(state.camera, CameraStatus::Released);
        assert!(h
            .room
            .local_publications()
            .iter()
            .all(|t| t.kind() != TrackKind::Video));
        assert!(!h.page().main.visible);

        h.handle.set_visibility(Visibility::Visible).await.unwrap();
        let state = h.state().await;
        assert_eq!(state.camera, CameraStatus::Live);

        let live_video: Vec<_> = h
            .room
            .local_publications()
            .into_iter()
            .filter(|t| t.kind() == TrackKind::Video)
            .collect();
        assert_eq!(live_video.len(), 1, "cycle {}", cycle);
        assert!(!live_video[0].is_stopped());
        assert_eq!(h.room.published().len(), cycle);

        // Every camera but the newest one has been stopped
        let cameras: Vec<_> = h
            .room
            .created_tracks()
            .into_iter()
            .filter(|t| t.kind() == TrackKind::Video)
            .collect();
        assert_eq!(cameras.len(), cycle + 1);
        assert!(cameras[..cycle].iter().all(|t| t.is_stopped()));

        let page = h.page();
        assert!(page.main.visible);
        assert_eq!(page.main.source.as_ref(), Some(live_video[0].sid()));
        assert_eq!(page.container(&local).unwrap().video.attached.len(), 1);
    }

    let published: HashSet<_> = h.room.published().into_iter().collect();
    assert_eq!(published.len(), 3);

    h.leave().await.unwrap();
}

#[tokio::test]
async fn test_host_visibility_events_drive_camera() {
    let mut h = RoomHarness::start(SimulatedRoom::new("alice"), Platform::Mobile).await;
    let first_camera = h.room.created_tracks()[1].clone();

    assert_eq!(h.host.fire(HostEvent::VisibilityChanged(Visibility::Hidden)), 1);
    h.wait_for_camera(CameraStatus::Released).await;
    assert!(first_camera.is_stopped());
    assert!(h.room.unpublished().contains(first_camera.sid()));

    h.host.fire(HostEvent::VisibilityChanged(Visibility::Visible));
    h.wait_for_camera(CameraStatus::Live).await;
    assert_eq!(h.room.published().len(), 1);

    h.leave().await.unwrap();
}

#[tokio::test]
async fn test_camera_failure_rejects_visibility_change() {
    let mut h = RoomHarness::start(SimulatedRoom::new("alice"), Platform::Mobile).await;
    h.room.reject_camera(Some("NotAllowedError"));

    h.handle.set_visibility(Visibility::Hidden).await.unwrap();
    let err = h
        .handle
        .set_visibility(Visibility::Visible)
        .await
        .unwrap_err();
    assert!(err.is_device_error());
    assert!(!err.is_fatal());

    // The session is still up and nothing was published
    let state = h.state().await;
    assert_eq!(state.camera, CameraStatus::Released);
    assert!(h.room.published().is_empty());

    h.leave().await.unwrap();
}

#[tokio::test]
async fn test_publish_failure_stops_new_camera() {
    let mut h = RoomHarness::start(SimulatedRoom::new("alice"), Platform::Mobile).await;
    h.room.reject_publish(Some("track limit reached"));

    h.handle.set_visibility(Visibility::Hidden).await.unwrap();
    let err = h
        .handle
        .set_visibility(Visibility::Visible)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Publish(_)));

    let cameras = h.room.created_tracks();
    assert!(cameras.iter().all(|t| t.is_stopped() || t.kind() != TrackKind::Video));

    h.leave().await.unwrap();
}

#[tokio::test]
async fn test_hidden_again_during_reacquire_rolls_back() {
    let mut h = RoomHarness::start(SimulatedRoom::new("alice"), Platform::Mobile).await;
    h.handle.set_visibility(Visibility::Hidden).await.unwrap();

    h.room.hold_camera();
    let handle = h.handle.clone();
    let visible = tokio::spawn(async move { handle.set_visibility(Visibility::Visible).await });
    h.wait_for_camera(CameraStatus::Acquiring).await;

    h.handle.set_visibility(Visibility::Hidden).await.unwrap();
    h.room.release_camera();
    visible.await.unwrap().unwrap();

    let state = h.state().await;
    assert_eq!(state.camera, CameraStatus::Released);
    let late_camera = h.room.created_tracks().last().cloned().unwrap();
    assert!(late_camera.is_stopped());
    assert!(h.room.unpublished().contains(late_camera.sid()));
    assert!(h
        .room
        .local_publications()
        .iter()
        .all(|t| t.kind() != TrackKind::Video));

    h.leave().await.unwrap();
}

#[tokio::test]
async fn test_leave_during_reacquire_releases_late_camera() {
    let mut h = RoomHarness::start(SimulatedRoom::new("alice"), Platform::Mobile).await;
    h.handle.set_visibility(Visibility::Hidden).await.unwrap();

    h.room.hold_camera();
    let handle = h.handle.clone();
    let visible = tokio::spawn(async move { handle.set_visibility(Visibility::Visible).await });
    h.wait_for_camera(CameraStatus::Acquiring).await;

    h.leave().await.unwrap();
    assert!(matches!(
        visible.await.unwrap(),
        Err(Error::SessionClosed)
    ));

    h.room.release_camera();
    for _ in 0..100 {
        if h.room.created_tracks().len() == 3 {
            break;
        }
        tokio::task::yield_now().await;
    }
    // The acquisition task finishes on its own; give it a moment to roll back
    for _ in 0..100 {
        if h.room.created_tracks().last().is_some_and(|t| t.is_stopped()) {
            break;
        }
        tokio::task::yield_now().await;
    }

    let late_camera = h.room.created_tracks().last().cloned().unwrap();
    assert_eq!(h.room.created_tracks().len(), 3);
    assert!(late_camera.is_stopped());
    assert!(h.room.unpublished().contains(late_camera.sid()));
}

#[tokio::test]
async fn test_desktop_ignores_missing_visibility_hooks() {
    let mut h = RoomHarness::start(SimulatedRoom::new("alice"), Platform::Desktop).await;

    assert_eq!(h.host.fire(HostEvent::VisibilityChanged(Visibility::Hidden)), 0);
    assert_eq!(h.state().await.camera, CameraStatus::Live);

    h.leave().await.unwrap();
}

#[tokio::test]
async fn test_desktop_visibility_command_keeps_camera() {
    let mut h = RoomHarness::start(SimulatedRoom::new("alice"), Platform::Desktop).await;
    let camera = h.room.created_tracks()[1].clone();

    h.handle.set_visibility(Visibility::Hidden).await.unwrap();
    assert_eq!(h.state().await.camera, CameraStatus::Live);
    assert!(!camera.is_stopped());
    assert!(h.room.unpublished().is_empty());

    h.handle.set_visibility(Visibility::Visible).await.unwrap();
    assert_eq!(h.room.created_tracks().len(), 2);

    h.leave().await.unwrap();
}
