//! Shared setup for room view integration tests
//!
//! Runs a full [`RoomViewSession`] against a [`SimulatedRoom`], an in-memory
//! page and a manually driven host.

#![allow(dead_code)]

use room_view::{
    CameraStatus, CollectingQualitySink, DomModel, ManualHost, Platform, PresentationState,
    Result, RoomViewConfig, RoomViewSession, SessionHandle, SharedDom, SimulatedRoom,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Initialize test logging (safe to call from every test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,room_view=debug")
        .with_test_writer()
        .try_init();
}

pub struct RoomHarness {
    pub room: SimulatedRoom,
    pub dom: SharedDom,
    pub quality: CollectingQualitySink,
    pub host: ManualHost,
    pub handle: SessionHandle,
    task: JoinHandle<Result<()>>,
}

impl RoomHarness {
    pub async fn start(room: SimulatedRoom, platform: Platform) -> Self {
        let mut config = RoomViewConfig::new("integration");
        config.platform = platform;
        Self::start_with(room, config).await
    }

    pub async fn start_with(room: SimulatedRoom, config: RoomViewConfig) -> Self {
        init_logging();

        let dom = SharedDom::new();
        let quality = CollectingQualitySink::new();
        let host = ManualHost::new(config.platform);
        let (session, handle) = RoomViewSession::connect(
            Arc::new(room.clone()),
            "integration-token",
            config,
            Box::new(dom.clone()),
            Box::new(quality.clone()),
            &host,
        )
        .await
        .expect("connect to simulated room");

        Self {
            room,
            dom,
            quality,
            host,
            handle,
            task: tokio::spawn(session.run()),
        }
    }

    /// Presentation state once every event emitted so far has been applied
    pub async fn state(&self) -> PresentationState {
        self.handle.snapshot().await.expect("session is running")
    }

    pub fn page(&self) -> DomModel {
        self.dom.snapshot()
    }

    /// Poll until the camera reaches `status`
    pub async fn wait_for_camera(&self, status: CameraStatus) {
        for _ in 0..100 {
            if self.state().await.camera == status {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("camera never reached {:?}", status);
    }

    /// Leave the room and return the join outcome
    pub async fn leave(&mut self) -> Result<()> {
        self.handle.leave().await?;
        self.outcome().await
    }

    /// Wait for the session to end on its own
    pub async fn outcome(&mut self) -> Result<()> {
        (&mut self.task).await.expect("session task panicked")
    }
}
