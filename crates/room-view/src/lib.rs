//! Room view for real-time conferencing rooms
//!
//! This crate projects the state of a joined audio/video room onto a
//! presentation surface. Signaling, transport and media all stay inside the
//! real-time client; the view only consumes its events and issues a handful
//! of commands (priority hints, publish/unpublish, disconnect).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  RoomConnector / RoomSession (real-time client)          │
//! │  ↓ RoomEvent                                             │
//! │  RoomViewSession (tokio event loop)                      │
//! │  ├─ HostListener hooks (unload, page-hide, visibility)   │
//! │  ├─ SessionHandle commands (pin, leave, visibility)      │
//! │  └─ RoomViewController                                   │
//! │     ├─ Roster      (participants and publications)       │
//! │     ├─ Selection   (active / pinned participant)         │
//! │     └─ Attachments (track ↔ surface table)               │
//! │        ↓                                                 │
//! │  PresentationPort + NetworkQualitySink                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use room_view::{
//!     ManualHost, Platform, RoomViewConfig, RoomViewSession, SharedDom, SimulatedRoom,
//!     TracingQualitySink,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> room_view::Result<()> {
//! let room = SimulatedRoom::new("alice");
//! let host = ManualHost::new(Platform::Desktop);
//!
//! let (session, handle) = RoomViewSession::connect(
//!     Arc::new(room.clone()),
//!     "access-token",
//!     RoomViewConfig::new("standup"),
//!     Box::new(SharedDom::new()),
//!     Box::new(TracingQualitySink),
//!     &host,
//! )
//! .await?;
//!
//! let joined = tokio::spawn(session.run());
//! let bob = room.join("bob", true);
//! handle.toggle_pin(&bob).await?;
//! handle.leave().await?;
//! # let _ = joined.await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod attachments;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod presentation;
pub mod quality;
pub mod roster;
pub mod sdk;
pub mod selection;
pub mod session;
pub mod sim;

// Re-exports for public API
pub use config::{ConfigError, ConnectOptions, Platform, RoomViewConfig, VideoDeviceConfig};
pub use controller::{CameraStatus, PresentationState, RoomViewController};
pub use error::{DisconnectReason, Error, Result};
pub use host::{HostEnvironment, HostEvent, HostEventKind, HostListener, ManualHost, Visibility};
pub use presentation::{DomModel, PresentationPort, SharedDom, Surface};
pub use quality::{
    CollectingQualitySink, NetworkQualityReport, NetworkQualitySink, TracingQualitySink,
};
pub use sdk::{
    MediaTrack, ParticipantSid, RoomConnector, RoomEvent, RoomSession, TrackHandle, TrackKind,
    TrackPriority, TrackSid,
};
pub use selection::ActiveParticipant;
pub use session::{RoomViewSession, SessionHandle};
pub use sim::SimulatedRoom;

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
