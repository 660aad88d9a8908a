//! Collaborator port
//!
//! The real-time media client (signaling, negotiation, subscription,
//! network-quality scoring) lives behind these traits. The room view only
//! consumes its events and issues the handful of commands below.

use crate::config::{ConnectOptions, VideoDeviceConfig};
use crate::error::{DisconnectReason, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

macro_rules! sid_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(sid: impl Into<String>) -> Self {
                Self(sid.into())
            }

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
            fn from(sid: &str) -> Self {
                Self(sid.to_string())
            }
        }

        impl From<String> for $name {
            fn from(sid: String) -> Self {
                Self(sid)
            }
        }
    };
}

sid_type!(
    /// Session id of a participant, unique within a room
    ParticipantSid
);

sid_type!(
    /// Session id of a published track
    TrackSid
);

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
    Data,
}

impl TrackKind {
    /// Whether tracks of this kind render into a media slot
    pub fn is_media(&self) -> bool {
        !matches!(self, TrackKind::Data)
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
            TrackKind::Data => f.write_str("data"),
        }
    }
}

/// Subscriber-side priority hint for the bandwidth allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackPriority {
    Low,
    Standard,
    High,
}

/// A media track owned by the collaborator
///
/// Local tracks can be stopped to release the capturing device; remote
/// tracks ignore `stop`.
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn sid(&self) -> &TrackSid;

    fn kind(&self) -> TrackKind;

    fn name(&self) -> &str;

    /// Stop capture and release the device
    fn stop(&self);

    fn is_stopped(&self) -> bool;
}

/// Shared handle to a collaborator track
pub type TrackHandle = Arc<dyn MediaTrack>;

/// An announced track; `track` is `None` until subscription completes
#[derive(Debug, Clone)]
pub struct PublicationSnapshot {
    pub track_sid: TrackSid,
    pub kind: TrackKind,
    pub track_name: String,
    pub track: Option<TrackHandle>,
}

/// State of a participant at the moment it becomes visible to the view
#[derive(Debug, Clone)]
pub struct ParticipantSnapshot {
    pub sid: ParticipantSid,
    pub identity: String,
    pub publications: Vec<PublicationSnapshot>,
    pub network_quality_level: Option<u8>,
}

/// State of the room right after a successful connect
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub name: String,
    pub local: ParticipantSnapshot,
    pub participants: Vec<ParticipantSnapshot>,
    pub dominant_speaker: Option<ParticipantSid>,
}

/// Everything the collaborator reports after connect
#[derive(Debug, Clone)]
pub enum RoomEvent {
    ParticipantConnected(ParticipantSnapshot),
    ParticipantDisconnected(ParticipantSid),
    /// `None` when nobody is speaking
    DominantSpeakerChanged(Option<ParticipantSid>),
    TrackPublished {
        participant: ParticipantSid,
        publication: PublicationSnapshot,
    },
    TrackUnpublished {
        participant: ParticipantSid,
        track_sid: TrackSid,
    },
    TrackSubscribed {
        participant: ParticipantSid,
        track_sid: TrackSid,
        track: TrackHandle,
    },
    TrackUnsubscribed {
        participant: ParticipantSid,
        track_sid: TrackSid,
    },
    NetworkQualityLevelChanged {
        participant: ParticipantSid,
        level: u8,
    },
    /// Session over; `Some` when the collaborator ended it abnormally
    Disconnected(Option<DisconnectReason>),
}

impl RoomEvent {
    /// Short label used in logs
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::ParticipantConnected(_) => "participantConnected",
            RoomEvent::ParticipantDisconnected(_) => "participantDisconnected",
            RoomEvent::DominantSpeakerChanged(_) => "dominantSpeakerChanged",
            RoomEvent::TrackPublished { .. } => "trackPublished",
            RoomEvent::TrackUnpublished { .. } => "trackUnpublished",
            RoomEvent::TrackSubscribed { .. } => "subscribed",
            RoomEvent::TrackUnsubscribed { .. } => "unsubscribed",
            RoomEvent::NetworkQualityLevelChanged { .. } => "networkQualityLevelChanged",
            RoomEvent::Disconnected(_) => "disconnected",
        }
    }
}

/// A joined room as returned by [`RoomConnector::connect`]
pub struct Connection {
    pub session: Arc<dyn RoomSession>,
    pub snapshot: RoomSnapshot,
    pub events: mpsc::UnboundedReceiver<RoomEvent>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

/// Entry point of the collaborator
#[async_trait]
pub trait RoomConnector: Send + Sync {
    /// Join a room
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the credential is rejected or no media
    /// device can be opened.
    async fn connect(&self, token: &str, options: &ConnectOptions) -> Result<Connection>;

    /// Open the camera described by `device`
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if the camera cannot be acquired.
    async fn create_local_video_track(&self, device: &VideoDeviceConfig) -> Result<TrackHandle>;
}

/// Commands on a joined room
#[async_trait]
pub trait RoomSession: Send + Sync {
    /// Advisory priority hint; may be a no-op in peer-to-peer rooms
    fn set_track_priority(
        &self,
        participant: &ParticipantSid,
        track: &TrackSid,
        priority: TrackPriority,
    ) -> Result<()>;

    /// Publish a local track and return its publication
    async fn publish_track(&self, track: TrackHandle) -> Result<PublicationSnapshot>;

    fn unpublish_track(&self, track: &TrackSid) -> Result<()>;

    fn disconnect(&self);
}
