//! In-memory collaborator
//!
//! [`SimulatedRoom`] implements [`RoomConnector`] and hands out a
//! [`RoomSession`] that records every command it receives. The owner drives
//! the room by emitting events (participants joining, tracks being
//! subscribed, speakers changing) the way the real service would.

use crate::config::{ConnectOptions, VideoDeviceConfig};
use crate::error::{DisconnectReason, Error, Result};
use crate::sdk::{
    Connection, MediaTrack, ParticipantSid, ParticipantSnapshot, PublicationSnapshot, RoomConnector,
    RoomEvent, RoomSession, RoomSnapshot, TrackHandle, TrackKind, TrackPriority, TrackSid,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};

/// A track that only remembers whether it was stopped
#[derive(Debug)]
pub struct SimTrack {
    sid: TrackSid,
    kind: TrackKind,
    name: String,
    stopped: AtomicBool,
}

impl SimTrack {
    pub fn new(sid: impl Into<TrackSid>, kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            kind,
            name: name.into(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn handle(sid: impl Into<TrackSid>, kind: TrackKind, name: impl Into<String>) -> TrackHandle {
        Arc::new(Self::new(sid, kind, name))
    }
}

impl MediaTrack for SimTrack {
    fn sid(&self) -> &TrackSid {
        &self.sid
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A priority hint the simulated room received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityRequest {
    pub participant: ParticipantSid,
    pub track: TrackSid,
    pub priority: TrackPriority,
}

/// Knobs and recordings of a simulated room
#[derive(Debug, Default)]
struct SimState {
    local_sid: ParticipantSid,
    local_identity: String,
    remote: Vec<ParticipantSnapshot>,
    dominant_speaker: Option<ParticipantSid>,

    reject_connect: Option<String>,
    reject_camera: Option<String>,
    reject_publish: Option<String>,
    peer_to_peer: bool,

    events: Option<mpsc::UnboundedSender<RoomEvent>>,
    connect_options: Option<ConnectOptions>,
    token: Option<String>,
    local_publications: Vec<TrackHandle>,
    created_tracks: Vec<TrackHandle>,
    published: Vec<TrackSid>,
    unpublished: Vec<TrackSid>,
    priorities: Vec<PriorityRequest>,
    disconnects: usize,
}

/// Scriptable stand-in for the real-time media service
#[derive(Clone)]
pub struct SimulatedRoom {
    state: Arc<Mutex<SimState>>,
    camera_gate: Arc<Notify>,
    camera_held: Arc<AtomicBool>,
}

fn new_participant_sid() -> ParticipantSid {
    ParticipantSid::new(format!("PA{}", uuid::Uuid::new_v4().simple()))
}

fn new_track_sid() -> TrackSid {
    TrackSid::new(format!("MT{}", uuid::Uuid::new_v4().simple()))
}

impl SimulatedRoom {
    /// A room the local participant `identity` will join
    pub fn new(identity: impl Into<String>) -> Self {
        let state = SimState {
            local_sid: new_participant_sid(),
            local_identity: identity.into(),
            ..SimState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            camera_gate: Arc::new(Notify::new()),
            camera_held: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn local_sid(&self) -> ParticipantSid {
        self.state.lock().local_sid.clone()
    }

    /// Add a participant that is already in the room when we connect
    pub fn with_participant(self, identity: &str, video: bool) -> Self {
        let snapshot = remote_snapshot(identity, video, true);
        self.state.lock().remote.push(snapshot);
        self
    }

    /// Session ids of the participants added with [`Self::with_participant`]
    pub fn initial_participants(&self) -> Vec<ParticipantSid> {
        self.state.lock().remote.iter().map(|p| p.sid.clone()).collect()
    }

    /// Dominant speaker reported at connect time
    pub fn with_dominant_speaker(self, sid: Option<ParticipantSid>) -> Self {
        self.state.lock().dominant_speaker = sid;
        self
    }

    /// Make connect fail with `Error::Connection`
    pub fn reject_connect(self, reason: &str) -> Self {
        self.state.lock().reject_connect = Some(reason.to_string());
        self
    }

    /// Make camera acquisition fail with `Error::Device`
    pub fn reject_camera(&self, reason: Option<&str>) {
        self.state.lock().reject_camera = reason.map(str::to_string);
    }

    pub fn reject_publish(&self, reason: Option<&str>) {
        self.state.lock().reject_publish = reason.map(str::to_string);
    }

    /// Peer-to-peer rooms have no bandwidth allocator; priority hints fail
    pub fn peer_to_peer(self) -> Self {
        self.state.lock().peer_to_peer = true;
        self
    }

    /// Park camera acquisition until [`Self::release_camera`]
    pub fn hold_camera(&self) {
        self.camera_held.store(true, Ordering::SeqCst);
    }

    pub fn release_camera(&self) {
        self.camera_held.store(false, Ordering::SeqCst);
        self.camera_gate.notify_one();
    }

    /// Deliver an event to the connected view; false if nobody listens
    pub fn emit(&self, event: RoomEvent) -> bool {
        let state = self.state.lock();
        match &state.events {
            Some(tx) => {
                debug!("Simulated room emitting {}", event.name());
                tx.send(event).is_ok()
            }
            None => false,
        }
    }

    /// A participant joins with an audio track and optionally a video track,
    /// both already subscribed
    pub fn join(&self, identity: &str, video: bool) -> ParticipantSid {
        let snapshot = remote_snapshot(identity, video, true);
        let sid = snapshot.sid.clone();
        self.emit(RoomEvent::ParticipantConnected(snapshot));
        sid
    }

    pub fn leave(&self, participant: &ParticipantSid) {
        self.emit(RoomEvent::ParticipantDisconnected(participant.clone()));
    }

    pub fn set_dominant_speaker(&self, speaker: Option<&ParticipantSid>) {
        self.emit(RoomEvent::DominantSpeakerChanged(speaker.cloned()));
    }

    /// Announce a track that is not subscribed yet
    pub fn publish(&self, participant: &ParticipantSid, kind: TrackKind) -> TrackSid {
        let track_sid = new_track_sid();
        self.emit(RoomEvent::TrackPublished {
            participant: participant.clone(),
            publication: PublicationSnapshot {
                track_sid: track_sid.clone(),
                kind,
                track_name: kind.to_string(),
                track: None,
            },
        });
        track_sid
    }

    pub fn subscribe(&self, participant: &ParticipantSid, track_sid: &TrackSid, kind: TrackKind) {
        self.emit(RoomEvent::TrackSubscribed {
            participant: participant.clone(),
            track_sid: track_sid.clone(),
            track: SimTrack::handle(track_sid.clone(), kind, kind.to_string()),
        });
    }

    pub fn unsubscribe(&self, participant: &ParticipantSid, track_sid: &TrackSid) {
        self.emit(RoomEvent::TrackUnsubscribed {
            participant: participant.clone(),
            track_sid: track_sid.clone(),
        });
    }

    pub fn unpublish(&self, participant: &ParticipantSid, track_sid: &TrackSid) {
        self.emit(RoomEvent::TrackUnpublished {
            participant: participant.clone(),
            track_sid: track_sid.clone(),
        });
    }

    pub fn network_quality(&self, participant: &ParticipantSid, level: u8) {
        self.emit(RoomEvent::NetworkQualityLevelChanged {
            participant: participant.clone(),
            level,
        });
    }

    /// End the session abnormally
    pub fn fail(&self, code: Option<u32>, message: &str) {
        self.emit(RoomEvent::Disconnected(Some(DisconnectReason::new(code, message))));
    }

    pub fn connect_options(&self) -> Option<ConnectOptions> {
        self.state.lock().connect_options.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    pub fn priority_requests(&self) -> Vec<PriorityRequest> {
        self.state.lock().priorities.clone()
    }

    /// Local tracks currently published
    pub fn local_publications(&self) -> Vec<TrackHandle> {
        self.state.lock().local_publications.clone()
    }

    /// Every local track the simulated devices ever produced
    pub fn created_tracks(&self) -> Vec<TrackHandle> {
        self.state.lock().created_tracks.clone()
    }

    pub fn published(&self) -> Vec<TrackSid> {
        self.state.lock().published.clone()
    }

    pub fn unpublished(&self) -> Vec<TrackSid> {
        self.state.lock().unpublished.clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.lock().disconnects
    }
}

fn remote_snapshot(identity: &str, video: bool, subscribed: bool) -> ParticipantSnapshot {
    let mut publications = vec![publication(TrackKind::Audio, subscribed)];
    if video {
        publications.push(publication(TrackKind::Video, subscribed));
    }
    ParticipantSnapshot {
        sid: new_participant_sid(),
        identity: identity.to_string(),
        publications,
        network_quality_level: None,
    }
}

fn publication(kind: TrackKind, subscribed: bool) -> PublicationSnapshot {
    let track_sid = new_track_sid();
    PublicationSnapshot {
        track: subscribed.then(|| SimTrack::handle(track_sid.clone(), kind, kind.to_string())),
        track_sid,
        kind,
        track_name: kind.to_string(),
    }
}

fn local_publication(track: &TrackHandle) -> PublicationSnapshot {
    PublicationSnapshot {
        track_sid: track.sid().clone(),
        kind: track.kind(),
        track_name: track.name().to_string(),
        track: Some(Arc::clone(track)),
    }
}

#[async_trait]
impl RoomConnector for SimulatedRoom {
    async fn connect(&self, token: &str, options: &ConnectOptions) -> Result<Connection> {
        let mut state = self.state.lock();

        if let Some(reason) = &state.reject_connect {
            return Err(Error::Connection(reason.clone()));
        }

        info!("Simulated room '{}' accepting connection", options.name);
        state.token = Some(token.to_string());
        state.connect_options = Some(options.clone());

        let mut local_tracks = Vec::new();
        if options.audio.is_some() {
            local_tracks.push(SimTrack::handle(new_track_sid(), TrackKind::Audio, "microphone"));
        }
        if let Some(video) = &options.video {
            local_tracks.push(SimTrack::handle(new_track_sid(), TrackKind::Video, video.name.clone()));
        }
        state.created_tracks.extend(local_tracks.iter().cloned());
        state.local_publications = local_tracks.clone();

        let (tx, rx) = mpsc::unbounded_channel();
        state.events = Some(tx);

        let snapshot = RoomSnapshot {
            name: options.name.clone(),
            local: ParticipantSnapshot {
                sid: state.local_sid.clone(),
                identity: state.local_identity.clone(),
                publications: local_tracks.iter().map(local_publication).collect(),
                network_quality_level: None,
            },
            participants: state.remote.clone(),
            dominant_speaker: state.dominant_speaker.clone(),
        };

        Ok(Connection {
            session: Arc::new(SimSession {
                state: Arc::clone(&self.state),
            }),
            snapshot,
            events: rx,
        })
    }

    async fn create_local_video_track(&self, device: &VideoDeviceConfig) -> Result<TrackHandle> {
        if self.camera_held.load(Ordering::SeqCst) {
            self.camera_gate.notified().await;
        }

        let mut state = self.state.lock();
        if let Some(reason) = &state.reject_camera {
            return Err(Error::Device(reason.clone()));
        }

        let track = SimTrack::handle(new_track_sid(), TrackKind::Video, device.name.clone());
        state.created_tracks.push(Arc::clone(&track));
        Ok(track)
    }
}

/// Session handed out by [`SimulatedRoom::connect`]
struct SimSession {
    state: Arc<Mutex<SimState>>,
}

#[async_trait]
impl RoomSession for SimSession {
    fn set_track_priority(
        &self,
        participant: &ParticipantSid,
        track: &TrackSid,
        priority: TrackPriority,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.peer_to_peer {
            return Err(Error::Other(anyhow::anyhow!(
                "track priority is not supported in peer-to-peer rooms"
            )));
        }
        state.priorities.push(PriorityRequest {
            participant: participant.clone(),
            track: track.clone(),
            priority,
        });
        Ok(())
    }

    async fn publish_track(&self, track: TrackHandle) -> Result<PublicationSnapshot> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.reject_publish {
            return Err(Error::Publish(reason.clone()));
        }
        if !state
            .local_publications
            .iter()
            .any(|t| t.sid() == track.sid())
        {
            state.local_publications.push(Arc::clone(&track));
        }
        state.published.push(track.sid().clone());
        Ok(local_publication(&track))
    }

    fn unpublish_track(&self, track: &TrackSid) -> Result<()> {
        let mut state = self.state.lock();
        state.local_publications.retain(|t| t.sid() != track);
        state.unpublished.push(track.clone());
        Ok(())
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        state.disconnects += 1;
        if let Some(tx) = state.events.take() {
            let _ = tx.send(RoomEvent::Disconnected(None));
        }
    }
}
