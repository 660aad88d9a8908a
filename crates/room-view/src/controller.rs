//! Room view controller
//!
//! Projects collaborator events onto the presentation port: one container per
//! participant, tracks attached to their slots, and the active participant on
//! the main surface. All methods run on the session's event loop; nothing
//! here awaits.

use crate::attachments::Attachments;
use crate::error::{DisconnectReason, Error, Result};
use crate::presentation::{PresentationPort, Surface};
use crate::quality::{NetworkQualityReport, NetworkQualitySink};
use crate::roster::{ParticipantEntry, PublicationEntry, Roster};
use crate::sdk::{
    ParticipantSid, ParticipantSnapshot, PublicationSnapshot, RoomEvent, RoomSession, RoomSnapshot,
    TrackHandle, TrackKind, TrackPriority, TrackSid,
};
use crate::selection::{ActiveParticipant, PinToggle, Selection};
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Local camera as seen by the view
#[derive(Debug, Clone)]
enum Camera {
    /// Joined without a camera
    Off,
    Live(TrackHandle),
    /// Stopped and unpublished while the page is hidden
    Released,
    /// Re-acquisition number `n` is in flight
    Acquiring(u64),
}

/// Camera state for snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Off,
    Live,
    Released,
    Acquiring,
}

/// Track as listed in a [`PresentationState`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    pub sid: TrackSid,
    pub kind: TrackKind,
    pub subscribed: bool,
}

/// Participant as listed in a [`PresentationState`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantSummary {
    pub sid: ParticipantSid,
    pub identity: String,
    pub is_local: bool,
    pub network_quality_level: Option<u8>,
    pub tracks: Vec<TrackSummary>,
}

/// Read-only view of the controller's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentationState {
    pub active: ActiveParticipant,
    pub dominant_speaker: Option<ParticipantSid>,
    pub participants: Vec<ParticipantSummary>,
    pub camera: CameraStatus,
}

impl PresentationState {
    pub fn active_sid(&self) -> Option<&ParticipantSid> {
        self.active.sid()
    }

    pub fn is_pinned(&self) -> bool {
        self.active.is_pinned()
    }
}

/// Presentation state machine for one joined room
pub struct RoomViewController {
    room: Arc<dyn RoomSession>,
    presenter: Box<dyn PresentationPort>,
    quality: Box<dyn NetworkQualitySink>,
    roster: Roster,
    selection: Selection,
    attachments: Attachments,
    camera: Camera,
    camera_generation: u64,
    closed: bool,
}

impl RoomViewController {
    /// Build the view for a freshly joined room
    ///
    /// Renders the local participant, then everyone already in the room, then
    /// selects the active participant.
    pub fn new(
        room: Arc<dyn RoomSession>,
        snapshot: RoomSnapshot,
        presenter: Box<dyn PresentationPort>,
        quality: Box<dyn NetworkQualitySink>,
    ) -> Self {
        let local = ParticipantEntry::new(
            snapshot.local.sid.clone(),
            snapshot.local.identity.clone(),
            true,
        );
        let camera = snapshot
            .local
            .publications
            .iter()
            .filter(|p| p.kind == TrackKind::Video)
            .find_map(|p| p.track.clone())
            .map(Camera::Live)
            .unwrap_or(Camera::Off);

        let mut controller = Self {
            room,
            presenter,
            quality,
            roster: Roster::new(local),
            selection: Selection::new(snapshot.dominant_speaker.clone()),
            attachments: Attachments::new(),
            camera,
            camera_generation: 0,
            closed: false,
        };

        controller.presenter.set_visible(&Surface::Main, false);
        controller.render_participant(snapshot.local);
        for participant in snapshot.participants {
            controller.participant_connected(participant);
        }
        controller.set_current_active();

        info!(
            "Joined room '{}' as {} with {} remote participant(s)",
            snapshot.name,
            controller.roster.local_sid(),
            controller.roster.len() - 1
        );
        controller
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Apply one collaborator event
    ///
    /// Breaks with the disconnect reason when the collaborator ends the
    /// session; the caller is expected to call [`Self::teardown`].
    pub fn handle_event(&mut self, event: RoomEvent) -> ControlFlow<Option<DisconnectReason>> {
        if self.closed {
            debug!("Ignoring {} after teardown", event.name());
            return ControlFlow::Continue(());
        }

        match event {
            RoomEvent::ParticipantConnected(snapshot) => self.participant_connected(snapshot),
            RoomEvent::ParticipantDisconnected(sid) => self.participant_disconnected(&sid),
            RoomEvent::DominantSpeakerChanged(speaker) => self.dominant_speaker_changed(speaker),
            RoomEvent::TrackPublished {
                participant,
                publication,
            } => self.track_published(&participant, publication),
            RoomEvent::TrackUnpublished {
                participant,
                track_sid,
            } => self.track_unpublished(&participant, &track_sid),
            RoomEvent::TrackSubscribed {
                participant,
                track_sid,
                track,
            } => self.track_subscribed(&participant, &track_sid, track),
            RoomEvent::TrackUnsubscribed {
                participant,
                track_sid,
            } => self.track_unsubscribed(&participant, &track_sid),
            RoomEvent::NetworkQualityLevelChanged { participant, level } => {
                self.network_quality_changed(&participant, level)
            }
            RoomEvent::Disconnected(reason) => return ControlFlow::Break(reason),
        }

        ControlFlow::Continue(())
    }

    /// A remote participant joined
    pub fn participant_connected(&mut self, snapshot: ParticipantSnapshot) {
        info!("Participant connected: {} ({})", snapshot.identity, snapshot.sid);
        self.render_participant(snapshot);
    }

    fn render_participant(&mut self, snapshot: ParticipantSnapshot) {
        let is_local = &snapshot.sid == self.roster.local_sid();
        let entry = ParticipantEntry::new(snapshot.sid.clone(), snapshot.identity.clone(), is_local);
        if !is_local && !self.roster.insert(entry) {
            warn!("Participant {} is already rendered", snapshot.sid);
            return;
        }

        self.presenter
            .create_container(&snapshot.sid, &snapshot.identity, is_local);

        if let Some(level) = snapshot.network_quality_level {
            self.network_quality_changed(&snapshot.sid, level);
        }

        for publication in snapshot.publications {
            self.track_published(&snapshot.sid, publication);
        }
    }

    /// A remote participant left
    ///
    /// Leaving as the active participant hands the main surface back to the
    /// dominant-speaker rule; a pin on them is dropped first.
    pub fn participant_disconnected(&mut self, sid: &ParticipantSid) {
        if sid == self.roster.local_sid() {
            warn!("Local participant cannot be removed while the room is open");
            return;
        }
        if !self.roster.contains(sid) {
            debug!("Ignoring disconnect of unknown participant {}", sid);
            return;
        }

        info!("Participant disconnected: {}", sid);
        let was_active = self.selection.active().is(sid);
        let was_pinned = was_active && self.selection.is_pinned();

        self.selection.forget_speaker(sid);
        let entry = self.remove_participant(sid);

        if was_active {
            if was_pinned {
                info!("Pinned participant {} left, unpinning", sid);
                self.selection.clear_pin();
            }
            self.set_current_active();
        }
        drop(entry);
    }

    /// Detach a participant's tracks, drop its container and its entry
    fn remove_participant(&mut self, sid: &ParticipantSid) -> Option<ParticipantEntry> {
        let entry = self.roster.remove(sid)?;
        for track in entry.publications().iter().filter_map(|p| p.track.as_ref()) {
            self.attachments
                .detach_everywhere(self.presenter.as_mut(), track.sid());
        }
        self.attachments.forget_participant(sid);
        self.presenter.remove_container(sid);
        Some(entry)
    }

    pub fn dominant_speaker_changed(&mut self, speaker: Option<ParticipantSid>) {
        debug!("Dominant speaker changed: {:?}", speaker);
        self.selection.set_dominant_speaker(speaker);
        if !self.selection.is_pinned() {
            self.set_current_active();
        }
    }

    /// Start listening to a publication and attach its track if subscribed
    pub fn track_published(&mut self, participant: &ParticipantSid, publication: PublicationSnapshot) {
        let Some(entry) = self.roster.get_mut(participant) else {
            debug!("Ignoring publication for unknown participant {}", participant);
            return;
        };

        let entry_publication = PublicationEntry::from(publication);
        let track = entry_publication.track.clone();
        if !entry.add_publication(entry_publication) {
            debug!("Publication already known for {}", participant);
            return;
        }

        if let Some(track) = track {
            self.attach_track(participant, &track);
        }
    }

    /// Stop listening to a publication, detaching its track if needed
    pub fn track_unpublished(&mut self, participant: &ParticipantSid, track_sid: &TrackSid) {
        let removed = self
            .roster
            .get_mut(participant)
            .and_then(|entry| entry.remove_publication(track_sid));

        match removed {
            Some(PublicationEntry {
                track: Some(track), ..
            }) => self.detach_track(participant, &track),
            Some(_) => debug!("Unpublished {} before it was subscribed", track_sid),
            None => debug!("Ignoring unpublish of unknown track {}", track_sid),
        }
    }

    pub fn track_subscribed(
        &mut self,
        participant: &ParticipantSid,
        track_sid: &TrackSid,
        track: TrackHandle,
    ) {
        let Some(publication) = self
            .roster
            .get_mut(participant)
            .and_then(|entry| entry.publication_mut(track_sid))
        else {
            debug!("Ignoring subscription to unlistened track {}", track_sid);
            return;
        };

        publication.track = Some(Arc::clone(&track));
        self.attach_track(participant, &track);
    }

    pub fn track_unsubscribed(&mut self, participant: &ParticipantSid, track_sid: &TrackSid) {
        let track = self
            .roster
            .get_mut(participant)
            .and_then(|entry| entry.publication_mut(track_sid))
            .and_then(|publication| publication.track.take());

        if let Some(track) = track {
            self.detach_track(participant, &track);
        }
    }

    /// Render into the participant's slot, and the main surface if they are
    /// active and it is still empty
    fn attach_track(&mut self, participant: &ParticipantSid, track: &TrackHandle) {
        let kind = track.kind();
        if !kind.is_media() {
            return;
        }

        self.attachments.attach(
            self.presenter.as_mut(),
            Surface::slot(participant, kind),
            track,
        );

        if kind == TrackKind::Video
            && self.selection.active().is(participant)
            && self.attachments.tracks_on(&Surface::Main).is_empty()
        {
            self.attachments
                .attach(self.presenter.as_mut(), Surface::Main, track);
        }
    }

    fn detach_track(&mut self, participant: &ParticipantSid, track: &TrackHandle) {
        let kind = track.kind();
        if !kind.is_media() {
            return;
        }

        self.attachments.detach(
            self.presenter.as_mut(),
            &Surface::slot(participant, kind),
            track.sid(),
        );
        if kind == TrackKind::Video && self.selection.active().is(participant) {
            self.attachments
                .detach(self.presenter.as_mut(), &Surface::Main, track.sid());
        }
    }

    pub fn network_quality_changed(&mut self, participant: &ParticipantSid, level: u8) {
        let Some(entry) = self.roster.get_mut(participant) else {
            debug!("Ignoring network quality for unknown participant {}", participant);
            return;
        };

        entry.network_quality_level = Some(level);
        self.quality.report(NetworkQualityReport {
            participant: participant.clone(),
            identity: entry.identity.clone(),
            level,
            is_local: entry.is_local,
        });
    }

    /// Thumbnail click
    ///
    /// Priority hints are always sent before the pin flag changes: on pin the
    /// previously pinned participant is reset to standard, then the clicked
    /// one is raised to high; on unpin the clicked one is reset to standard.
    pub fn toggle_pin(&mut self, participant: &ParticipantSid) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        if !self.roster.contains(participant) {
            return Err(Error::ParticipantNotFound(participant.to_string()));
        }

        match self.selection.toggle_for(participant) {
            PinToggle::Unpin => {
                info!("Unpinning {}", participant);
                self.set_video_priority(participant, TrackPriority::Standard);
                self.selection.clear_pin();
                self.set_current_active();
            }
            PinToggle::Pin { previous } => {
                info!("Pinning {}", participant);
                if let Some(previous) = previous {
                    self.set_video_priority(&previous, TrackPriority::Standard);
                }
                self.set_video_priority(participant, TrackPriority::High);
                self.set_active(ActiveParticipant::Pinned(participant.clone()));
            }
        }
        Ok(())
    }

    /// Advisory; failures are expected in peer-to-peer rooms and ignored
    fn set_video_priority(&self, participant: &ParticipantSid, priority: TrackPriority) {
        let Some(entry) = self.roster.get(participant) else {
            return;
        };
        if entry.is_local {
            return;
        }

        for track in entry.video_tracks() {
            if let Err(e) = self
                .room
                .set_track_priority(participant, track.sid(), priority)
            {
                debug!("Priority hint for {} ignored: {}", track.sid(), e);
            }
        }
    }

    /// Dominant speaker if present, otherwise the local participant
    fn set_current_active(&mut self) {
        let choice = self.selection.automatic_choice(&self.roster);
        self.set_active(ActiveParticipant::Auto(choice));
    }

    fn set_active(&mut self, next: ActiveParticipant) {
        let Some(next_sid) = next.sid().cloned() else {
            return;
        };
        let previous = self.selection.active().clone();
        let pinned = next.is_pinned();

        if previous.is(&next_sid) {
            self.selection.set_active(next);
            self.presenter.mark_pinned(&next_sid, pinned);
            return;
        }

        if let Some(previous_sid) = previous.sid() {
            self.presenter.mark_active(previous_sid, false);
            self.presenter.mark_pinned(previous_sid, false);
        }
        self.attachments
            .clear_surface(self.presenter.as_mut(), &Surface::Main);
        self.presenter.set_visible(&Surface::Main, false);

        self.selection.set_active(next);
        self.presenter.mark_active(&next_sid, true);
        self.presenter.mark_pinned(&next_sid, pinned);

        let (identity, track) = match self.roster.get(&next_sid) {
            Some(entry) => (Some(entry.identity.clone()), entry.first_video_track().cloned()),
            None => (None, None),
        };
        if let Some(track) = track {
            self.attachments
                .attach(self.presenter.as_mut(), Surface::Main, &track);
        }
        self.presenter.set_main_identity(identity.as_deref());

        debug!("Active participant is now {}", next_sid);
    }

    /// Page hidden: release the camera
    pub fn release_camera(&mut self) {
        match std::mem::replace(&mut self.camera, Camera::Released) {
            Camera::Live(track) => {
                info!("Page hidden, releasing camera track {}", track.sid());
                track.stop();
                if let Err(e) = self.room.unpublish_track(track.sid()) {
                    warn!("Failed to unpublish {}: {}", track.sid(), e);
                }
                let local = self.roster.local_sid().clone();
                self.track_unpublished(&local, track.sid());
            }
            Camera::Acquiring(generation) => {
                debug!("Page hidden during camera acquisition {}", generation);
            }
            Camera::Released => {}
            Camera::Off => self.camera = Camera::Off,
        }
    }

    /// Page visible: returns the acquisition number to start, if any
    ///
    /// Only a released camera is re-acquired, so repeated visible events
    /// never lead to a second publication.
    pub fn begin_camera_reacquire(&mut self) -> Option<u64> {
        if self.closed || !matches!(self.camera, Camera::Released) {
            return None;
        }
        self.camera_generation += 1;
        self.camera = Camera::Acquiring(self.camera_generation);
        Some(self.camera_generation)
    }

    /// Apply the outcome of acquisition `generation`
    ///
    /// A superseded acquisition (page hidden again, or session closed) that
    /// succeeded is rolled back: its track is stopped and unpublished.
    /// Failures are returned to the caller either way.
    pub fn finish_camera_reacquire(
        &mut self,
        generation: u64,
        outcome: Result<PublicationSnapshot>,
    ) -> Result<()> {
        let current = !self.closed && matches!(self.camera, Camera::Acquiring(g) if g == generation);

        let publication = match outcome {
            Ok(publication) => publication,
            Err(e) => {
                if current {
                    self.camera = Camera::Released;
                }
                warn!("Camera re-acquisition {} failed: {}", generation, e);
                return Err(e);
            }
        };

        let Some(track) = publication.track.clone() else {
            if current {
                self.camera = Camera::Released;
            }
            return Err(Error::Device(format!(
                "publication {} carries no track",
                publication.track_sid
            )));
        };

        if !current {
            info!("Discarding superseded camera track {}", track.sid());
            track.stop();
            if let Err(e) = self.room.unpublish_track(track.sid()) {
                warn!("Failed to unpublish {}: {}", track.sid(), e);
            }
            return Ok(());
        }

        info!("Camera re-acquired as track {}", track.sid());
        self.camera = Camera::Live(track);
        let local = self.roster.local_sid().clone();
        self.track_published(&local, publication);
        Ok(())
    }

    /// Single exit path for leave and collaborator disconnects
    ///
    /// Stops the camera, removes every container, clears the main surface.
    /// Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        info!("Tearing down room view");

        if let Camera::Live(track) = std::mem::replace(&mut self.camera, Camera::Off) {
            track.stop();
        }

        self.attachments
            .clear_surface(self.presenter.as_mut(), &Surface::Main);
        for sid in self.roster.sids() {
            if let Some(previous) = self.selection.active().sid() {
                if previous == &sid {
                    self.presenter.mark_active(&sid, false);
                    self.presenter.mark_pinned(&sid, false);
                }
            }
            self.remove_participant(&sid);
        }
        self.selection.set_active(ActiveParticipant::None);

        self.presenter.clear_main_source();
        self.presenter.set_visible(&Surface::Main, false);
        self.presenter.set_main_identity(None);
        self.closed = true;
    }

    /// Snapshot of the bookkeeping, for inspection
    pub fn state(&self) -> PresentationState {
        let participants = self
            .roster
            .iter()
            .map(|entry| ParticipantSummary {
                sid: entry.sid.clone(),
                identity: entry.identity.clone(),
                is_local: entry.is_local,
                network_quality_level: entry.network_quality_level,
                tracks: entry
                    .publications()
                    .iter()
                    .map(|p| TrackSummary {
                        sid: p.track_sid.clone(),
                        kind: p.kind,
                        subscribed: p.track.is_some(),
                    })
                    .collect(),
            })
            .collect();

        PresentationState {
            active: self.selection.active().clone(),
            dominant_speaker: self.selection.dominant_speaker().cloned(),
            participants,
            camera: match self.camera {
                Camera::Off => CameraStatus::Off,
                Camera::Live(_) => CameraStatus::Live,
                Camera::Released => CameraStatus::Released,
                Camera::Acquiring(_) => CameraStatus::Acquiring,
            },
        }
    }
}
