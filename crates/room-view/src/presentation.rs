//! Presentation port
//!
//! Everything the controller does to the page goes through
//! [`PresentationPort`]. [`DomModel`] is an in-memory rendering of the same
//! page structure: one container per participant holding an audio and a
//! video slot, plus the shared main video surface.

use crate::sdk::{ParticipantSid, TrackHandle, TrackKind, TrackSid};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// A place a track can be rendered into
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Surface {
    /// Shared main video element showing the active participant
    Main,
    /// The audio or video slot of a participant's thumbnail container
    Slot {
        participant: ParticipantSid,
        kind: TrackKind,
    },
}

impl Surface {
    pub fn slot(participant: &ParticipantSid, kind: TrackKind) -> Self {
        Surface::Slot {
            participant: participant.clone(),
            kind,
        }
    }
}

/// UI side effects requested by the controller
pub trait PresentationPort: Send {
    /// Append a container for a participant; both media slots start hidden
    fn create_container(&mut self, participant: &ParticipantSid, identity: &str, is_local: bool);

    fn remove_container(&mut self, participant: &ParticipantSid);

    fn mark_active(&mut self, participant: &ParticipantSid, active: bool);

    fn mark_pinned(&mut self, participant: &ParticipantSid, pinned: bool);

    /// Render a track into a surface
    fn attach(&mut self, surface: &Surface, track: &TrackHandle);

    /// Stop rendering a track and clear the element's media source
    fn detach(&mut self, surface: &Surface, track: &TrackSid);

    /// Opacity toggle; hidden surfaces keep their element
    fn set_visible(&mut self, surface: &Surface, visible: bool);

    /// Identity label of the main surface
    fn set_main_identity(&mut self, identity: Option<&str>);

    /// Drop whatever media source the main surface still references
    fn clear_main_source(&mut self);
}

/// A rendered `<audio>`/`<video>` element
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaElement {
    /// Tracks rendering into this element, in attach order
    pub attached: Vec<TrackSid>,
    /// Current media source
    pub source: Option<TrackSid>,
    pub visible: bool,
    pub muted: bool,
}

impl MediaElement {
    fn attach(&mut self, track: &TrackSid) {
        self.attached.push(track.clone());
        self.source = Some(track.clone());
    }

    fn detach(&mut self, track: &TrackSid) {
        self.attached.retain(|sid| sid != track);
        self.source = None;
    }
}

/// A participant's thumbnail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerNode {
    pub participant: ParticipantSid,
    pub identity: String,
    pub active: bool,
    pub pinned: bool,
    pub audio: MediaElement,
    pub video: MediaElement,
}

impl ContainerNode {
    fn slot_mut(&mut self, kind: TrackKind) -> Option<&mut MediaElement> {
        match kind {
            TrackKind::Audio => Some(&mut self.audio),
            TrackKind::Video => Some(&mut self.video),
            TrackKind::Data => None,
        }
    }
}

/// In-memory page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomModel {
    /// Containers in append order
    pub containers: Vec<ContainerNode>,
    pub main: MediaElement,
    pub main_identity: Option<String>,
}

impl DomModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(&self, participant: &ParticipantSid) -> Option<&ContainerNode> {
        self.containers.iter().find(|c| &c.participant == participant)
    }

    fn container_mut(&mut self, participant: &ParticipantSid) -> Option<&mut ContainerNode> {
        self.containers
            .iter_mut()
            .find(|c| &c.participant == participant)
    }

    fn element_mut(&mut self, surface: &Surface) -> Option<&mut MediaElement> {
        match surface {
            Surface::Main => Some(&mut self.main),
            Surface::Slot { participant, kind } => match self.container_mut(participant) {
                Some(container) => container.slot_mut(*kind),
                None => {
                    warn!("No container for participant {}", participant);
                    None
                }
            },
        }
    }

    /// Total number of rendered track nodes across every element
    pub fn attached_node_count(&self) -> usize {
        self.main.attached.len()
            + self
                .containers
                .iter()
                .map(|c| c.audio.attached.len() + c.video.attached.len())
                .sum::<usize>()
    }
}

impl PresentationPort for DomModel {
    fn create_container(&mut self, participant: &ParticipantSid, identity: &str, is_local: bool) {
        if self.container(participant).is_some() {
            warn!("Container for {} already exists", participant);
            return;
        }

        self.containers.push(ContainerNode {
            participant: participant.clone(),
            identity: identity.to_string(),
            active: false,
            pinned: false,
            audio: MediaElement {
                muted: is_local,
                ..MediaElement::default()
            },
            video: MediaElement {
                muted: true,
                ..MediaElement::default()
            },
        });
    }

    fn remove_container(&mut self, participant: &ParticipantSid) {
        self.containers.retain(|c| &c.participant != participant);
    }

    fn mark_active(&mut self, participant: &ParticipantSid, active: bool) {
        if let Some(container) = self.container_mut(participant) {
            container.active = active;
        }
    }

    fn mark_pinned(&mut self, participant: &ParticipantSid, pinned: bool) {
        if let Some(container) = self.container_mut(participant) {
            container.pinned = pinned;
        }
    }

    fn attach(&mut self, surface: &Surface, track: &TrackHandle) {
        if let Some(element) = self.element_mut(surface) {
            element.attach(track.sid());
        }
    }

    fn detach(&mut self, surface: &Surface, track: &TrackSid) {
        if let Some(element) = self.element_mut(surface) {
            element.detach(track);
        }
    }

    fn set_visible(&mut self, surface: &Surface, visible: bool) {
        if let Some(element) = self.element_mut(surface) {
            element.visible = visible;
        }
    }

    fn set_main_identity(&mut self, identity: Option<&str>) {
        self.main_identity = identity.map(str::to_string);
    }

    fn clear_main_source(&mut self) {
        self.main.source = None;
    }
}

/// Cloneable handle to a [`DomModel`] shared between a session and its owner
#[derive(Debug, Clone, Default)]
pub struct SharedDom(Arc<Mutex<DomModel>>);

impl SharedDom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current page
    pub fn snapshot(&self) -> DomModel {
        self.0.lock().clone()
    }

    /// Run a closure against the current page
    pub fn with<R>(&self, f: impl FnOnce(&DomModel) -> R) -> R {
        f(&self.0.lock())
    }
}

impl PresentationPort for SharedDom {
    fn create_container(&mut self, participant: &ParticipantSid, identity: &str, is_local: bool) {
        self.0.lock().create_container(participant, identity, is_local);
    }

    fn remove_container(&mut self, participant: &ParticipantSid) {
        self.0.lock().remove_container(participant);
    }

    fn mark_active(&mut self, participant: &ParticipantSid, active: bool) {
        self.0.lock().mark_active(participant, active);
    }

    fn mark_pinned(&mut self, participant: &ParticipantSid, pinned: bool) {
        self.0.lock().mark_pinned(participant, pinned);
    }

    fn attach(&mut self, surface: &Surface, track: &TrackHandle) {
        self.0.lock().attach(surface, track);
    }

    fn detach(&mut self, surface: &Surface, track: &TrackSid) {
        self.0.lock().detach(surface, track);
    }

    fn set_visible(&mut self, surface: &Surface, visible: bool) {
        self.0.lock().set_visible(surface, visible);
    }

    fn set_main_identity(&mut self, identity: Option<&str>) {
        self.0.lock().set_main_identity(identity);
    }

    fn clear_main_source(&mut self) {
        self.0.lock().clear_main_source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTrack;
    use std::collections::BTreeSet;

    #[test]
    fn test_surfaces_order_main_first_then_slots() {
        let bob = ParticipantSid::from("PA-bob");
        let surfaces: BTreeSet<Surface> = [
            Surface::slot(&bob, TrackKind::Video),
            Surface::Main,
            Surface::slot(&bob, TrackKind::Audio),
            Surface::slot(&bob, TrackKind::Audio),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            surfaces.into_iter().collect::<Vec<_>>(),
            vec![
                Surface::Main,
                Surface::slot(&bob, TrackKind::Audio),
                Surface::slot(&bob, TrackKind::Video),
            ]
        );
    }

    #[test]
    fn test_container_slots_start_hidden() {
        let mut dom = DomModel::new();
        let local = ParticipantSid::from("PA-local");
        dom.create_container(&local, "alice", true);

        let container = dom.container(&local).unwrap();
        assert!(!container.audio.visible);
        assert!(!container.video.visible);
        assert!(container.audio.muted);
        assert!(!container.active);
    }

    #[test]
    fn test_attach_and_detach_clear_source() {
        let mut dom = DomModel::new();
        let sid = ParticipantSid::from("PA-bob");
        dom.create_container(&sid, "bob", false);

        let track = SimTrack::handle("MT-1", TrackKind::Video, "camera");
        let slot = Surface::slot(&sid, TrackKind::Video);
        dom.attach(&slot, &track);
        assert_eq!(dom.container(&sid).unwrap().video.source, Some(TrackSid::from("MT-1")));
        assert_eq!(dom.attached_node_count(), 1);

        dom.detach(&slot, track.sid());
        let video = &dom.container(&sid).unwrap().video;
        assert!(video.attached.is_empty());
        assert!(video.source.is_none());
    }

    #[test]
    fn test_missing_container_is_skipped() {
        let mut dom = DomModel::new();
        let track = SimTrack::handle("MT-1", TrackKind::Audio, "mic");
        dom.attach(&Surface::slot(&ParticipantSid::from("PA-ghost"), TrackKind::Audio), &track);
        assert_eq!(dom.attached_node_count(), 0);
    }

    #[test]
    fn test_shared_dom_reflects_writes() {
        let shared = SharedDom::new();
        let mut port = shared.clone();
        port.create_container(&ParticipantSid::from("PA-1"), "carol", false);
        port.set_main_identity(Some("carol"));

        let dom = shared.snapshot();
        assert_eq!(dom.containers.len(), 1);
        assert_eq!(dom.main_identity.as_deref(), Some("carol"));
    }
}
