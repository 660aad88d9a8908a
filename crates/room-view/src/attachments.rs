//! Track attachment table
//!
//! Records which track renders into which surface so that attach and detach
//! reach the presentation port only when something actually changes.

use crate::presentation::{PresentationPort, Surface};
use crate::sdk::{ParticipantSid, TrackHandle, TrackSid};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Attachments {
    surfaces: BTreeMap<Surface, Vec<TrackSid>>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `track` into `surface` and make the surface visible
    ///
    /// Returns false if the track was already attached there.
    pub fn attach(
        &mut self,
        port: &mut dyn PresentationPort,
        surface: Surface,
        track: &TrackHandle,
    ) -> bool {
        let tracks = self.surfaces.entry(surface.clone()).or_default();
        if tracks.contains(track.sid()) {
            return false;
        }

        debug!("Attaching track {} to {:?}", track.sid(), surface);
        tracks.push(track.sid().clone());
        port.attach(&surface, track);
        port.set_visible(&surface, true);
        true
    }

    /// Stop rendering `track` in `surface`; hides the surface once empty
    ///
    /// Returns false if the track was not attached there.
    pub fn detach(
        &mut self,
        port: &mut dyn PresentationPort,
        surface: &Surface,
        track: &TrackSid,
    ) -> bool {
        let Some(tracks) = self.surfaces.get_mut(surface) else {
            return false;
        };
        let Some(index) = tracks.iter().position(|sid| sid == track) else {
            return false;
        };

        debug!("Detaching track {} from {:?}", track, surface);
        tracks.remove(index);
        port.detach(surface, track);
        if tracks.is_empty() {
            self.surfaces.remove(surface);
            port.set_visible(surface, false);
        }
        true
    }

    /// Detach `track` from every surface it renders into
    pub fn detach_everywhere(&mut self, port: &mut dyn PresentationPort, track: &TrackSid) -> usize {
        self.surfaces_with(track)
            .into_iter()
            .filter(|surface| self.detach(port, surface, track))
            .count()
    }

    /// Detach everything from one surface
    pub fn clear_surface(&mut self, port: &mut dyn PresentationPort, surface: &Surface) -> usize {
        let tracks = self.tracks_on(surface).to_vec();
        tracks
            .iter()
            .filter(|track| self.detach(port, surface, track))
            .count()
    }

    /// Forget a participant's slots without touching the port
    ///
    /// Used when the container holding them is being removed.
    pub fn forget_participant(&mut self, participant: &ParticipantSid) {
        self.surfaces.retain(|surface, _| match surface {
            Surface::Slot { participant: p, .. } => p != participant,
            Surface::Main => true,
        });
    }

    pub fn is_attached(&self, surface: &Surface, track: &TrackSid) -> bool {
        self.tracks_on(surface).contains(track)
    }

    pub fn tracks_on(&self, surface: &Surface) -> &[TrackSid] {
        self.surfaces.get(surface).map(Vec::as_slice).unwrap_or(&[])
    }

    fn surfaces_with(&self, track: &TrackSid) -> Vec<Surface> {
        self.surfaces
            .iter()
            .filter(|(_, tracks)| tracks.contains(track))
            .map(|(surface, _)| surface.clone())
            .collect()
    }

    /// Number of (surface, track) pairs
    pub fn len(&self) -> usize {
        self.surfaces.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::DomModel;
    use crate::sdk::TrackKind;
    use crate::sim::SimTrack;

    fn dom_with(participant: &ParticipantSid) -> DomModel {
        let mut dom = DomModel::new();
        dom.create_container(participant, "bob", false);
        dom
    }

    #[test]
    fn test_attach_is_idempotent() {
        let bob = ParticipantSid::from("PA-bob");
        let mut dom = dom_with(&bob);
        let mut table = Attachments::new();
        let track = SimTrack::handle("MT-1", TrackKind::Video, "camera");
        let slot = Surface::slot(&bob, TrackKind::Video);

        assert!(table.attach(&mut dom, slot.clone(), &track));
        assert!(!table.attach(&mut dom, slot.clone(), &track));

        assert_eq!(dom.attached_node_count(), 1);
        assert!(dom.container(&bob).unwrap().video.visible);
        assert!(table.is_attached(&slot, track.sid()));
    }

    #[test]
    fn test_detach_absent_is_noop() {
        let bob = ParticipantSid::from("PA-bob");
        let mut dom = dom_with(&bob);
        let mut table = Attachments::new();
        let slot = Surface::slot(&bob, TrackKind::Video);

        assert!(!table.detach(&mut dom, &slot, &TrackSid::from("MT-none")));
        assert!(!table.detach(&mut dom, &Surface::Main, &TrackSid::from("MT-none")));
        assert_eq!(dom, dom_with(&bob));
    }

    #[test]
    fn test_detach_hides_empty_surface() {
        let bob = ParticipantSid::from("PA-bob");
        let mut dom = dom_with(&bob);
        let mut table = Attachments::new();
        let track = SimTrack::handle("MT-1", TrackKind::Video, "camera");

        table.attach(&mut dom, Surface::Main, &track);
        assert!(dom.main.visible);

        assert!(table.detach(&mut dom, &Surface::Main, track.sid()));
        assert!(!dom.main.visible);
        assert!(dom.main.source.is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_detach_everywhere() {
        let bob = ParticipantSid::from("PA-bob");
        let mut dom = dom_with(&bob);
        let mut table = Attachments::new();
        let track = SimTrack::handle("MT-1", TrackKind::Video, "camera");

        table.attach(&mut dom, Surface::slot(&bob, TrackKind::Video), &track);
        table.attach(&mut dom, Surface::Main, &track);
        assert_eq!(table.len(), 2);

        assert_eq!(table.detach_everywhere(&mut dom, track.sid()), 2);
        assert_eq!(dom.attached_node_count(), 0);
        assert_eq!(table.detach_everywhere(&mut dom, track.sid()), 0);
    }

    #[test]
    fn test_forget_participant_keeps_main() {
        let bob = ParticipantSid::from("PA-bob");
        let mut dom = dom_with(&bob);
        let mut table = Attachments::new();
        let track = SimTrack::handle("MT-1", TrackKind::Video, "camera");

        table.attach(&mut dom, Surface::slot(&bob, TrackKind::Video), &track);
        table.attach(&mut dom, Surface::Main, &track);

        table.forget_participant(&bob);
        assert_eq!(table.len(), 1);
        assert!(table.is_attached(&Surface::Main, track.sid()));
    }
}
