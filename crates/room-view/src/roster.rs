//! Participant roster
//!
//! Which participants and publications the view currently listens to.
//! A participant's entry doubles as its event subscription: events for
//! participants or publications that are not in the roster are ignored.

use crate::sdk::{ParticipantSid, PublicationSnapshot, TrackHandle, TrackKind, TrackSid};
use std::collections::HashMap;

/// A publication the view is subscribed to
#[derive(Debug, Clone)]
pub struct PublicationEntry {
    pub track_sid: TrackSid,
    pub kind: TrackKind,
    pub name: String,
    /// Subscribed track, `None` until the collaborator delivers it
    pub track: Option<TrackHandle>,
}

impl From<PublicationSnapshot> for PublicationEntry {
    fn from(snapshot: PublicationSnapshot) -> Self {
        Self {
            track_sid: snapshot.track_sid,
            kind: snapshot.kind,
            name: snapshot.track_name,
            track: snapshot.track,
        }
    }
}

/// A participant the view is subscribed to
#[derive(Debug, Clone)]
pub struct ParticipantEntry {
    pub sid: ParticipantSid,
    pub identity: String,
    pub is_local: bool,
    pub network_quality_level: Option<u8>,
    publications: Vec<PublicationEntry>,
}

impl ParticipantEntry {
    pub fn new(sid: ParticipantSid, identity: impl Into<String>, is_local: bool) -> Self {
        Self {
            sid,
            identity: identity.into(),
            is_local,
            network_quality_level: None,
            publications: Vec::new(),
        }
    }

    pub fn publications(&self) -> &[PublicationEntry] {
        &self.publications
    }

    pub fn publication(&self, track_sid: &TrackSid) -> Option<&PublicationEntry> {
        self.publications.iter().find(|p| &p.track_sid == track_sid)
    }

    pub fn publication_mut(&mut self, track_sid: &TrackSid) -> Option<&mut PublicationEntry> {
        self.publications
            .iter_mut()
            .find(|p| &p.track_sid == track_sid)
    }

    /// Add a publication; returns false if it is already known
    pub fn add_publication(&mut self, publication: PublicationEntry) -> bool {
        if self.publication(&publication.track_sid).is_some() {
            return false;
        }
        self.publications.push(publication);
        true
    }

    pub fn remove_publication(&mut self, track_sid: &TrackSid) -> Option<PublicationEntry> {
        let index = self
            .publications
            .iter()
            .position(|p| &p.track_sid == track_sid)?;
        Some(self.publications.remove(index))
    }

    /// First subscribed video track, in publication order
    pub fn first_video_track(&self) -> Option<&TrackHandle> {
        self.publications
            .iter()
            .filter(|p| p.kind == TrackKind::Video)
            .find_map(|p| p.track.as_ref())
    }

    /// Subscribed video tracks, in publication order
    pub fn video_tracks(&self) -> impl Iterator<Item = &TrackHandle> {
        self.publications
            .iter()
            .filter(|p| p.kind == TrackKind::Video)
            .filter_map(|p| p.track.as_ref())
    }
}

/// All participants of the joined room, local first
#[derive(Debug, Clone)]
pub struct Roster {
    local: ParticipantSid,
    entries: HashMap<ParticipantSid, ParticipantEntry>,
    order: Vec<ParticipantSid>,
}

impl Roster {
    pub fn new(local: ParticipantEntry) -> Self {
        let sid = local.sid.clone();
        let mut entries = HashMap::new();
        entries.insert(sid.clone(), local);
        Self {
            local: sid.clone(),
            entries,
            order: vec![sid],
        }
    }

    pub fn local_sid(&self) -> &ParticipantSid {
        &self.local
    }

    pub fn get(&self, sid: &ParticipantSid) -> Option<&ParticipantEntry> {
        self.entries.get(sid)
    }

    pub fn get_mut(&mut self, sid: &ParticipantSid) -> Option<&mut ParticipantEntry> {
        self.entries.get_mut(sid)
    }

    pub fn contains(&self, sid: &ParticipantSid) -> bool {
        self.entries.contains_key(sid)
    }

    /// Insert a participant; returns false if the session id is taken
    pub fn insert(&mut self, entry: ParticipantEntry) -> bool {
        if self.entries.contains_key(&entry.sid) {
            return false;
        }
        self.order.push(entry.sid.clone());
        self.entries.insert(entry.sid.clone(), entry);
        true
    }

    pub fn remove(&mut self, sid: &ParticipantSid) -> Option<ParticipantEntry> {
        let entry = self.entries.remove(sid)?;
        self.order.retain(|s| s != sid);
        Some(entry)
    }

    /// Session ids in join order
    pub fn sids(&self) -> Vec<ParticipantSid> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticipantEntry> {
        self.order.iter().filter_map(|sid| self.entries.get(sid))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
