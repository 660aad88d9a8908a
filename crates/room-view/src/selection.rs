//! Active participant selection
//!
//! The active participant is shown on the main surface. Unless the user has
//! pinned someone, it follows the dominant speaker and falls back to the
//! local participant.

use crate::roster::Roster;
use crate::sdk::ParticipantSid;
use serde::Serialize;

/// Who is on the main surface and why
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "mode", content = "participant", rename_all = "lowercase")]
pub enum ActiveParticipant {
    #[default]
    None,
    /// Chosen by the dominant-speaker rule
    Auto(ParticipantSid),
    /// Chosen by the user; survives dominant speaker changes
    Pinned(ParticipantSid),
}

impl ActiveParticipant {
    pub fn sid(&self) -> Option<&ParticipantSid> {
        match self {
            ActiveParticipant::None => None,
            ActiveParticipant::Auto(sid) | ActiveParticipant::Pinned(sid) => Some(sid),
        }
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self, ActiveParticipant::Pinned(_))
    }

    pub fn is(&self, sid: &ParticipantSid) -> bool {
        self.sid() == Some(sid)
    }
}

/// What a click on a participant's thumbnail does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinToggle {
    /// Pin the clicked participant, releasing `previous` first if set
    Pin { previous: Option<ParticipantSid> },
    /// The clicked participant is the pinned one
    Unpin,
}

/// Active participant plus the last reported dominant speaker
#[derive(Debug, Clone, Default)]
pub struct Selection {
    active: ActiveParticipant,
    dominant_speaker: Option<ParticipantSid>,
}

impl Selection {
    pub fn new(dominant_speaker: Option<ParticipantSid>) -> Self {
        Self {
            active: ActiveParticipant::None,
            dominant_speaker,
        }
    }

    pub fn active(&self) -> &ActiveParticipant {
        &self.active
    }

    pub fn active_sid(&self) -> Option<&ParticipantSid> {
        self.active.sid()
    }

    pub fn is_pinned(&self) -> bool {
        self.active.is_pinned()
    }

    pub fn pinned_sid(&self) -> Option<&ParticipantSid> {
        match &self.active {
            ActiveParticipant::Pinned(sid) => Some(sid),
            _ => None,
        }
    }

    pub fn dominant_speaker(&self) -> Option<&ParticipantSid> {
        self.dominant_speaker.as_ref()
    }

    pub fn set_dominant_speaker(&mut self, speaker: Option<ParticipantSid>) {
        self.dominant_speaker = speaker;
    }

    /// Forget the dominant speaker if it is `sid`
    pub fn forget_speaker(&mut self, sid: &ParticipantSid) {
        if self.dominant_speaker.as_ref() == Some(sid) {
            self.dominant_speaker = None;
        }
    }

    /// Participant the dominant-speaker rule picks
    ///
    /// A dominant speaker that is not (or no longer) in the roster counts as
    /// no dominant speaker.
    pub fn automatic_choice(&self, roster: &Roster) -> ParticipantSid {
        self.dominant_speaker
            .as_ref()
            .filter(|sid| roster.contains(sid))
            .cloned()
            .unwrap_or_else(|| roster.local_sid().clone())
    }

    pub fn toggle_for(&self, clicked: &ParticipantSid) -> PinToggle {
        match &self.active {
            ActiveParticipant::Pinned(sid) if sid == clicked => PinToggle::Unpin,
            ActiveParticipant::Pinned(sid) => PinToggle::Pin {
                previous: Some(sid.clone()),
            },
            _ => PinToggle::Pin { previous: None },
        }
    }

    pub(crate) fn set_active(&mut self, active: ActiveParticipant) {
        self.active = active;
    }

    /// Drop the pin, keeping the participant as an automatic choice
    pub(crate) fn clear_pin(&mut self) {
        if let ActiveParticipant::Pinned(sid) = &self.active {
            self.active = ActiveParticipant::Auto(sid.clone());
        }
    }
}
