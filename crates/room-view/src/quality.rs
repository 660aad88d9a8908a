//! Network quality reporting
//!
//! Pure projection: the collaborator computes levels, the view forwards
//! them with the participant's identity.

use crate::sdk::ParticipantSid;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Highest level the collaborator reports
pub const MAX_NETWORK_QUALITY_LEVEL: u8 = 5;

/// One forwarded quality change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkQualityReport {
    pub participant: ParticipantSid,
    pub identity: String,
    pub level: u8,
    pub is_local: bool,
}

impl NetworkQualityReport {
    /// Signal bars as rendered next to the participant, e.g. `▮▮▮▯▯`
    pub fn bars(&self) -> String {
        let level = self.level.min(MAX_NETWORK_QUALITY_LEVEL) as usize;
        let mut bars = "▮".repeat(level);
        bars.push_str(&"▯".repeat(MAX_NETWORK_QUALITY_LEVEL as usize - level));
        bars
    }
}

/// Receiver of quality reports
pub trait NetworkQualitySink: Send {
    fn report(&mut self, report: NetworkQualityReport);
}

/// Sink that writes reports to the log
#[derive(Debug, Default)]
pub struct TracingQualitySink;

impl NetworkQualitySink for TracingQualitySink {
    fn report(&mut self, report: NetworkQualityReport) {
        info!(
            participant = %report.participant,
            identity = %report.identity,
            level = report.level,
            "Network quality {}",
            report.bars()
        );
    }
}

/// Sink that keeps every report; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct CollectingQualitySink(Arc<Mutex<Vec<NetworkQualityReport>>>);

impl CollectingQualitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<NetworkQualityReport> {
        self.0.lock().clone()
    }

    /// Most recent level reported for a participant
    pub fn latest_level(&self, participant: &ParticipantSid) -> Option<u8> {
        self.0
            .lock()
            .iter()
            .rev()
            .find(|r| &r.participant == participant)
            .map(|r| r.level)
    }
}

impl NetworkQualitySink for CollectingQualitySink {
    fn report(&mut self, report: NetworkQualityReport) {
        self.0.lock().push(report);
    }
}
