//! Events published by the sync controller.

use uuid::Uuid;

use super::sync_controller::SyncPhase;
use crate::entities::Side;

// === Transport ===

#[derive(Clone, Debug, PartialEq)]
pub struct PhaseChangedEvent {
    pub from: SyncPhase,
    pub to: SyncPhase,
}

/// Aggregated scrubber position (mean of both players)
#[derive(Clone, Debug, PartialEq)]
pub struct PositionChangedEvent {
    pub position_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RateChangedEvent(pub f64);

/// Playback reached the end of the longer clip
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackEndedEvent {
    pub position_ms: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DriftCorrectedEvent {
    pub side: Side,
    pub drift_ms: f64,
}

// === Slots ===

#[derive(Clone, Debug, PartialEq)]
pub struct SlotLoadedEvent {
    pub side: Side,
    pub recording: Uuid,
    pub source_uri: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SlotReadyEvent {
    pub side: Side,
    pub duration_ms: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SlotFailedEvent {
    pub side: Side,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SlotClearedEvent(pub Side);

#[derive(Clone, Debug, PartialEq)]
pub struct SelectionRejectedEvent {
    pub side: Side,
    pub recording: Uuid,
}
