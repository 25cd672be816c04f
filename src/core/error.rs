//! Precondition rejections.
//!
//! Transport commands never fail: an unready player turns them into no-ops.
//! Only selection and lookup can be refused, and a refusal leaves state as it
//! was.

use uuid::Uuid;

use crate::entities::Side;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Recording already occupies the other slot
    SlotConflict { side: Side, recording: Uuid },
    /// No catalog entry matches the query
    UnknownRecording(String),
    /// A selection arrived with no slot armed
    NoActiveSlot,
    /// No common keyframe with this name
    UnknownKeyframe(String),
    InvalidRate(f64),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::SlotConflict { side, recording } => write!(
                f,
                "Recording {} already occupies the {} slot",
                recording,
                side.other()
            ),
            SyncError::UnknownRecording(q) => write!(f, "Unknown recording: {}", q),
            SyncError::NoActiveSlot => write!(f, "No slot is waiting for a selection"),
            SyncError::UnknownKeyframe(name) => write!(f, "No common keyframe named '{}'", name),
            SyncError::InvalidRate(rate) => write!(f, "Invalid playback rate: {}", rate),
        }
    }
}

impl std::error::Error for SyncError {}
