//! Comparison session: a recording catalog feeding the two sync slots.
//!
//! Resolves user queries (id or title) against the [`Catalog`], routes them
//! to the armed slot, and keeps the common keyframe list in step with what
//! is loaded.

use log::{debug, info};
use uuid::Uuid;

use crate::core::{SyncController, SyncError, TickScheduler};
use crate::core::ticker::IntervalTicker;
use crate::entities::{align_common_keyframes, Catalog, CommonKeyframe, Recording, Side};

pub struct ComparisonSession<S: TickScheduler = IntervalTicker> {
    catalog: Catalog,
    controller: SyncController<S>,
    /// Keyframes present in both slots, ordered for quick-jump buttons
    common: Vec<CommonKeyframe>,
    /// Slot occupancy `common` was computed for
    common_for: (Option<Uuid>, Option<Uuid>),
}

impl<S: TickScheduler> ComparisonSession<S> {
    pub fn new(catalog: Catalog, controller: SyncController<S>) -> Self {
        let mut session = Self {
            catalog,
            controller,
            common: Vec::new(),
            common_for: (None, None),
        };
        session.sync_common();
        session
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn controller(&self) -> &SyncController<S> {
        &self.controller
    }

    /// Direct controller access. Slot changes made here are picked up by the
    /// next keyframe lookup.
    pub fn controller_mut(&mut self) -> &mut SyncController<S> {
        &mut self.controller
    }

    pub fn activate_slot(&mut self, side: Side) {
        self.controller.activate_slot(side);
    }

    /// Load the recording matching `query` into the armed slot.
    pub fn choose(&mut self, query: &str) -> Result<Side, SyncError> {
        let side = self.controller.awaiting_slot().ok_or(SyncError::NoActiveSlot)?;
        self.select(side, query)?;
        Ok(side)
    }

    /// Load the recording matching `query` into `side`.
    pub fn select(&mut self, side: Side, query: &str) -> Result<(), SyncError> {
        let recording = self
            .catalog
            .find(query)
            .cloned()
            .ok_or_else(|| SyncError::UnknownRecording(query.to_string()))?;
        info!("Selecting '{}' for {} slot", recording.display_name(), side);
        self.controller.select_video(side, recording)?;
        self.sync_common();
        Ok(())
    }

    pub fn clear(&mut self, side: Side) {
        self.controller.clear_slot(side);
        self.sync_common();
    }

    /// Recordings that may go into `side` (anything not in the other slot).
    pub fn available_for(&self, side: Side) -> Vec<&Recording> {
        let taken = self.controller.recording(side.other()).map(|r| r.id);
        self.catalog
            .iter()
            .filter(|r| Some(r.id) != taken)
            .collect()
    }

    pub fn common_keyframes(&mut self) -> &[CommonKeyframe] {
        self.sync_common();
        &self.common
    }

    /// Jump both slots to the common keyframe called `name`.
    pub fn jump_to(&mut self, name: &str) -> Result<(), SyncError> {
        self.sync_common();
        let keyframe = self
            .common
            .iter()
            .find(|k| k.name == name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownKeyframe(name.to_string()))?;
        self.controller.jump_to_keyframe(&keyframe);
        Ok(())
    }

    /// Recompute the common keyframes if slot occupancy changed.
    fn sync_common(&mut self) {
        let occupancy = (
            self.controller.recording(Side::Left).map(|r| r.id),
            self.controller.recording(Side::Right).map(|r| r.id),
        );
        if occupancy == self.common_for {
            return;
        }
        self.common_for = occupancy;
        self.common = match (
            self.controller.recording(Side::Left),
            self.controller.recording(Side::Right),
        ) {
            (Some(left), Some(right)) => align_common_keyframes(&left.keyframes, &right.keyframes),
            _ => Vec::new(),
        };
        debug!("{} common keyframes", self.common.len());
    }
}
