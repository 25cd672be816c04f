//! Two players driven as one transport.
//!
//! **Architecture**: the controller owns both [`PlaybackUnit`]s and is the only
//! writer of [`SyncState`]. UI code reads snapshots and issues commands; it
//! never touches the units directly.
//!
//! # Command issue
//!
//! Every logical operation issues its left and right commands back-to-back in
//! one call, without waiting for either player to confirm. Waiting on left
//! before commanding right would show up as visible skew.
//!
//! # Polling loop
//!
//! While playing, a repeating tick from the [`TickScheduler`] reads both
//! positions and publishes their mean. The controller holds at most one poll
//! handle: starting always cancels the previous one first, and pause, scrub,
//! keyframe jump and slot changes cancel synchronously. Ticks carry their id,
//! so one already queued when its loop was cancelled cannot overwrite a
//! position the user just set.
//!
//! # Phases
//!
//! - `Idle`: fewer than two slots loaded, transport unavailable
//! - `AwaitingSlot(side)`: a slot is armed for the next selection
//! - `Ready`: both loaded and paused
//! - `Playing`: both playing, poll loop active
//! - `Scrubbing`: scrubber held, both paused

use log::{debug, info, trace, warn};
use serde::Serialize;

use super::error::SyncError;
use super::event_bus::SyncEventEmitter;
use super::playback_unit::{is_valid_rate, MediaBackend, PlaybackUnit, UnitEvent};
use super::sync_events::*;
use super::ticker::{IntervalTicker, TickId, TickScheduler};
use crate::config::SyncSettings;
use crate::entities::{CommonKeyframe, Recording, Side};

/// Speed presets for `step_rate`
pub const RATE_PRESETS: &[f64] = &[0.1, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    Idle,
    AwaitingSlot(Side),
    Ready,
    Playing,
    Scrubbing,
}

/// Read-only transport snapshot for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub phase: SyncPhase,
    /// Mean of both player positions (or the last commanded target)
    pub position_ms: f64,
    /// Longer of the two durations
    pub max_duration_ms: f64,
    pub rate: f64,
}

#[derive(Debug)]
struct Slot {
    unit: PlaybackUnit,
    recording: Option<Recording>,
}

pub struct SyncController<S: TickScheduler = IntervalTicker> {
    left: Slot,
    right: Slot,
    state: SyncState,
    /// Slot armed by `activate_slot`, cleared by the next selection
    awaiting: Option<Side>,
    scheduler: S,
    /// The single active polling loop, if any
    poll: Option<TickId>,
    settings: SyncSettings,
    events: SyncEventEmitter,
    /// Right-minus-left offset captured at play start
    drift_anchor_ms: Option<f64>,
}

impl<S: TickScheduler> SyncController<S> {
    pub fn new(
        left: Box<dyn MediaBackend>,
        right: Box<dyn MediaBackend>,
        scheduler: S,
        settings: SyncSettings,
    ) -> Self {
        let rate = if is_valid_rate(settings.default_rate) {
            settings.default_rate
        } else {
            warn!("Invalid default rate {}, using 1.0", settings.default_rate);
            1.0
        };
        let timeout = settings.load_timeout();

        Self {
            left: Slot {
                unit: PlaybackUnit::new(Side::Left, left).with_load_timeout(timeout),
                recording: None,
            },
            right: Slot {
                unit: PlaybackUnit::new(Side::Right, right).with_load_timeout(timeout),
                recording: None,
            },
            state: SyncState {
                phase: SyncPhase::Idle,
                position_ms: 0.0,
                max_duration_ms: 0.0,
                rate,
            },
            awaiting: None,
            scheduler,
            poll: None,
            settings,
            events: SyncEventEmitter::dummy(),
            drift_anchor_ms: None,
        }
    }

    /// Publish transport and slot events through `events`.
    pub fn with_events(mut self, events: SyncEventEmitter) -> Self {
        self.events = events;
        self
    }

    fn slot(&self, side: Side) -> &Slot {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut Slot {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    // === Observable surface ===

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn phase(&self) -> SyncPhase {
        self.state.phase
    }

    pub fn unit(&self, side: Side) -> &PlaybackUnit {
        &self.slot(side).unit
    }

    pub fn recording(&self, side: Side) -> Option<&Recording> {
        self.slot(side).recording.as_ref()
    }

    pub fn awaiting_slot(&self) -> Option<Side> {
        self.awaiting
    }

    pub fn both_loaded(&self) -> bool {
        self.left.recording.is_some() && self.right.recording.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.state.phase == SyncPhase::Playing
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    // === Slots ===

    /// Arm `side` for the next video selection.
    pub fn activate_slot(&mut self, side: Side) {
        info!("Slot {} armed for selection", side);
        self.awaiting = Some(side);
        self.settle_phase();
    }

    /// Load `recording` into `side`.
    ///
    /// Rejected with [`SyncError::SlotConflict`] when the same recording
    /// occupies the other slot; state is left untouched in that case.
    pub fn select_video(&mut self, side: Side, recording: Recording) -> Result<(), SyncError> {
        if self.slot(side.other()).recording.as_ref().map(|r| r.id) == Some(recording.id) {
            warn!(
                "Recording {} already in {} slot, selection for {} rejected",
                recording.id,
                side.other(),
                side
            );
            self.events.emit(SelectionRejectedEvent {
                side,
                recording: recording.id,
            });
            return Err(SyncError::SlotConflict {
                side,
                recording: recording.id,
            });
        }

        self.awaiting = None;

        if self.slot(side).recording.as_ref().map(|r| r.id) == Some(recording.id) {
            debug!("Recording {} already in {} slot", recording.id, side);
            self.settle_phase();
            return Ok(());
        }

        // The incoming clip starts unready; keep both players in step
        self.halt();

        let event = SlotLoadedEvent {
            side,
            recording: recording.id,
            source_uri: recording.source_uri.clone(),
        };
        let slot = self.slot_mut(side);
        slot.unit.load(&recording.source_uri);
        slot.recording = Some(recording);
        self.update_max_duration();

        self.events.emit(event);
        self.set_phase(self.settled_phase());
        Ok(())
    }

    /// Empty `side`: pauses both, unloads that player, rewinds the scrubber.
    pub fn clear_slot(&mut self, side: Side) {
        self.stop_polling();
        for s in Side::BOTH {
            self.slot_mut(s).unit.pause();
        }

        let slot = self.slot_mut(side);
        slot.unit.unload();
        let had_recording = slot.recording.take().is_some();

        self.update_max_duration();
        self.set_position(0.0);
        if had_recording {
            info!("Slot {} cleared", side);
            self.events.emit(SlotClearedEvent(side));
        }
        self.set_phase(self.settled_phase());
    }

    // === Transport ===

    /// Toggle between playing and paused.
    pub fn play_pause(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Start both players at the current rate and begin polling.
    pub fn play(&mut self) {
        match self.state.phase {
            SyncPhase::Playing => return,
            SyncPhase::Scrubbing => {
                debug!("play() ignored while scrubbing");
                return;
            }
            _ => {}
        }
        if !self.both_loaded() {
            debug!("play() ignored: both slots must be loaded");
            return;
        }

        self.refresh_units();

        // Re-apply the rate right before play so a speed picked while paused takes effect
        let rate = self.state.rate;
        for side in Side::BOTH {
            self.slot_mut(side).unit.set_rate(rate);
        }
        for side in Side::BOTH {
            self.slot_mut(side).unit.play();
        }

        self.start_polling();
        self.set_phase(SyncPhase::Playing);
    }

    /// Pause both players. Idempotent.
    ///
    /// Also ends a scrub without seeking: the players stay where the drag left them.
    pub fn pause(&mut self) {
        self.stop_polling();
        if !matches!(self.state.phase, SyncPhase::Playing | SyncPhase::Scrubbing) {
            return;
        }
        for side in Side::BOTH {
            self.slot_mut(side).unit.pause();
        }
        self.set_phase(self.settled_phase());
    }

    /// Change speed on both players immediately, in any phase.
    pub fn set_rate(&mut self, rate: f64) -> Result<(), SyncError> {
        if !is_valid_rate(rate) {
            warn!("Rejected playback rate {}", rate);
            return Err(SyncError::InvalidRate(rate));
        }
        self.state.rate = rate;
        for side in Side::BOTH {
            self.slot_mut(side).unit.set_rate(rate);
        }
        debug!("Rate set to {}", rate);
        self.events.emit(RateChangedEvent(rate));
        Ok(())
    }

    /// Move to the next faster/slower preset. Returns the rate in effect.
    pub fn step_rate(&mut self, faster: bool) -> f64 {
        let current = self.state.rate;
        let next = if faster {
            RATE_PRESETS.iter().copied().find(|&r| r > current)
        } else {
            RATE_PRESETS.iter().copied().rev().find(|&r| r < current)
        };
        if let Some(rate) = next {
            // Presets are all valid rates
            let _ = self.set_rate(rate);
        }
        self.state.rate
    }

    /// Scrubber pressed: stop polling and pause until `scrub()`.
    pub fn begin_scrub(&mut self) {
        if self.left.recording.is_none() && self.right.recording.is_none() {
            return;
        }
        self.halt();
        self.set_phase(SyncPhase::Scrubbing);
    }

    /// Seek both players to the same literal time.
    ///
    /// Each player clamps to its own duration, so clips of different length
    /// can land at different relative positions. The scrubber shows `target_ms`
    /// right away. Playback is not resumed.
    pub fn scrub(&mut self, target_ms: f64) {
        if !target_ms.is_finite() {
            warn!("Scrub target {} is not finite", target_ms);
            return;
        }
        self.halt();

        let target = target_ms.max(0.0);
        for side in Side::BOTH {
            self.slot_mut(side).unit.seek(target);
        }
        self.set_position(target);
        self.set_phase(self.settled_phase());
    }

    /// Seek each player to its own timestamp for `keyframe`.
    ///
    /// Pauses first when playing. The scrubber shows the mean of both targets.
    pub fn jump_to_keyframe(&mut self, keyframe: &CommonKeyframe) {
        if self.is_playing() {
            self.pause();
        } else {
            self.halt();
        }

        for side in Side::BOTH {
            self.slot_mut(side).unit.seek(keyframe.timestamp_ms(side));
        }
        debug!(
            "Jumped to '{}' (left {}ms, right {}ms)",
            keyframe.name, keyframe.left_timestamp_ms, keyframe.right_timestamp_ms
        );
        self.set_position(keyframe.display_position_ms());
        self.set_phase(self.settled_phase());
    }

    // === Frame / tick entry points ===

    /// Scheduled tick. Ticks from a cancelled loop are dropped.
    pub fn on_tick(&mut self, id: TickId) {
        if self.poll != Some(id) {
            trace!("Dropped stale tick {}", id.raw());
            return;
        }
        self.update();
    }

    /// Host frame hook: drain player status, then poll positions if playing.
    pub fn update(&mut self) {
        self.refresh_units();
        if self.poll.is_some() && self.is_playing() {
            self.poll_positions();
        }
    }

    fn refresh_units(&mut self) {
        for side in Side::BOTH {
            let events = self.slot_mut(side).unit.refresh();
            for event in events {
                self.on_unit_event(side, event);
            }
        }
        self.update_max_duration();
    }

    fn on_unit_event(&mut self, side: Side, event: UnitEvent) {
        match event {
            UnitEvent::Ready => {
                // Commands issued while loading were dropped; re-issue what matters
                let rate = self.state.rate;
                let playing = self.is_playing();
                let unit = &mut self.slot_mut(side).unit;
                unit.set_rate(rate);
                if playing {
                    unit.play();
                }
                let duration_ms = unit.duration();
                if playing {
                    self.drift_anchor_ms = None;
                }
                info!("Slot {} ready ({}ms)", side, duration_ms);
                self.events.emit(SlotReadyEvent { side, duration_ms });
            }
            UnitEvent::Failed(reason) => {
                self.events.emit(SlotFailedEvent { side, reason });
            }
            UnitEvent::Lost => {
                debug!("Slot {} lost its resource", side);
            }
        }
    }

    fn poll_positions(&mut self) {
        let (left, right) = (&self.left.unit, &self.right.unit);
        if !(left.is_ready() && right.is_ready()) {
            return;
        }
        let (left_pos, right_pos) = (left.position(), right.position());
        let both_at_end = left.at_end() && right.at_end();

        self.set_position((left_pos + right_pos) / 2.0);
        self.correct_drift(left_pos, right_pos);

        let max = self.state.max_duration_ms;
        if (max > 0.0 && self.state.position_ms >= max) || both_at_end {
            debug!("Playback reached end at {}ms", self.state.position_ms);
            self.pause();
            self.events.emit(PlaybackEndedEvent {
                position_ms: self.state.position_ms,
            });
        }
    }

    /// Keep the right clip at the offset it had when playback started.
    fn correct_drift(&mut self, left_pos: f64, right_pos: f64) {
        let Some(threshold) = self.settings.drift_threshold_ms else {
            return;
        };
        // A finished clip no longer moves; its offset to the other one is meaningless
        if self.left.unit.at_end() || self.right.unit.at_end() {
            return;
        }
        let anchor = *self.drift_anchor_ms.get_or_insert(right_pos - left_pos);
        let drift = (right_pos - left_pos) - anchor;
        if drift.abs() <= threshold {
            return;
        }

        let target = left_pos + anchor;
        let right = &mut self.right.unit;
        if target < 0.0 || target > right.duration() {
            return;
        }
        debug!("Drift {}ms over threshold, re-seeking right to {}ms", drift, target);
        right.seek(target);
        self.events.emit(DriftCorrectedEvent {
            side: Side::Right,
            drift_ms: drift,
        });
    }

    // === Internals ===

    /// Cancel polling and pause both players if they were moving.
    fn halt(&mut self) {
        self.stop_polling();
        if matches!(self.state.phase, SyncPhase::Playing | SyncPhase::Scrubbing) {
            for side in Side::BOTH {
                self.slot_mut(side).unit.pause();
            }
        }
    }

    fn start_polling(&mut self) {
        self.stop_polling();
        let id = self.scheduler.start(self.settings.tick_interval());
        trace!("Poll loop {} started", id.raw());
        self.poll = Some(id);
        self.drift_anchor_ms = None;
    }

    fn stop_polling(&mut self) {
        if let Some(id) = self.poll.take() {
            self.scheduler.cancel(id);
            trace!("Poll loop {} cancelled", id.raw());
        }
    }

    fn settled_phase(&self) -> SyncPhase {
        if let Some(side) = self.awaiting {
            SyncPhase::AwaitingSlot(side)
        } else if self.both_loaded() {
            SyncPhase::Ready
        } else {
            SyncPhase::Idle
        }
    }

    /// Recompute the resting phase unless transport is active.
    fn settle_phase(&mut self) {
        if !matches!(self.state.phase, SyncPhase::Playing | SyncPhase::Scrubbing) {
            self.set_phase(self.settled_phase());
        }
    }

    fn set_phase(&mut self, to: SyncPhase) {
        let from = self.state.phase;
        if from == to {
            return;
        }
        debug!("Phase {:?} -> {:?}", from, to);
        self.state.phase = to;
        self.events.emit(PhaseChangedEvent { from, to });
    }

    fn set_position(&mut self, position_ms: f64) {
        if self.state.position_ms == position_ms {
            return;
        }
        self.state.position_ms = position_ms;
        self.events.emit(PositionChangedEvent {
            position_ms,
            max_duration_ms: self.state.max_duration_ms,
        });
    }

    fn update_max_duration(&mut self) {
        self.state.max_duration_ms = self.left.unit.duration().max(self.right.unit.duration());
    }
}

impl<S: TickScheduler> Drop for SyncController<S> {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::{downcast_event, Event, EventBus};
    use crate::core::sim_backend::{SimCommand, SimulatedBackend};
    use crate::core::ticker::{ManualTicker, TickProbe};
    use crate::entities::{align_common_keyframes, KeyframeMap};

    const LEFT: &str = "file:///left.mp4";
    const RIGHT: &str = "file:///right.mp4";

    struct Rig {
        ctl: SyncController<ManualTicker>,
        left: SimulatedBackend,
        right: SimulatedBackend,
        probe: TickProbe,
        bus: EventBus,
    }

    fn rig_with(left: SimulatedBackend, right: SimulatedBackend, settings: SyncSettings) -> Rig {
        let ticker = ManualTicker::new();
        let probe = ticker.probe();
        let bus = EventBus::new();
        let ctl = SyncController::new(
            Box::new(left.clone()),
            Box::new(right.clone()),
            ticker,
            settings,
        )
        .with_events(SyncEventEmitter::from_emitter(bus.emitter()));
        Rig {
            ctl,
            left,
            right,
            probe,
            bus,
        }
    }

    fn rig(left_ms: f64, right_ms: f64) -> Rig {
        rig_with(
            SimulatedBackend::manual().with_source(LEFT, left_ms),
            SimulatedBackend::manual().with_source(RIGHT, right_ms),
            SyncSettings::default(),
        )
    }

    fn load_both(rig: &mut Rig) -> (Recording, Recording) {
        let l = Recording::new("left", LEFT);
        let r = Recording::new("right", RIGHT);
        rig.ctl.select_video(Side::Left, l.clone()).unwrap();
        rig.ctl.select_video(Side::Right, r.clone()).unwrap();
        rig.ctl.update();
        (l, r)
    }

    fn tick(rig: &mut Rig) {
        let id = rig.probe.active().expect("poll loop active");
        rig.ctl.on_tick(id);
    }

    fn count<E: Event>(rig: &Rig) -> usize {
        rig.bus
            .poll()
            .iter()
            .filter(|e| downcast_event::<E>(e).is_some())
            .count()
    }

    #[test]
    fn test_starts_idle() {
        let rig = rig(1000.0, 1000.0);
        assert_eq!(rig.ctl.phase(), SyncPhase::Idle);
        assert_eq!(rig.ctl.state().rate, 1.0);
        assert!(!rig.ctl.is_polling());
    }

    #[test]
    fn test_both_loaded_is_ready() {
        let mut rig = rig(4000.0, 9000.0);
        rig.ctl.select_video(Side::Left, Recording::new("l", LEFT)).unwrap();
        assert_eq!(rig.ctl.phase(), SyncPhase::Idle);

        rig.ctl.select_video(Side::Right, Recording::new("r", RIGHT)).unwrap();
        rig.ctl.update();
        assert_eq!(rig.ctl.phase(), SyncPhase::Ready);
        assert_eq!(rig.ctl.state().max_duration_ms, 9000.0);
        assert!(rig.ctl.unit(Side::Left).is_ready());
        assert!(rig.ctl.unit(Side::Right).is_ready());
    }

    #[test]
    fn test_play_pause_twice_restores_phase_and_cancels_loop() {
        let mut rig = rig(5000.0, 5000.0);
        load_both(&mut rig);
        let before = rig.ctl.state().clone();

        rig.ctl.play_pause();
        assert_eq!(rig.ctl.phase(), SyncPhase::Playing);
        assert!(rig.ctl.is_polling());
        assert!(rig.left.is_playing() && rig.right.is_playing());

        rig.ctl.play_pause();
        assert_eq!(rig.ctl.state(), &before);
        assert!(!rig.ctl.is_polling());
        assert_eq!(rig.probe.active(), None);
        assert_eq!(rig.probe.started(), 1);
        assert_eq!(rig.probe.cancelled(), rig.probe.started());
        assert!(!rig.left.is_playing() && !rig.right.is_playing());
    }

    #[test]
    fn test_play_applies_rate_before_play_on_both() {
        let mut rig = rig(5000.0, 5000.0);
        load_both(&mut rig);
        rig.left.clear_commands();
        rig.right.clear_commands();

        rig.ctl.play();
        for sim in [&rig.left, &rig.right] {
            assert_eq!(sim.commands(), vec![SimCommand::SetRate(1.0), SimCommand::Play]);
        }
    }

    #[test]
    fn test_repeated_play_keeps_single_loop() {
        let mut rig = rig(5000.0, 5000.0);
        load_both(&mut rig);
        rig.ctl.play();
        rig.ctl.play();
        rig.ctl.pause();
        rig.ctl.play();
        assert_eq!(rig.probe.started(), 2);
        assert_eq!(rig.probe.cancelled(), 1);
        assert!(rig.probe.active().is_some());
    }

    #[test]
    fn test_pause_is_idempotent() {
        let mut rig = rig(5000.0, 5000.0);
        load_both(&mut rig);
        rig.ctl.play();
        rig.ctl.pause();
        let once = rig.ctl.state().clone();
        rig.ctl.pause();
        assert_eq!(rig.ctl.state(), &once);
        assert_eq!(rig.probe.cancelled(), 1);
    }

    #[test]
    fn test_play_needs_both_slots() {
        let mut rig = rig(5000.0, 5000.0);
        rig.ctl.select_video(Side::Left, Recording::new("l", LEFT)).unwrap();
        rig.ctl.update();
        rig.ctl.play_pause();
        assert_eq!(rig.ctl.phase(), SyncPhase::Idle);
        assert_eq!(rig.probe.started(), 0);
        assert!(!rig.left.is_playing());
    }

    #[test]
    fn test_poll_publishes_mean_position() {
        let mut rig = rig(5000.0, 5000.0);
        load_both(&mut rig);
        rig.ctl.play();

        rig.left.advance(100.0);
        rig.right.advance(140.0);
        tick(&mut rig);
        assert_eq!(rig.ctl.state().position_ms, 120.0);
        assert!(count::<PositionChangedEvent>(&rig) >= 1);
    }

    #[test]
    fn test_scrub_clamps_each_side_to_own_duration() {
        let mut rig = rig(4000.0, 9000.0);
        load_both(&mut rig);

        rig.ctl.scrub(6000.0);
        rig.ctl.update();
        assert_eq!(rig.ctl.unit(Side::Left).position(), 4000.0);
        assert_eq!(rig.ctl.unit(Side::Right).position(), 6000.0);
        assert_eq!(rig.ctl.state().position_ms, 6000.0);
        assert_eq!(rig.ctl.phase(), SyncPhase::Ready);
    }

    #[test]
    fn test_scrub_cancels_loop_and_stale_tick_is_ignored() {
        let mut rig = rig(4000.0, 9000.0);
        load_both(&mut rig);
        rig.ctl.play();
        let stale = rig.probe.active().unwrap();

        rig.ctl.begin_scrub();
        assert_eq!(rig.ctl.phase(), SyncPhase::Scrubbing);
        assert!(!rig.ctl.is_polling());
        assert!(!rig.left.is_playing() && !rig.right.is_playing());

        rig.ctl.scrub(6000.0);
        // A tick that was already queued must not replace the dragged position
        rig.ctl.on_tick(stale);
        assert_eq!(rig.ctl.state().position_ms, 6000.0);
        assert_eq!(rig.ctl.phase(), SyncPhase::Ready);
        assert_eq!(rig.probe.started(), rig.probe.cancelled());
    }

    #[test]
    fn test_play_ignored_while_scrubbing() {
        let mut rig = rig(5000.0, 5000.0);
        load_both(&mut rig);
        rig.ctl.begin_scrub();
        rig.ctl.play_pause();
        assert_eq!(rig.ctl.phase(), SyncPhase::Scrubbing);
        assert_eq!(rig.probe.started(), 0);
    }

    #[test]
    fn test_jump_pauses_and_seeks_each_side() {
        let mut rig = rig(5000.0, 5000.0);
        load_both(&mut rig);
        rig.ctl.play();

        let k = CommonKeyframe {
            name: "top".into(),
            left_timestamp_ms: 1200.0,
            right_timestamp_ms: 1800.0,
            label: "Top".into(),
        };
        rig.ctl.jump_to_keyframe(&k);
        assert_eq!(rig.ctl.phase(), SyncPhase::Ready);
        assert!(!rig.ctl.is_polling());
        assert_eq!(rig.probe.cancelled(), 1);
        assert!(!rig.left.is_playing() && !rig.right.is_playing());
        assert_eq!(rig.left.position_ms(), 1200.0);
        assert_eq!(rig.right.position_ms(), 1800.0);
    }

    #[test]
    fn test_keyframe_scenario_end_to_end() {
        let mut rig = rig(5000.0, 5000.0);
        let left_keys = KeyframeMap::new().with("impact", 2.5, "ball strike");
        let right_keys = KeyframeMap::new().with("impact", 3.1, "ball strike");
        let l = Recording::new("monday", LEFT).with_keyframes(left_keys);
        let r = Recording::new("friday", RIGHT).with_keyframes(right_keys);
        rig.ctl.select_video(Side::Left, l.clone()).unwrap();
        rig.ctl.select_video(Side::Right, r.clone()).unwrap();
        rig.ctl.update();

        let common = align_common_keyframes(&l.keyframes, &r.keyframes);
        let impact = common.iter().find(|k| k.name == "impact").unwrap();
        rig.ctl.jump_to_keyframe(impact);
        rig.ctl.update();

        assert_eq!(rig.ctl.unit(Side::Left).position(), 2500.0);
        assert!((rig.ctl.unit(Side::Right).position() - 3100.0).abs() < 1e-6);
        assert!((rig.ctl.state().position_ms - 2800.0).abs() < 1e-6);
    }

    #[test]
    fn test_set_rate_applies_during_playback() {
        let mut rig = rig(5000.0, 5000.0);
        load_both(&mut rig);
        rig.ctl.play();
        rig.ctl.set_rate(0.5).unwrap();
        assert_eq!(rig.left.rate(), 0.5);
        assert_eq!(rig.right.rate(), 0.5);
        assert!(rig.ctl.is_playing());

        assert_eq!(rig.ctl.set_rate(0.0), Err(SyncError::InvalidRate(0.0)));
        assert_eq!(rig.ctl.state().rate, 0.5);
    }

    #[test]
    fn test_rate_set_while_loading_is_reapplied() {
        let mut rig = rig_with(
            SimulatedBackend::manual().with_source(LEFT, 5000.0).with_load_delay(2),
            SimulatedBackend::manual().with_source(RIGHT, 5000.0).with_load_delay(2),
            SyncSettings::default(),
        );
        rig.ctl.select_video(Side::Left, Recording::new("l", LEFT)).unwrap();
        rig.ctl.select_video(Side::Right, Recording::new("r", RIGHT)).unwrap();

        rig.ctl.set_rate(2.0).unwrap();
        assert_eq!(rig.left.rate(), 1.0);

        rig.ctl.update();
        rig.ctl.update();
        assert!(rig.ctl.unit(Side::Left).is_ready());
        assert_eq!(rig.left.rate(), 2.0);
        assert_eq!(rig.right.rate(), 2.0);
        assert_eq!(count::<SlotReadyEvent>(&rig), 2);
    }

    #[test]
    fn test_late_ready_unit_joins_playback() {
        let mut rig = rig_with(
            SimulatedBackend::manual().with_source(LEFT, 5000.0).with_load_delay(2),
            SimulatedBackend::manual().with_source(RIGHT, 5000.0),
            SyncSettings::default(),
        );
        rig.ctl.select_video(Side::Left, Recording::new("l", LEFT)).unwrap();
        rig.ctl.select_video(Side::Right, Recording::new("r", RIGHT)).unwrap();

        // Pressed before the left clip finished loading
        rig.ctl.play();
        assert!(!rig.left.is_playing());
        assert!(rig.ctl.is_playing());

        tick(&mut rig);
        assert!(rig.left.is_playing());
        assert!(rig.right.is_playing());
    }

    #[test]
    fn test_step_rate_walks_presets() {
        let mut rig = rig(5000.0, 5000.0);
        assert_eq!(rig.ctl.step_rate(true), 1.5);
        assert_eq!(rig.ctl.step_rate(true), 2.0);
        assert_eq!(rig.ctl.step_rate(true), 2.0);
        assert_eq!(rig.ctl.step_rate(false), 1.5);
        rig.ctl.set_rate(0.3).unwrap();
        assert_eq!(rig.ctl.step_rate(false), 0.25);
        assert_eq!(rig.ctl.step_rate(false), 0.1);
        assert_eq!(rig.ctl.step_rate(false), 0.1);
    }

    #[test]
    fn test_playback_ends_at_longer_clip() {
        let mut rig = rig(1000.0, 1000.0);
        load_both(&mut rig);
        rig.ctl.play();
        rig.bus.poll();

        rig.left.advance(1000.0);
        rig.right.advance(1000.0);
        tick(&mut rig);
        assert_eq!(rig.ctl.phase(), SyncPhase::Ready);
        assert!(!rig.ctl.is_polling());
        assert_eq!(rig.probe.cancelled(), 1);
        assert_eq!(count::<PlaybackEndedEvent>(&rig), 1);
    }

    #[test]
    fn test_playback_ends_when_both_clips_finish() {
        let mut rig = rig(1000.0, 3000.0);
        load_both(&mut rig);
        rig.ctl.play();

        rig.left.advance(3000.0);
        rig.right.advance(3000.0);
        tick(&mut rig);
        // Mean (2000) never reaches 3000, but nothing is moving any more
        assert_eq!(rig.ctl.state().position_ms, 2000.0);
        assert_eq!(rig.ctl.phase(), SyncPhase::Ready);
        assert!(!rig.ctl.is_polling());
    }

    #[test]
    fn test_select_conflict_leaves_state_unchanged() {
        let mut rig = rig(5000.0, 5000.0);
        let rec = Recording::new("same", LEFT);
        rig.ctl.select_video(Side::Left, rec.clone()).unwrap();
        rig.ctl.activate_slot(Side::Right);
        let before = rig.ctl.state().clone();

        let err = rig.ctl.select_video(Side::Right, rec.clone()).unwrap_err();
        assert_eq!(
            err,
            SyncError::SlotConflict {
                side: Side::Right,
                recording: rec.id
            }
        );
        assert_eq!(rig.ctl.state(), &before);
        assert!(rig.ctl.recording(Side::Right).is_none());
        assert_eq!(rig.ctl.awaiting_slot(), Some(Side::Right));
        assert_eq!(count::<SelectionRejectedEvent>(&rig), 1);
    }

    #[test]
    fn test_activate_then_select_clears_awaiting() {
        let mut rig = rig(5000.0, 5000.0);
        rig.ctl.activate_slot(Side::Left);
        assert_eq!(rig.ctl.phase(), SyncPhase::AwaitingSlot(Side::Left));

        rig.ctl.select_video(Side::Left, Recording::new("l", LEFT)).unwrap();
        assert_eq!(rig.ctl.awaiting_slot(), None);
        assert_eq!(rig.ctl.phase(), SyncPhase::Idle);

        rig.ctl.activate_slot(Side::Right);
        rig.ctl.select_video(Side::Right, Recording::new("r", RIGHT)).unwrap();
        assert_eq!(rig.ctl.phase(), SyncPhase::Ready);
    }

    #[test]
    fn test_clear_slot_while_playing() {
        let mut rig = rig(5000.0, 5000.0);
        load_both(&mut rig);
        rig.ctl.play();
        rig.left.advance(500.0);
        rig.right.advance(500.0);
        tick(&mut rig);
        assert_eq!(rig.ctl.state().position_ms, 500.0);

        rig.ctl.clear_slot(Side::Right);
        assert_eq!(rig.ctl.phase(), SyncPhase::Idle);
        assert_eq!(rig.ctl.state().position_ms, 0.0);
        assert_eq!(rig.ctl.state().max_duration_ms, 5000.0);
        assert!(!rig.ctl.is_polling());
        assert!(!rig.left.is_playing());
        assert!(rig.ctl.recording(Side::Right).is_none());
        assert_eq!(rig.right.commands().last(), Some(&SimCommand::Unload));
    }

    #[test]
    fn test_load_failure_is_reported_not_raised() {
        let mut rig = rig(5000.0, 5000.0);
        rig.ctl.select_video(Side::Left, Recording::new("l", LEFT)).unwrap();
        rig.ctl
            .select_video(Side::Right, Recording::new("broken", "file:///missing.mp4"))
            .unwrap();
        rig.ctl.update();

        assert!(!rig.ctl.unit(Side::Right).is_ready());
        assert!(rig.ctl.unit(Side::Right).load_error().is_some());
        assert_eq!(count::<SlotFailedEvent>(&rig), 1);

        // Transport still runs the healthy side
        rig.ctl.play();
        assert!(rig.left.is_playing());
    }

    #[test]
    fn test_drift_correction_reseeks_right() {
        let settings = SyncSettings {
            drift_threshold_ms: Some(50.0),
            ..Default::default()
        };
        let mut rig = rig_with(
            SimulatedBackend::manual().with_source(LEFT, 5000.0),
            SimulatedBackend::manual().with_source(RIGHT, 5000.0),
            settings,
        );
        load_both(&mut rig);
        rig.ctl.jump_to_keyframe(&CommonKeyframe {
            name: "impact".into(),
            left_timestamp_ms: 1000.0,
            right_timestamp_ms: 1500.0,
            label: "Impact".into(),
        });
        rig.ctl.play();
        tick(&mut rig); // anchors the 500ms offset

        rig.left.advance(200.0);
        rig.right.advance(400.0);
        tick(&mut rig);
        assert_eq!(rig.right.position_ms(), 1700.0);
        assert_eq!(count::<DriftCorrectedEvent>(&rig), 1);

        // Within threshold: no correction
        rig.left.advance(100.0);
        rig.right.advance(120.0);
        tick(&mut rig);
        assert_eq!(rig.right.position_ms(), 1820.0);
        assert_eq!(count::<DriftCorrectedEvent>(&rig), 0);
    }

    #[test]
    fn test_drift_correction_lets_shorter_clip_finish() {
        let settings = SyncSettings {
            drift_threshold_ms: Some(50.0),
            ..Default::default()
        };
        let mut rig = rig_with(
            SimulatedBackend::manual().with_source(LEFT, 1000.0),
            SimulatedBackend::manual().with_source(RIGHT, 3000.0),
            settings,
        );
        load_both(&mut rig);
        rig.ctl.play();
        rig.bus.poll();

        for _ in 0..40 {
            if !rig.ctl.is_polling() {
                break;
            }
            rig.left.advance(100.0);
            rig.right.advance(100.0);
            tick(&mut rig);
        }

        // Left stops at 1000 while right keeps running to its own end
        assert_eq!(rig.left.position_ms(), 1000.0);
        assert_eq!(rig.right.position_ms(), 3000.0);
        assert_eq!(rig.ctl.phase(), SyncPhase::Ready);
        assert!(!rig.ctl.is_polling());

        let events = rig.bus.poll();
        let corrected = events
            .iter()
            .filter(|e| downcast_event::<DriftCorrectedEvent>(e).is_some())
            .count();
        let ended = events
            .iter()
            .filter(|e| downcast_event::<PlaybackEndedEvent>(e).is_some())
            .count();
        assert_eq!(corrected, 0);
        assert_eq!(ended, 1);
    }

    #[test]
    fn test_pause_ends_scrub_in_place() {
        let mut rig = rig(5000.0, 5000.0);
        load_both(&mut rig);
        rig.ctl.scrub(1200.0);
        rig.ctl.begin_scrub();
        rig.left.clear_commands();
        rig.right.clear_commands();

        rig.ctl.pause();
        assert_eq!(rig.ctl.phase(), SyncPhase::Ready);
        assert_eq!(rig.ctl.state().position_ms, 1200.0);
        assert!(!rig.left.commands().iter().any(|c| matches!(c, SimCommand::Seek(_))));

        rig.ctl.play_pause();
        assert!(rig.ctl.is_playing());
    }

    #[test]
    fn test_timed_out_unit_joins_playback_when_ready() {
        let settings = SyncSettings {
            load_timeout_ms: Some(1),
            ..Default::default()
        };
        let mut rig = rig_with(
            SimulatedBackend::manual().with_source(LEFT, 5000.0).with_load_delay(3),
            SimulatedBackend::manual().with_source(RIGHT, 5000.0),
            settings,
        );
        rig.ctl.select_video(Side::Left, Recording::new("l", LEFT)).unwrap();
        rig.ctl.select_video(Side::Right, Recording::new("r", RIGHT)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));

        rig.ctl.play();
        assert!(rig.ctl.is_playing());
        assert!(rig.ctl.unit(Side::Left).load_error().is_some());
        assert!(!rig.left.is_playing());
        assert_eq!(count::<SlotFailedEvent>(&rig), 1);

        tick(&mut rig);
        tick(&mut rig);
        assert!(rig.ctl.unit(Side::Left).is_ready());
        assert_eq!(rig.ctl.unit(Side::Left).load_error(), None);
        assert!(rig.left.is_playing());
        assert!(rig.right.is_playing());
    }

    #[test]
    fn test_phase_events_published() {
        let mut rig = rig(5000.0, 5000.0);
        load_both(&mut rig);
        rig.bus.poll();

        rig.ctl.play_pause();
        rig.ctl.play_pause();
        let phases: Vec<_> = rig
            .bus
            .poll()
            .iter()
            .filter_map(|e| downcast_event::<PhaseChangedEvent>(e).map(|p| p.to))
            .collect();
        assert_eq!(phases, vec![SyncPhase::Playing, SyncPhase::Ready]);
    }
}
