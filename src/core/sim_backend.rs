//! In-process media player with no decoding.
//!
//! Stands in for the real video component: knows a duration per source URI,
//! advances a playhead by elapsed time times rate, clamps at the end and
//! reports status through the sink like a real player would.
//!
//! Two clocks:
//! - **Wall**: `on_frame()` advances by real elapsed time (CLI host)
//! - **Manual**: time only moves through [`SimulatedBackend::advance`] (tests)
//!
//! Handles are cheap clones over shared state, so a test can keep one while
//! the unit owns the other, and inspect the command log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use log::trace;

use super::playback_unit::{MediaBackend, MediaStatus, StatusSink};

/// Commands received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    Load(String),
    Unload,
    Play,
    Pause,
    Seek(f64),
    SetRate(f64),
}

#[derive(Debug, Clone, Copy)]
enum SimClock {
    Wall { last: Option<Instant> },
    Manual,
}

#[derive(Debug)]
struct SimState {
    sources: HashMap<String, f64>,
    load_delay_frames: u32,
    /// Frames left before the current load completes
    pending_frames: Option<u32>,
    sink: Option<StatusSink>,
    loaded: bool,
    duration_ms: f64,
    position_ms: f64,
    rate: f64,
    playing: bool,
    clock: SimClock,
    commands: Vec<SimCommand>,
}

impl SimState {
    fn report(&self, status: MediaStatus) {
        if let Some(ref sink) = self.sink {
            sink.report(status);
        }
    }

    fn report_position(&self) {
        if self.loaded {
            self.report(MediaStatus::loaded(self.duration_ms, self.position_ms));
        }
    }

    fn finish_load(&mut self) {
        self.pending_frames = None;
        self.loaded = true;
        self.report_position();
    }

    fn step(&mut self, elapsed_ms: f64) {
        if !self.playing || !self.loaded {
            return;
        }
        self.position_ms += elapsed_ms * self.rate;
        if self.duration_ms > 0.0 && self.position_ms >= self.duration_ms {
            self.position_ms = self.duration_ms;
            self.playing = false;
            trace!("SimulatedBackend: reached end at {}ms", self.duration_ms);
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    /// Wall-clock player
    pub fn new() -> Self {
        Self::with_clock(SimClock::Wall { last: None })
    }

    /// Manual-clock player for deterministic tests
    pub fn manual() -> Self {
        Self::with_clock(SimClock::Manual)
    }

    fn with_clock(clock: SimClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                sources: HashMap::new(),
                load_delay_frames: 0,
                pending_frames: None,
                sink: None,
                loaded: false,
                duration_ms: 0.0,
                position_ms: 0.0,
                rate: 1.0,
                playing: false,
                clock,
                commands: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a playable source. Unregistered URIs fail to load.
    pub fn with_source(self, uri: impl Into<String>, duration_ms: f64) -> Self {
        self.lock().sources.insert(uri.into(), duration_ms);
        self
    }

    /// Number of frames a load takes before reporting ready.
    pub fn with_load_delay(self, frames: u32) -> Self {
        self.lock().load_delay_frames = frames;
        self
    }

    /// Move time forward and report the new position.
    pub fn advance(&self, elapsed_ms: f64) {
        let mut state = self.lock();
        state.step(elapsed_ms);
        state.report_position();
    }

    /// Simulate a decoder failure on the current source.
    pub fn fail_load(&self, reason: &str) {
        let mut state = self.lock();
        state.loaded = false;
        state.playing = false;
        state.pending_frames = None;
        state.report(MediaStatus::failed(reason));
    }

    /// Sink of the current load
    pub fn sink(&self) -> Option<StatusSink> {
        self.lock().sink.clone()
    }

    pub fn position_ms(&self) -> f64 {
        self.lock().position_ms
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn rate(&self) -> f64 {
        self.lock().rate
    }

    pub fn commands(&self) -> Vec<SimCommand> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }
}

impl MediaBackend for SimulatedBackend {
    fn load(&mut self, source_uri: &str, status: StatusSink) {
        let mut state = self.lock();
        state.commands.push(SimCommand::Load(source_uri.to_string()));
        state.sink = Some(status);
        state.loaded = false;
        state.playing = false;
        state.position_ms = 0.0;
        state.pending_frames = None;

        let Some(duration) = state.sources.get(source_uri).copied() else {
            state.duration_ms = 0.0;
            state.report(MediaStatus::failed(format!("unknown source {}", source_uri)));
            return;
        };
        state.duration_ms = duration;

        if state.load_delay_frames == 0 {
            state.finish_load();
        } else {
            state.pending_frames = Some(state.load_delay_frames);
        }
    }

    fn unload(&mut self) {
        let mut state = self.lock();
        state.commands.push(SimCommand::Unload);
        state.sink = None;
        state.loaded = false;
        state.playing = false;
        state.pending_frames = None;
        state.position_ms = 0.0;
        state.duration_ms = 0.0;
    }

    fn play(&mut self) {
        let mut state = self.lock();
        state.commands.push(SimCommand::Play);
        if state.loaded {
            state.playing = true;
            if let SimClock::Wall { ref mut last } = state.clock {
                *last = Some(Instant::now());
            }
        }
    }

    fn pause(&mut self) {
        let mut state = self.lock();
        state.commands.push(SimCommand::Pause);
        if state.playing {
            // Account for time played since the last frame
            let clock = state.clock;
            if let SimClock::Wall { last: Some(last) } = clock {
                let elapsed = last.elapsed().as_secs_f64() * 1000.0;
                state.step(elapsed);
            }
            state.playing = false;
        }
        state.report_position();
    }

    fn seek(&mut self, position_ms: f64) {
        let mut state = self.lock();
        state.commands.push(SimCommand::Seek(position_ms));
        if !state.loaded {
            return;
        }
        state.position_ms = if state.duration_ms > 0.0 {
            position_ms.clamp(0.0, state.duration_ms)
        } else {
            position_ms.max(0.0)
        };
        if let SimClock::Wall { ref mut last } = state.clock {
            *last = Some(Instant::now());
        }
        state.report_position();
    }

    fn set_rate(&mut self, rate: f64) {
        let mut state = self.lock();
        state.commands.push(SimCommand::SetRate(rate));
        state.rate = rate;
    }

    fn on_frame(&mut self) {
        let mut state = self.lock();

        if let Some(frames) = state.pending_frames {
            if frames <= 1 {
                state.finish_load();
            } else {
                state.pending_frames = Some(frames - 1);
            }
            return;
        }

        let clock = state.clock;
        if let SimClock::Wall { last } = clock {
            let now = Instant::now();
            if let Some(last) = last {
                let elapsed = now.duration_since(last).as_secs_f64() * 1000.0;
                state.step(elapsed);
            }
            state.clock = SimClock::Wall { last: Some(now) };
        }

        if state.playing {
            state.report_position();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_manual_clock_advances_with_rate() {
        let mut sim = SimulatedBackend::manual().with_source("a", 1000.0);
        let (tx, rx) = unbounded();
        sim.load("a", StatusSink::new(1, tx));
        sim.set_rate(2.0);
        sim.play();
        sim.advance(100.0);
        assert_eq!(sim.position_ms(), 200.0);

        let last = rx.try_iter().last().unwrap();
        assert_eq!(last, (1, MediaStatus::loaded(1000.0, 200.0)));
    }

    #[test]
    fn test_stops_at_end() {
        let mut sim = SimulatedBackend::manual().with_source("a", 1000.0);
        let (tx, _rx) = unbounded();
        sim.load("a", StatusSink::new(1, tx));
        sim.play();
        sim.advance(5000.0);
        assert_eq!(sim.position_ms(), 1000.0);
        assert!(!sim.is_playing());
    }

    #[test]
    fn test_unknown_source_reports_failure() {
        let mut sim = SimulatedBackend::manual();
        let (tx, rx) = unbounded();
        sim.load("missing", StatusSink::new(3, tx));
        let (epoch, status) = rx.try_recv().unwrap();
        assert_eq!(epoch, 3);
        assert!(status.error.is_some());

        sim.play();
        assert!(!sim.is_playing());
    }
}
