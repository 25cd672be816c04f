//! One media player wrapped into a control surface that tolerates "not ready".
//!
//! Loading races with user input (play pressed right after picking a
//! clip). Every command on an unready unit is a silent no-op; callers that
//! need confirmation read [`PlaybackUnit::is_ready`] / [`PlaybackUnit::duration`].
//!
//! # Status flow
//!
//! The backend gets a [`StatusSink`] on `load()` and reports
//! [`MediaStatus`] whenever it likes (typically once per rendered frame while
//! active, and once when metadata arrives). Reports queue on a channel;
//! [`PlaybackUnit::refresh`] drains them and is the only writer of the cached
//! [`PlaybackHandle`].
//!
//! Each sink is stamped with the unit's load epoch. Changing the source bumps
//! the epoch, so a late report from the previous clip is dropped instead of
//! marking the new one ready.

use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::entities::Side;

/// Contract a media player must satisfy to be driven by the sync engine.
///
/// Commands are fire-and-forget; results come back through the sink.
pub trait MediaBackend: Send {
    /// Start loading a new source. Reports go to `status`.
    fn load(&mut self, source_uri: &str, status: StatusSink);

    /// Release the current source.
    fn unload(&mut self);

    fn play(&mut self);

    fn pause(&mut self);

    fn seek(&mut self, position_ms: f64);

    fn set_rate(&mut self, rate: f64);

    /// Host frame hook, called before pending reports are drained.
    /// Backends with their own reporting thread leave it empty.
    fn on_frame(&mut self) {}
}

/// Status report from a media backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaStatus {
    pub is_loaded: bool,
    pub duration_ms: Option<f64>,
    pub position_ms: Option<f64>,
    /// Set when the resource failed to load
    pub error: Option<String>,
}

impl MediaStatus {
    pub fn loaded(duration_ms: f64, position_ms: f64) -> Self {
        Self {
            is_loaded: true,
            duration_ms: Some(duration_ms),
            position_ms: Some(position_ms),
            error: None,
        }
    }

    /// Position-only update for an already loaded resource
    pub fn position(position_ms: f64) -> Self {
        Self {
            is_loaded: true,
            position_ms: Some(position_ms),
            ..Default::default()
        }
    }

    pub fn unloaded() -> Self {
        Self::default()
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Where a backend sends status reports for one load.
#[derive(Debug, Clone)]
pub struct StatusSink {
    epoch: u64,
    tx: Sender<(u64, MediaStatus)>,
}

impl StatusSink {
    pub(crate) fn new(epoch: u64, tx: Sender<(u64, MediaStatus)>) -> Self {
        Self { epoch, tx }
    }

    /// Returns false once the owning unit is gone.
    pub fn report(&self, status: MediaStatus) -> bool {
        self.tx.send((self.epoch, status)).is_ok()
    }
}

/// Cached state of the wrapped resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackHandle {
    pub source_uri: Option<String>,
    /// 0 until known
    pub duration_ms: f64,
    pub position_ms: f64,
    pub ready: bool,
    pub rate: f64,
    pub load_error: Option<String>,
}

impl Default for PlaybackHandle {
    fn default() -> Self {
        Self {
            source_uri: None,
            duration_ms: 0.0,
            position_ms: 0.0,
            ready: false,
            rate: 1.0,
            load_error: None,
        }
    }
}

/// Readiness edges observed while draining status reports.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitEvent {
    Ready,
    Failed(String),
    /// Backend reported the resource as no longer loaded
    Lost,
}

/// Playback rates must be finite and positive.
pub fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Clamp into `[0, duration]`, or `[0, inf)` while duration is unknown.
fn clamp_position(ms: f64, duration_ms: f64) -> f64 {
    if duration_ms > 0.0 {
        ms.clamp(0.0, duration_ms)
    } else {
        ms.max(0.0)
    }
}

pub struct PlaybackUnit {
    side: Side,
    backend: Box<dyn MediaBackend>,
    handle: PlaybackHandle,
    epoch: u64,
    status_tx: Sender<(u64, MediaStatus)>,
    status_rx: Receiver<(u64, MediaStatus)>,
    load_started: Option<Instant>,
    load_timeout: Option<Duration>,
}

impl std::fmt::Debug for PlaybackUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackUnit")
            .field("side", &self.side)
            .field("handle", &self.handle)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl PlaybackUnit {
    pub fn new(side: Side, backend: Box<dyn MediaBackend>) -> Self {
        let (status_tx, status_rx) = unbounded();
        Self {
            side,
            backend,
            handle: PlaybackHandle::default(),
            epoch: 0,
            status_tx,
            status_rx,
            load_started: None,
            load_timeout: None,
        }
    }

    /// Give up waiting for a load after `timeout` (None waits forever).
    pub fn with_load_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout = timeout;
        self
    }

    // === Commands ===

    /// Assign a new source; resets duration, position and readiness.
    pub fn load(&mut self, source_uri: &str) {
        self.epoch += 1;
        let rate = self.handle.rate;
        self.handle = PlaybackHandle {
            source_uri: Some(source_uri.to_string()),
            rate,
            ..Default::default()
        };
        self.load_started = Some(Instant::now());
        info!("[{}] Loading {}", self.side, source_uri);

        let sink = StatusSink::new(self.epoch, self.status_tx.clone());
        self.backend.load(source_uri, sink);
    }

    /// Drop the current source.
    pub fn unload(&mut self) {
        self.epoch += 1;
        let rate = self.handle.rate;
        if let Some(uri) = self.handle.source_uri.take() {
            debug!("[{}] Unloading {}", self.side, uri);
        }
        self.handle = PlaybackHandle {
            rate,
            ..Default::default()
        };
        self.load_started = None;
        self.backend.unload();
    }

    pub fn play(&mut self) {
        if !self.handle.ready {
            trace!("[{}] play() ignored: not ready", self.side);
            return;
        }
        self.backend.play();
    }

    /// Always safe, ready or not.
    pub fn pause(&mut self) {
        self.backend.pause();
    }

    /// Seek, clamped to this unit's own duration.
    pub fn seek(&mut self, target_ms: f64) {
        if !self.handle.ready {
            trace!("[{}] seek({}) ignored: not ready", self.side, target_ms);
            return;
        }
        if !target_ms.is_finite() {
            warn!("[{}] seek target {} is not finite", self.side, target_ms);
            return;
        }
        let clamped = clamp_position(target_ms, self.handle.duration_ms);
        trace!("[{}] seek {} -> {}", self.side, target_ms, clamped);
        self.backend.seek(clamped);
    }

    /// Set the rate used by this and subsequent `play()` calls.
    ///
    /// No-op while unready: the caller re-issues it once the unit is ready.
    pub fn set_rate(&mut self, rate: f64) {
        if !is_valid_rate(rate) {
            warn!("[{}] rejected playback rate {}", self.side, rate);
            return;
        }
        if !self.handle.ready {
            trace!("[{}] set_rate({}) ignored: not ready", self.side, rate);
            return;
        }
        self.handle.rate = rate;
        self.backend.set_rate(rate);
    }

    // === Status ===

    /// Drain pending status reports into the cached handle.
    pub fn refresh(&mut self) -> Vec<UnitEvent> {
        self.backend.on_frame();

        let pending: Vec<(u64, MediaStatus)> = self.status_rx.try_iter().collect();
        let mut events = Vec::new();
        for (epoch, status) in pending {
            if epoch != self.epoch {
                trace!("[{}] dropped report from stale load {}", self.side, epoch);
                continue;
            }
            self.apply_status(status, &mut events);
        }

        self.check_load_timeout(&mut events);
        events
    }

    fn apply_status(&mut self, status: MediaStatus, events: &mut Vec<UnitEvent>) {
        if let Some(reason) = status.error {
            if self.handle.load_error.as_deref() != Some(reason.as_str()) {
                warn!("[{}] load failed: {}", self.side, reason);
                events.push(UnitEvent::Failed(reason.clone()));
            }
            self.handle.ready = false;
            self.handle.load_error = Some(reason);
            self.load_started = None;
            return;
        }

        if !status.is_loaded {
            if self.handle.ready {
                debug!("[{}] resource no longer loaded", self.side);
                events.push(UnitEvent::Lost);
            }
            self.handle.ready = false;
            return;
        }

        if let Some(duration) = status.duration_ms.filter(|d| d.is_finite() && *d >= 0.0) {
            self.handle.duration_ms = duration;
        }
        if let Some(position) = status.position_ms.filter(|p| p.is_finite()) {
            self.handle.position_ms = position;
        }
        self.handle.position_ms = clamp_position(self.handle.position_ms, self.handle.duration_ms);

        if !self.handle.ready {
            self.handle.ready = true;
            self.handle.load_error = None;
            self.load_started = None;
            debug!("[{}] ready, duration {}ms", self.side, self.handle.duration_ms);
            events.push(UnitEvent::Ready);
        }
    }

    fn check_load_timeout(&mut self, events: &mut Vec<UnitEvent>) {
        let (Some(started), Some(timeout)) = (self.load_started, self.load_timeout) else {
            return;
        };
        if started.elapsed() < timeout {
            return;
        }
        let reason = format!("load timed out after {}ms", timeout.as_millis());
        warn!("[{}] {}", self.side, reason);
        self.handle.load_error = Some(reason.clone());
        self.load_started = None;
        events.push(UnitEvent::Failed(reason));
    }

    // === Accessors ===

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn handle(&self) -> &PlaybackHandle {
        &self.handle
    }

    pub fn duration(&self) -> f64 {
        self.handle.duration_ms
    }

    pub fn position(&self) -> f64 {
        self.handle.position_ms
    }

    pub fn is_ready(&self) -> bool {
        self.handle.ready
    }

    pub fn rate(&self) -> f64 {
        self.handle.rate
    }

    pub fn source_uri(&self) -> Option<&str> {
        self.handle.source_uri.as_deref()
    }

    pub fn load_error(&self) -> Option<&str> {
        self.handle.load_error.as_deref()
    }

    /// At or past the end of a known duration
    pub fn at_end(&self) -> bool {
        self.handle.ready && self.handle.duration_ms > 0.0 && self.handle.position_ms >= self.handle.duration_ms
    }
}
