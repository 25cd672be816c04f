//! Scheduled ticks for the position-polling loop.
//!
//! The controller asks a [`TickScheduler`] for a repeating tick and keeps
//! the returned [`TickId`] as its single poll handle. Ticks carry their id,
//! so a tick that was already in flight when its loop got cancelled is
//! recognised as stale and dropped by the controller.
//!
//! - [`IntervalTicker`]: background thread per loop, ticks over a channel
//!   (headless hosts, CLI)
//! - [`ManualTicker`]: no thread; the host calls `SyncController::update()`
//!   from its own frame loop. Exposes a [`TickProbe`] for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, trace};

/// Identity of one scheduled repeating tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickId(u64);

impl TickId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Scheduling primitive behind the polling loop.
pub trait TickScheduler {
    /// Start a repeating tick at `interval`.
    fn start(&mut self, interval: Duration) -> TickId;

    /// Stop a tick. Unknown or already-cancelled ids are ignored.
    fn cancel(&mut self, id: TickId);
}

/// Fixed-interval timer threads delivering ticks over a channel.
///
/// # Example
/// ```ignore
/// let ticker = IntervalTicker::new();
/// let ticks = ticker.ticks();
/// let mut controller = SyncController::new(left, right, ticker, settings);
/// controller.play();
/// while let Ok(id) = ticks.recv() {
///     controller.on_tick(id);
///     if !controller.is_polling() { break; }
/// }
/// ```
pub struct IntervalTicker {
    next_id: u64,
    tx: Sender<TickId>,
    rx: Receiver<TickId>,
    running: HashMap<TickId, Arc<AtomicBool>>,
}

impl Default for IntervalTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl IntervalTicker {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            next_id: 0,
            tx,
            rx,
            running: HashMap::new(),
        }
    }

    /// Receiver the host loop reads ticks from.
    pub fn ticks(&self) -> Receiver<TickId> {
        self.rx.clone()
    }

    /// Number of loops not yet cancelled
    pub fn active_count(&self) -> usize {
        self.running.len()
    }
}

impl TickScheduler for IntervalTicker {
    fn start(&mut self, interval: Duration) -> TickId {
        self.next_id += 1;
        let id = TickId(self.next_id);
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = Arc::clone(&stop);
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("swingsync-tick-{}", id.0))
            .spawn(move || {
                trace!("Tick loop {} started ({:?})", id.0, interval);
                loop {
                    thread::sleep(interval);
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    if tx.send(id).is_err() {
                        break;
                    }
                }
                trace!("Tick loop {} stopped", id.0);
            });

        match spawned {
            Ok(_) => {
                self.running.insert(id, stop);
            }
            Err(e) => error!("Failed to spawn tick thread: {}", e),
        }
        id
    }

    fn cancel(&mut self, id: TickId) {
        if let Some(stop) = self.running.remove(&id) {
            stop.store(true, Ordering::Release);
            trace!("Tick loop {} cancelled", id.0);
        }
    }
}

impl Drop for IntervalTicker {
    fn drop(&mut self) {
        for stop in self.running.values() {
            stop.store(true, Ordering::Release);
        }
    }
}

#[derive(Debug, Default)]
struct ManualState {
    next_id: u64,
    active: Option<TickId>,
    started: usize,
    cancelled: usize,
    last_interval: Option<Duration>,
}

/// Host-driven scheduler: records start/cancel, never fires on its own.
#[derive(Debug, Default)]
pub struct ManualTicker {
    state: Arc<Mutex<ManualState>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view that stays valid after the ticker moves into a controller.
    pub fn probe(&self) -> TickProbe {
        TickProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl TickScheduler for ManualTicker {
    fn start(&mut self, interval: Duration) -> TickId {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.next_id += 1;
        let id = TickId(state.next_id);
        if let Some(prev) = state.active {
            // Overlapping loops are a controller bug; keep the count honest anyway
            log::warn!("ManualTicker: start() while tick {} still active", prev.0);
        }
        state.active = Some(id);
        state.started += 1;
        state.last_interval = Some(interval);
        id
    }

    fn cancel(&mut self, id: TickId) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.active == Some(id) {
            state.active = None;
            state.cancelled += 1;
        }
    }
}

/// Spy over a [`ManualTicker`].
#[derive(Debug, Clone)]
pub struct TickProbe {
    state: Arc<Mutex<ManualState>>,
}

impl TickProbe {
    pub fn active(&self) -> Option<TickId> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).active
    }

    pub fn started(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).started
    }

    pub fn cancelled(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).cancelled
    }

    pub fn last_interval(&self) -> Option<Duration> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).last_interval
    }
}
