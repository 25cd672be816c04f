//! Sync engine - players, ticks, events, controller
//!
//! These modules drive two players as one transport, independent of UI.

pub mod error;
pub mod event_bus;
pub mod playback_unit;
pub mod sim_backend;
pub mod sync_controller;
pub mod sync_events;
pub mod ticker;

// Re-exports for convenience
pub use error::SyncError;
pub use event_bus::{EventBus, SyncEventEmitter};
pub use playback_unit::{MediaBackend, MediaStatus, PlaybackHandle, PlaybackUnit, StatusSink};
pub use sim_backend::SimulatedBackend;
pub use sync_controller::{SyncController, SyncPhase, SyncState, RATE_PRESETS};
pub use ticker::{IntervalTicker, ManualTicker, TickId, TickScheduler};
