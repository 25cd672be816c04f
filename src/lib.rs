//! SWINGSYNC - synchronized side-by-side swing comparison library
//!
//! Re-exports all modules for use by binary targets.

// Sync engine (players, ticks, events, controller)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod session;

// Re-export commonly used types from core
pub use core::event_bus::{downcast_event, BoxedEvent, EventBus, EventEmitter, SyncEventEmitter};
pub use core::sync_controller::{SyncController, SyncPhase, SyncState};
pub use core::{MediaBackend, SyncError};

// Re-export entities
pub use entities::{CommonKeyframe, KeyframeMap, Recording, Side};
pub use session::ComparisonSession;
