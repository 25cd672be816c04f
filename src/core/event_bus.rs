//! Pub/Sub event bus between the sync engine and its observers.
//!
//! - Observers subscribe per event type; callbacks run synchronously inside `emit()`
//! - Every emitted event is also queued, so a frame-driven UI can `poll()` a batch
//! - Callback order is subscription order within one event type
//!
//! The controller never holds the bus itself, only a [`SyncEventEmitter`],
//! which is a no-op until wired.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::warn;

/// Queue length at which the oldest half is dropped
const MAX_QUEUE_SIZE: usize = 1000;

/// Anything sendable can be an event.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

pub type BoxedEvent = Box<dyn Event>;

/// Shared state behind both the bus and its emitter handles.
#[derive(Default)]
struct Channels {
    subscribers: RwLock<HashMap<TypeId, Vec<Callback>>>,
    queue: Mutex<Vec<BoxedEvent>>,
}

impl Channels {
    fn dispatch(&self, event: BoxedEvent) {
        let type_id = (*event).as_any().type_id();

        // Deref to dyn Event so as_any() yields the concrete type, not the Box
        if let Some(cbs) = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&type_id)
        {
            for cb in cbs {
                cb((*event).as_any());
            }
        }

        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict = queue.len() / 2;
            warn!("Event queue full ({} events), dropping oldest {}", queue.len(), evict);
            queue.drain(0..evict);
        }
        queue.push(event);
    }
}

/// Event bus owned by the host (UI shell, CLI).
#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<Channels>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of type `E`.
    ///
    /// # Example
    /// ```ignore
    /// bus.subscribe::<PositionChangedEvent, _>(move |e| {
    ///     scrubber.set_value(e.position_ms);
    /// });
    /// ```
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.channels
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    pub fn emit<E: Event>(&self, event: E) {
        self.channels.dispatch(Box::new(event));
    }

    /// Take every event queued since the last poll.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.channels.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Handle for the engine side.
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            channels: Arc::clone(&self.channels),
        }
    }

    pub fn unsubscribe_all<E: Event>(&self) {
        self.channels
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    pub fn queue_len(&self) -> usize {
        self.channels.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Cloneable emit-only handle.
#[derive(Clone)]
pub struct EventEmitter {
    channels: Arc<Channels>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field(
                "queue_len",
                &self.channels.queue.lock().map(|q| q.len()).unwrap_or(0),
            )
            .finish()
    }
}

impl EventEmitter {
    pub fn emit<E: Event>(&self, event: E) {
        self.channels.dispatch(Box::new(event));
    }
}

/// Emitter used by the sync controller; silent until connected to a bus.
#[derive(Clone, Default, Debug)]
pub struct SyncEventEmitter {
    inner: Option<EventEmitter>,
}

impl SyncEventEmitter {
    pub fn dummy() -> Self {
        Self { inner: None }
    }

    pub fn from_emitter(emitter: EventEmitter) -> Self {
        Self {
            inner: Some(emitter),
        }
    }

    pub fn emit<E: Event>(&self, event: E) {
        if let Some(ref emitter) = self.inner {
            emitter.emit(event);
        }
    }
}

/// Downcast a polled event.
///
/// Derefs to `dyn Event` first; calling `as_any()` on the `Box` itself would
/// hit the blanket impl and always fail the downcast.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}
