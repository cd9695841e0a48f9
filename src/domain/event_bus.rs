//! In-process event bus with a bounded replay buffer.
//!
//! [`EventBus`] records every emitted [`BusEvent`] into a FIFO ring buffer
//! (default capacity 500) and synchronously invokes each subscriber. The
//! bus is a cheaply clonable handle; construct it once at startup and pass
//! clones to every component that captures or consumes events.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::Utc;

use super::{BusEvent, ContextSnapshot, EventData, EventId, EventKind};

/// Default number of events retained by the buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 500;

type Listener = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct BusInner {
    capacity: usize,
    buffer: Mutex<VecDeque<BusEvent>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

/// Capturing, buffering and fan-out of observability events.
///
/// # Re-entrancy
///
/// Listeners run after both internal locks are released, so a listener may
/// call back into the bus (including `emit`). Avoiding unbounded recursion
/// is the listener's responsibility.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.inner.capacity)
            .field("len", &self.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    /// Creates a bus retaining at most `capacity` events (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(BusInner {
                capacity,
                buffer: Mutex::new(VecDeque::with_capacity(capacity)),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    /// Records an event and delivers it to every current subscriber.
    ///
    /// The oldest buffered event is evicted when the buffer is full. A
    /// panicking listener is logged and skipped; the remaining listeners
    /// still run.
    pub fn emit(&self, kind: EventKind, data: impl Into<EventData>) -> BusEvent {
        let event = BusEvent {
            id: EventId::new(),
            kind,
            timestamp: Utc::now().timestamp_millis(),
            data: data.into(),
        };

        {
            let mut buffer = self
                .inner
                .buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            while buffer.len() >= self.inner.capacity {
                buffer.pop_front();
            }
            buffer.push_back(event.clone());
        }

        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::warn!(event_id = %event.id, kind = event.kind.as_str(), "bus listener panicked");
            }
        }

        event
    }

    /// Registers a listener for all future events.
    ///
    /// The returned [`Subscription`] removes exactly this listener when
    /// [`Subscription::unsubscribe`] is called. Dropping it does not
    /// unsubscribe.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Returns a copy of the buffered events, oldest first.
    #[must_use]
    pub fn buffer(&self) -> Vec<BusEvent> {
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Computes a fresh [`ContextSnapshot`] from the buffer.
    #[must_use]
    pub fn context(&self) -> ContextSnapshot {
        let buffer = self
            .inner
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        ContextSnapshot::from_events(buffer.iter(), Utc::now().timestamp_millis())
    }

    /// Empties the buffer. Subscribers are unaffected.
    pub fn clear(&self) {
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no events are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    id: u64,
}

impl Subscription {
    /// Removes the listener. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.bus.upgrade() {
            inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
