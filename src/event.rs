/// Event records for the simulation kernel.
///
/// An `Event` is created once, owned by the simulator's queue, and either
/// fires or is dropped. Its time, priority and callback never change; the
/// only mutable bit is the validity flag, which is flipped off when the
/// event is invalidated or superseded by a reschedule.

use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::simulation::{CallbackResult, EventHandler, Simulator};
use crate::time::SimTime;

/// Secondary ordering key. Lower values fire first at equal times.
pub type Priority = i64;

/// A shared, type-erased callback.
pub type Action<C> = Rc<dyn EventHandler<C>>;

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly-increasing event identifier.
///
/// Two events with equal `(time, priority)` are dispatched in ascending
/// `EventId` order, which is insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId(u64);

impl EventId {
    /// Wrap a raw u64 into an `EventId`.
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    /// Return the raw value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Deterministic event-ID generator. Each queue owns exactly one.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    /// Create a generator starting at 0.
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next ID without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A single scheduled unit of work.
pub struct Event<C> {
    id: EventId,
    time: SimTime,
    priority: Priority,
    valid: Cell<bool>,
    action: Action<C>,
}

impl<C> Event<C> {
    pub(crate) fn new(id: EventId, time: SimTime, priority: Priority, action: Action<C>) -> Self {
        Event {
            id,
            time,
            priority,
            valid: Cell::new(true),
            action,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// `false` once the event has been invalidated or rescheduled.
    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    /// Mark the event permanently non-executable. Idempotent.
    pub fn invalidate(&self) {
        self.valid.set(false);
    }

    /// Dispatch key: `(time, priority, id)`, compared lexicographically.
    pub fn key(&self) -> (SimTime, Priority, EventId) {
        (self.time, self.priority, self.id)
    }

    /// Invalidate `self` and return a fresh, valid copy at `time`.
    ///
    /// The copy shares the callback, so bound state travels with it.
    pub(crate) fn reschedule(&self, id: EventId, time: SimTime) -> Event<C> {
        self.invalidate();
        Event::new(id, time, self.priority, Rc::clone(&self.action))
    }

    /// Invoke the callback if the event is still valid.
    pub(crate) fn fire(&self, sim: &mut Simulator<C>) -> CallbackResult {
        if !self.is_valid() {
            return Ok(());
        }
        self.action.handle(sim)
    }
}

impl<C> fmt::Debug for Event<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("time", &self.time)
            .field("priority", &self.priority)
            .field("valid", &self.valid.get())
            .finish_non_exhaustive()
    }
}

// ── Event Handle ─────────────────────────────────────────────────────

/// Caller-side reference to a scheduled event.
///
/// A handle can only observe the event or switch it off; the queue stays
/// responsible for dispatching it.
pub struct EventHandle<C>(pub(crate) Rc<Event<C>>);

impl<C> EventHandle<C> {
    pub fn id(&self) -> EventId {
        self.0.id()
    }

    pub fn time(&self) -> SimTime {
        self.0.time()
    }

    pub fn priority(&self) -> Priority {
        self.0.priority()
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_valid()
    }

    /// Suppress the event. A no-op if it already fired or was invalidated.
    pub fn invalidate(&self) {
        self.0.invalidate();
    }
}

impl<C> Clone for EventHandle<C> {
    fn clone(&self) -> Self {
        EventHandle(Rc::clone(&self.0))
    }
}

impl<C> fmt::Debug for EventHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Queue entry. `BinaryHeap` is a max-heap, so the ordering is reversed
/// to pop the smallest `(time, priority, id)` first.
pub(crate) struct Queued<C>(pub(crate) Rc<Event<C>>);

impl<C> Ord for Queued<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.key().cmp(&self.0.key())
    }
}

impl<C> PartialOrd for Queued<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> PartialEq for Queued<C> {
    fn eq(&self, other: &Self) -> bool {
        self.0.key() == other.0.key()
    }
}

impl<C> Eq for Queued<C> {}
