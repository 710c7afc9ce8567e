/// Deterministic event queue.
///
/// Uses a `BinaryHeap` with reversed ordering to act as a min-heap keyed
/// by `(time, priority, event_id)`. Because event IDs are strictly
/// increasing, events with equal time and priority pop in insertion order,
/// and two queues fed the same calls always pop in the same order.
///
/// The queue does not know about the clock; causality is enforced by
/// the `Simulator` that owns it.

use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;

use crate::event::{Action, Event, EventHandle, EventIdGen, Priority, Queued};
use crate::time::SimTime;

/// Owns every pending event and the ID generator.
pub struct EventQueue<C> {
    heap: BinaryHeap<Queued<C>>,
    id_gen: EventIdGen,
}

impl<C> EventQueue<C> {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            id_gen: EventIdGen::new(),
        }
    }

    /// Insert a new valid event and return its handle.
    pub fn schedule(&mut self, time: SimTime, priority: Priority, action: Action<C>) -> EventHandle<C> {
        let id = self.id_gen.next_id();
        self.push(Event::new(id, time, priority, action))
    }

    /// Invalidate `handle` and insert its replacement at `time`.
    ///
    /// The superseded event stays in the heap and is dropped when popped.
    pub fn reschedule(&mut self, handle: &EventHandle<C>, time: SimTime) -> EventHandle<C> {
        let id = self.id_gen.next_id();
        let replacement = handle.0.reschedule(id, time);
        self.push(replacement)
    }

    fn push(&mut self, event: Event<C>) -> EventHandle<C> {
        let event = Rc::new(event);
        self.heap.push(Queued(Rc::clone(&event)));
        EventHandle(event)
    }

    /// Pop the next event (earliest time, lowest priority, lowest ID),
    /// valid or not.
    pub fn pop_next(&mut self) -> Option<EventHandle<C>> {
        self.heap.pop().map(|queued| EventHandle(queued.0))
    }

    /// Peek at the next event without removing it.
    pub fn peek_next(&self) -> Option<&Event<C>> {
        self.heap.peek().map(|queued| queued.0.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of queued events, including invalidated ones.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Number of queued events that would still fire.
    pub fn live_count(&self) -> usize {
        self.heap.iter().filter(|queued| queued.0.is_valid()).count()
    }
}

impl<C> Default for EventQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for EventQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.heap.len())
            .field("next_id", &self.id_gen.peek())
            .finish()
    }
}
