/// Simulation execution loop.
///
/// Drives the event queue: pops the minimum event, advances the clock,
/// and invokes the event's callback with the simulator itself so the
/// callback can schedule follow-up work at the just-advanced time. The
/// loop is synchronous and single-threaded; same-time events are fully
/// ordered by `(priority, insertion order)`.

use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{SimError, SimResult};
use crate::event::{Action, EventHandle, Priority};
use crate::scheduler::EventQueue;
use crate::time::SimTime;
use crate::trace::{Disposition, EventTrace};

/// Error type a callback may fail with.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result of invoking a callback.
pub type CallbackResult = Result<(), CallbackError>;

// ── Handler trait ─────────────────────────────────────────────────────

/// A unit of scheduled work.
///
/// Closures of the form `Fn(&mut Simulator<C>) -> CallbackResult`
/// implement this automatically; bound arguments are simply captured.
pub trait EventHandler<C> {
    fn handle(&self, sim: &mut Simulator<C>) -> CallbackResult;
}

impl<C, F> EventHandler<C> for F
where
    F: Fn(&mut Simulator<C>) -> CallbackResult,
{
    fn handle(&self, sim: &mut Simulator<C>) -> CallbackResult {
        (self)(sim)
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The queue is empty.
    Completed,
    /// The next pending event lies beyond `end_time`. It stays queued.
    HorizonReached,
}

/// Result of a single `step`.
#[derive(Debug)]
pub enum Step<C> {
    /// A valid event was popped and its callback ran.
    Fired(EventHandle<C>),
    /// An invalidated event was popped and dropped.
    Skipped(EventHandle<C>),
    /// Nothing was popped.
    Finished(RunOutcome),
}

// ── Simulator ─────────────────────────────────────────────────────────

/// Top-level simulation driver.
///
/// Owns the queue, the clock, the horizon and an opaque application
/// context `C` that callbacks reach through `context_mut`.
#[derive(Debug)]
pub struct Simulator<C = ()> {
    queue: EventQueue<C>,
    time: SimTime,
    end_time: SimTime,
    current_event: Option<EventHandle<C>>,
    events_processed: u64,
    events_skipped: u64,
    trace: Option<EventTrace>,
    context: C,
}

impl<C: Default> Simulator<C> {
    /// Create a simulator with a default context.
    pub fn new(start_time: SimTime, end_time: SimTime) -> SimResult<Self> {
        Self::with_context(start_time, end_time, C::default())
    }
}

impl<C> Simulator<C> {
    /// Create a simulator whose clock starts at `start_time`.
    ///
    /// Fails with `InvalidConfiguration` unless `end_time > start_time`.
    pub fn with_context(start_time: SimTime, end_time: SimTime, context: C) -> SimResult<Self> {
        if end_time <= start_time {
            return Err(SimError::InvalidConfiguration(format!(
                "end time {} must be after start time {}",
                end_time, start_time
            )));
        }
        debug!(start = %start_time, end = %end_time, "simulator created");
        Ok(Simulator {
            queue: EventQueue::new(),
            time: start_time,
            end_time,
            current_event: None,
            events_processed: 0,
            events_skipped: 0,
            trace: None,
            context,
        })
    }

    // ── Accessors ─────────────────────────────────────────────

    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.time
    }

    pub fn end_time(&self) -> SimTime {
        self.end_time
    }

    /// The event most recently popped by the run loop.
    pub fn current_event(&self) -> Option<&EventHandle<C>> {
        self.current_event.as_ref()
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }

    /// Queued events, including invalidated ones not yet popped.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Queued events that would still fire.
    pub fn live_count(&self) -> usize {
        self.queue.live_count()
    }

    /// Valid events dispatched so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Invalidated events dropped so far.
    pub fn events_skipped(&self) -> u64 {
        self.events_skipped
    }

    /// Returns `true` if there are no more events to process.
    pub fn is_finished(&self) -> bool {
        self.queue.is_empty()
    }

    /// Start recording every dispatched event.
    pub fn enable_trace(&mut self) {
        if self.trace.is_none() {
            self.trace = Some(EventTrace::new());
        }
    }

    pub fn trace(&self) -> Option<&EventTrace> {
        self.trace.as_ref()
    }

    // ── Scheduling ────────────────────────────────────────────

    /// Schedule `callback` at absolute time `time`.
    ///
    /// Fails with `CausalityViolation` if `time` is before the clock; the
    /// queue is left untouched in that case.
    pub fn schedule<F>(&mut self, time: SimTime, priority: Priority, callback: F) -> SimResult<EventHandle<C>>
    where
        F: Fn(&mut Simulator<C>) -> CallbackResult + 'static,
    {
        self.schedule_action(time, priority, Rc::new(callback))
    }

    /// Schedule a shared handler. Used by the calendar layer so every
    /// occurrence of a recurrence shares one callback.
    pub fn schedule_action(&mut self, time: SimTime, priority: Priority, action: Action<C>) -> SimResult<EventHandle<C>> {
        self.check_causality("schedule", time)?;
        let handle = self.queue.schedule(time, priority, action);
        trace!(id = %handle.id(), at = %time, priority, "event scheduled");
        Ok(handle)
    }

    /// Schedule `callback` at `now + offset` seconds.
    pub fn schedule_relative<F>(&mut self, offset: i64, priority: Priority, callback: F) -> SimResult<EventHandle<C>>
    where
        F: Fn(&mut Simulator<C>) -> CallbackResult + 'static,
    {
        let time = self.time.plus(offset).ok_or(SimError::TimeOverflow {
            operation: "schedule_relative",
            base: self.time,
            offset,
        })?;
        self.schedule(time, priority, callback)
    }

    /// Move an event to `time`.
    ///
    /// The old event is invalidated and will be dropped when popped; a
    /// fresh event sharing its priority and callback is queued instead.
    pub fn reschedule(&mut self, handle: &EventHandle<C>, time: SimTime) -> SimResult<EventHandle<C>> {
        self.check_causality("reschedule", time)?;
        let replacement = self.queue.reschedule(handle, time);
        trace!(old = %handle.id(), new = %replacement.id(), at = %time, "event rescheduled");
        Ok(replacement)
    }

    /// Push the horizon out to `new_end`, which must be later than the
    /// current horizon.
    pub fn extend_end_time(&mut self, new_end: SimTime) -> SimResult<()> {
        if new_end <= self.end_time {
            return Err(SimError::InvalidConfiguration(format!(
                "new end time {} must be after current end time {}",
                new_end, self.end_time
            )));
        }
        debug!(from = %self.end_time, to = %new_end, "horizon extended");
        self.end_time = new_end;
        Ok(())
    }

    /// Pull the horizon in to the current time. Events already due at
    /// this exact instant still run; nothing later does.
    pub fn stop(&mut self) {
        debug!(at = %self.time, "simulation stopped");
        self.end_time = self.time;
    }

    fn check_causality(&self, operation: &'static str, requested: SimTime) -> SimResult<()> {
        if requested < self.time {
            return Err(SimError::CausalityViolation {
                operation,
                requested,
                current: self.time,
            });
        }
        Ok(())
    }

    // ── Execution ─────────────────────────────────────────────

    /// Process exactly one event.
    ///
    /// An event beyond the horizon is left in the queue so a later
    /// `extend_end_time` + `run` can resume from it.
    pub fn step(&mut self) -> SimResult<Step<C>> {
        let beyond_horizon = match self.queue.peek_next() {
            None => return Ok(Step::Finished(RunOutcome::Completed)),
            Some(next) => next.time() > self.end_time,
        };
        if beyond_horizon {
            return Ok(Step::Finished(RunOutcome::HorizonReached));
        }
        let Some(event) = self.queue.pop_next() else {
            return Ok(Step::Finished(RunOutcome::Completed));
        };

        // The clock must never go backward.
        debug_assert!(
            event.time() >= self.time,
            "time went backward: current={}, event={}",
            self.time,
            event.time()
        );
        self.time = event.time();
        self.current_event = Some(event.clone());

        let fired = event.is_valid();
        if fired {
            self.events_processed += 1;
        } else {
            self.events_skipped += 1;
        }
        if let Some(trace) = self.trace.as_mut() {
            let disposition = if fired { Disposition::Fired } else { Disposition::Skipped };
            trace.record(&event, disposition);
        }
        trace!(id = %event.id(), at = %self.time, fired, "dispatch");

        event.0.fire(self).map_err(|source| SimError::Callback {
            event: event.id(),
            time: event.time(),
            source,
        })?;

        Ok(if fired { Step::Fired(event) } else { Step::Skipped(event) })
    }

    /// Run until the queue is empty or the next event lies beyond the
    /// horizon. A failing callback aborts the run.
    pub fn run(&mut self) -> SimResult<RunOutcome> {
        loop {
            if let Step::Finished(outcome) = self.step()? {
                debug!(
                    ?outcome,
                    now = %self.time,
                    processed = self.events_processed,
                    skipped = self.events_skipped,
                    "run finished"
                );
                return Ok(outcome);
            }
        }
    }

    /// Like `run`, but processes at most `max_steps` events.
    ///
    /// Returns `None` if the step budget ran out first.
    pub fn run_for(&mut self, max_steps: u64) -> SimResult<Option<RunOutcome>> {
        for _ in 0..max_steps {
            if let Step::Finished(outcome) = self.step()? {
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }
}
