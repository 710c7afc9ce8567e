//! # cronsim — Discrete-Event Simulation with Calendar Scheduling
//!
//! A deterministic simulation kernel: a time-ordered event queue with
//! stable tie-breaking, in-place invalidation and rescheduling, plus a
//! calendar layer that expands cron rules (read in any IANA timezone)
//! into concrete events on the simulation clock. No async, no threads, no
//! wall-clock time. The clock only moves when an event fires.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────┐
//! │   Calendar / dsl           │ ← wall-clock front end, cron expansion
//! │  ┌─────────────────────┐  │
//! │  │   Simulator          │  │ ← run loop, clock, horizon, context
//! │  │  ┌───────────────┐  │  │
//! │  │  │  EventQueue    │  │  │ ← min-heap on (time, priority, id)
//! │  │  └───────────────┘  │  │
//! │  │  ┌───────────────┐  │  │
//! │  │  │  Event         │  │  │ ← time, priority, callback, validity
//! │  │  └───────────────┘  │  │
//! │  │  ┌───────────────┐  │  │
//! │  │  │  SimTime       │  │  │ ← seconds since the Unix epoch
//! │  │  └───────────────┘  │  │
//! │  └─────────────────────┘  │
//! └───────────────────────────┘
//! ```

pub mod calendar;
pub mod config;
pub mod dsl;
pub mod error;
pub mod event;
pub mod recurrence;
pub mod scheduler;
pub mod simulation;
pub mod time;
pub mod trace;
pub mod tz;

// Re-exports for convenience.
pub use calendar::{Calendar, RuleSpec, Window};
pub use config::{CalendarConfig, SimulationConfig};
pub use dsl::SimulationBuilder;
pub use error::{SimError, SimResult};
pub use event::{Event, EventHandle, EventId, Priority};
pub use recurrence::{CronRule, Recurrence};
pub use scheduler::EventQueue;
pub use simulation::{CallbackError, CallbackResult, EventHandler, RunOutcome, Simulator, Step};
pub use time::SimTime;
pub use trace::{Disposition, EventTrace, TraceEntry};
pub use tz::{CalendarTime, DstPolicy};
