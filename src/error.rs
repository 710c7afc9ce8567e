//! Structured error types for cronsim.
//!
//! All fallible public APIs return `SimResult<T>`. Every variant carries
//! enough context (operation, timestamp, rule, zone) to identify the
//! offending call. Failed calls never leave a partial mutation behind.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::event::EventId;
use crate::simulation::CallbackError;
use crate::time::SimTime;

/// The top-level error type for the simulation kernel.
#[derive(Debug, Error)]
pub enum SimError {
    // ── Configuration ─────────────────────────────────────

    /// Malformed construction parameters: empty horizon, inverted window,
    /// impossible calendar date.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ── Scheduling ────────────────────────────────────────

    /// Attempted to place an event before the current clock.
    #[error("cannot {operation} event at {requested} when current time is {current}")]
    CausalityViolation {
        operation: &'static str,
        requested: SimTime,
        current: SimTime,
    },

    /// Relative scheduling overflowed the clock.
    #[error("{operation}: {base} + {offset}s overflows the clock")]
    TimeOverflow {
        operation: &'static str,
        base: SimTime,
        offset: i64,
    },

    // ── Calendar ──────────────────────────────────────────

    #[error("invalid recurrence rule {rule:?}: {reason}")]
    InvalidRecurrenceRule { rule: String, reason: String },

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),

    /// A local time maps to two instants (clocks fall back). Only raised
    /// under `DstPolicy::Strict`.
    #[error("local time {local} is ambiguous in {timezone}")]
    AmbiguousLocalTime {
        local: NaiveDateTime,
        timezone: String,
    },

    /// A local time falls into a DST gap. Only raised under
    /// `DstPolicy::Strict`.
    #[error("local time {local} does not exist in {timezone}")]
    NonexistentLocalTime {
        local: NaiveDateTime,
        timezone: String,
    },

    /// An instant cannot be projected onto a calendar.
    #[error("{0} is outside the supported calendar range")]
    OutOfRange(SimTime),

    // ── Execution ─────────────────────────────────────────

    /// A callback failed; the run was aborted at its event.
    #[error("callback for {event} at {time} failed: {source}")]
    Callback {
        event: EventId,
        time: SimTime,
        #[source]
        source: CallbackError,
    },
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::error::Error as _;

    #[test]
    fn test_display_causality() {
        let e = SimError::CausalityViolation {
            operation: "schedule",
            requested: SimTime::new(3),
            current: SimTime::new(10),
        };
        let s = e.to_string();
        assert!(s.contains("schedule"));
        assert!(s.contains("T=3"));
        assert!(s.contains("T=10"));
    }

    #[test]
    fn test_display_rule() {
        let e = SimError::InvalidRecurrenceRule {
            rule: "61 * * * *".into(),
            reason: "minute out of range".into(),
        };
        assert!(e.to_string().contains("\"61 * * * *\""));
    }

    #[test]
    fn test_display_ambiguous() {
        let local = NaiveDate::from_ymd_opt(2017, 4, 2)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let e = SimError::AmbiguousLocalTime {
            local,
            timezone: "Australia/Sydney".into(),
        };
        assert_eq!(
            e.to_string(),
            "local time 2017-04-02 02:30:00 is ambiguous in Australia/Sydney"
        );
    }

    #[test]
    fn test_callback_source_is_preserved() {
        let e = SimError::Callback {
            event: EventId::new(7),
            time: SimTime::new(5),
            source: "stock went negative".into(),
        };
        assert!(e.to_string().contains("E#7"));
        assert_eq!(e.source().map(|s| s.to_string()), Some("stock went negative".into()));
    }

    #[test]
    fn test_error_is_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(SimError::UnknownTimezone("Mars/Olympus".into()));
        assert_eq!(e.to_string(), "unknown timezone \"Mars/Olympus\"");
    }
}
