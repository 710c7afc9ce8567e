/// Dispatch trace.
///
/// Records every event the run loop pops into an append-only list and
/// folds it into a deterministic hash, so two runs can be compared
/// without keeping the application's own output around.

use std::io::{self, Write};

use crate::event::{EventHandle, EventId, Priority};
use crate::time::SimTime;

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

// ── Trace entry ───────────────────────────────────────────────────────

/// What the run loop did with a popped event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Disposition {
    Fired,
    Skipped,
}

impl Disposition {
    fn tag(self) -> char {
        match self {
            Disposition::Fired => 'F',
            Disposition::Skipped => 'S',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceEntry {
    pub id: EventId,
    pub time: SimTime,
    pub priority: Priority,
    pub disposition: Disposition,
}

// ── Event trace ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EventTrace {
    entries: Vec<TraceEntry>,
}

impl EventTrace {
    pub fn new() -> Self {
        EventTrace { entries: Vec::new() }
    }

    /// Record a popped event.
    pub fn record<C>(&mut self, event: &EventHandle<C>, disposition: Disposition) {
        self.entries.push(TraceEntry {
            id: event.id(),
            time: event.time(),
            priority: event.priority(),
            disposition,
        });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Entries whose callback actually ran.
    pub fn fired(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries
            .iter()
            .filter(|e| e.disposition == Disposition::Fired)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deterministic hash over `(id, time, priority, disposition)` of
    /// every entry, in order.
    pub fn trace_hash(&self) -> u64 {
        let mut h: u64 = 0;
        for entry in &self.entries {
            h = hash_combine(h, entry.id.raw());
            h = hash_combine(h, entry.time.seconds() as u64);
            h = hash_combine(h, entry.priority as u64);
            h = hash_combine(h, entry.disposition.tag() as u64);
        }
        h
    }

    /// Write the trace in a line-oriented text format:
    /// `<F|S> <id> <time> <priority>`.
    pub fn export<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "# CRONSIM EVENT TRACE v1")?;
        writeln!(w, "# entries: {}", self.entries.len())?;
        for entry in &self.entries {
            writeln!(
                w,
                "{} {} {} {}",
                entry.disposition.tag(),
                entry.id.raw(),
                entry.time.seconds(),
                entry.priority
            )?;
        }
        Ok(())
    }
}
