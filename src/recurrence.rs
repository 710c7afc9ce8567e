/// Recurrence iterators.
///
/// The calendar layer only needs one question answered: "what is the next
/// local wall-clock occurrence after T?". `Recurrence` is that seam.
/// `CronRule` answers it for cron expressions by delegating to `croner`;
/// a plain closure answers it for anything else.

use chrono::{NaiveDateTime, TimeZone, Utc};
use croner::Cron;

use crate::error::{SimError, SimResult};

/// A repeating pattern of local wall-clock times.
pub trait Recurrence {
    /// The first occurrence strictly after `after`.
    fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime>;

    /// The first occurrence at or after `from`.
    fn next_from(&self, from: NaiveDateTime) -> Option<NaiveDateTime>;
}

/// A step function `previous -> next`. The pattern is anchored at the
/// window start, which is its first occurrence.
impl<F> Recurrence for F
where
    F: Fn(NaiveDateTime) -> Option<NaiveDateTime>,
{
    fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        (self)(after)
    }

    fn next_from(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        Some(from)
    }
}

// ── Cron rule ─────────────────────────────────────────────────────────

/// A parsed cron expression.
///
/// Accepts the classic five fields (`minute hour day-of-month month
/// day-of-week`) or six with a leading seconds field. Day-of-week uses
/// 0–6 from Sunday (7 is also Sunday) and three-letter names.
#[derive(Debug, Clone)]
pub struct CronRule {
    source: String,
    cron: Cron,
}

impl CronRule {
    pub fn parse(expression: &str) -> SimResult<Self> {
        let cron = Cron::new(expression)
            .with_seconds_optional()
            .parse()
            .map_err(|e| SimError::InvalidRecurrenceRule {
                rule: expression.to_string(),
                reason: e.to_string(),
            })?;
        Ok(CronRule {
            source: expression.to_string(),
            cron,
        })
    }

    /// The expression this rule was parsed from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    // Wall-clock arithmetic runs on a UTC-tagged clock so croner never
    // applies DST of its own; the calendar layer resolves that afterwards.
    fn find(&self, from: NaiveDateTime, inclusive: bool) -> Option<NaiveDateTime> {
        let probe = Utc.from_utc_datetime(&from);
        self.cron
            .find_next_occurrence(&probe, inclusive)
            .ok()
            .map(|dt| dt.naive_utc())
    }
}

impl Recurrence for CronRule {
    fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        self.find(after, false)
    }

    fn next_from(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        self.find(from, true)
    }
}

impl std::fmt::Display for CronRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
