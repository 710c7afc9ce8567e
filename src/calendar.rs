/// Calendar expander.
///
/// Turns a recurrence rule, a timezone and a window into ordinary events
/// on a `Simulator`. Expansion happens once, at registration: every
/// occurrence is computed in local time, projected back onto the absolute
/// clock and queued. Nothing re-arms itself after firing.
///
/// Window boundary: the first occurrence may coincide with the window
/// start, and expansion stops right after scheduling the first occurrence
/// at or beyond the window end. That last occurrence is queued even when
/// it lies past the end, so a window whose end is off the rule's grid
/// gets one overrun event.
///
/// DST: occurrences whose wall-clock time falls inside a spring-forward
/// gap are skipped under every policy, so an hourly rule fires once in the
/// hour after the jump. Ambiguous occurrences (clocks falling back) are
/// resolved by the calendar's `DstPolicy`.

use std::rc::Rc;

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::debug;

use crate::config::CalendarConfig;
use crate::error::{SimError, SimResult};
use crate::event::{Action, EventHandle, Priority};
use crate::recurrence::{CronRule, Recurrence};
use crate::simulation::{CallbackResult, Simulator};
use crate::time::SimTime;
use crate::tz::{self, CalendarTime, DstPolicy};

// ── Rule spec ─────────────────────────────────────────────────────────

/// A cron expression, optionally bound to its own timezone.
///
/// `"0 8 * * 1".into()` uses the calendar's default zone;
/// `("*/30 * * * *", "Australia/Brisbane").into()` pins one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleSpec {
    pub rule: String,
    #[cfg_attr(feature = "serialize", serde(default))]
    pub timezone: Option<String>,
}

impl From<&str> for RuleSpec {
    fn from(rule: &str) -> Self {
        RuleSpec {
            rule: rule.to_string(),
            timezone: None,
        }
    }
}

impl From<(&str, &str)> for RuleSpec {
    fn from((rule, timezone): (&str, &str)) -> Self {
        RuleSpec {
            rule: rule.to_string(),
            timezone: Some(timezone.to_string()),
        }
    }
}

// ── Window ────────────────────────────────────────────────────────────

/// Expansion window. A missing start means "the simulator's current time",
/// a missing end means "the simulator's end time".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Window {
    #[cfg_attr(feature = "serialize", serde(default))]
    pub start: Option<CalendarTime>,
    #[cfg_attr(feature = "serialize", serde(default))]
    pub end: Option<CalendarTime>,
}

impl Window {
    /// From now until the simulator's horizon.
    pub fn whole() -> Self {
        Window::default()
    }

    pub fn between(start: CalendarTime, end: CalendarTime) -> Self {
        Window {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn starting(start: CalendarTime) -> Self {
        Window {
            start: Some(start),
            end: None,
        }
    }

    pub fn ending(end: CalendarTime) -> Self {
        Window {
            start: None,
            end: Some(end),
        }
    }
}

// ── Calendar ──────────────────────────────────────────────────────────

/// Wall-clock front end to a `Simulator`: a default timezone plus the
/// policy for resolving DST edge cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    timezone: Tz,
    dst_policy: DstPolicy,
}

impl Calendar {
    /// A calendar whose default zone is `timezone`.
    pub fn new(timezone: &str) -> SimResult<Self> {
        Ok(Calendar {
            timezone: tz::parse_timezone(timezone)?,
            dst_policy: DstPolicy::default(),
        })
    }

    pub fn from_config(config: &CalendarConfig) -> SimResult<Self> {
        Ok(Self::new(&config.default_timezone)?.with_dst_policy(config.dst_policy))
    }

    pub fn with_dst_policy(mut self, policy: DstPolicy) -> Self {
        self.dst_policy = policy;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn dst_policy(&self) -> DstPolicy {
        self.dst_policy
    }

    fn zone(&self, name: Option<&str>) -> SimResult<Tz> {
        match name {
            Some(name) => tz::parse_timezone(name),
            None => Ok(self.timezone),
        }
    }

    /// The absolute instant of a wall-clock reading.
    pub fn localized(&self, time: &CalendarTime) -> SimResult<SimTime> {
        let zone = self.zone(time.timezone.as_deref())?;
        tz::from_local(time.naive()?, zone, self.dst_policy)
    }

    /// An absolute instant as a zoned datetime, in `timezone` or the
    /// default zone.
    pub fn to_local(&self, time: SimTime, timezone: Option<&str>) -> SimResult<DateTime<Tz>> {
        tz::to_zoned(time, self.zone(timezone)?)
    }

    /// A simulator whose horizon is given in wall-clock time. `start` and
    /// `end` may name different zones.
    pub fn simulator<C>(&self, start: &CalendarTime, end: &CalendarTime, context: C) -> SimResult<Simulator<C>> {
        Simulator::with_context(self.localized(start)?, self.localized(end)?, context)
    }

    /// Schedule a one-shot event at a wall-clock time.
    pub fn schedule<C, F>(
        &self,
        sim: &mut Simulator<C>,
        at: &CalendarTime,
        priority: Priority,
        callback: F,
    ) -> SimResult<EventHandle<C>>
    where
        F: Fn(&mut Simulator<C>) -> CallbackResult + 'static,
    {
        let time = self.localized(at)?;
        sim.schedule(time, priority, callback)
    }

    /// Parse a cron rule and queue every occurrence inside `window`.
    ///
    /// Either all occurrences are queued or, on error, none are.
    pub fn cron_schedule<C, F>(
        &self,
        sim: &mut Simulator<C>,
        rule: impl Into<RuleSpec>,
        window: &Window,
        priority: Priority,
        callback: F,
    ) -> SimResult<Vec<EventHandle<C>>>
    where
        F: Fn(&mut Simulator<C>) -> CallbackResult + 'static,
    {
        self.cron_schedule_action(sim, &rule.into(), window, priority, Rc::new(callback))
    }

    pub(crate) fn cron_schedule_action<C>(
        &self,
        sim: &mut Simulator<C>,
        spec: &RuleSpec,
        window: &Window,
        priority: Priority,
        action: Action<C>,
    ) -> SimResult<Vec<EventHandle<C>>> {
        let rule = CronRule::parse(&spec.rule)?;
        let zone = self.zone(spec.timezone.as_deref())?;
        self.schedule_recurrence_action(sim, &rule, zone, window, priority, action)
    }

    /// Queue every occurrence of an arbitrary recurrence inside `window`,
    /// reading the recurrence in `zone`.
    pub fn schedule_recurrence<C, R, F>(
        &self,
        sim: &mut Simulator<C>,
        recurrence: &R,
        zone: Tz,
        window: &Window,
        priority: Priority,
        callback: F,
    ) -> SimResult<Vec<EventHandle<C>>>
    where
        R: Recurrence + ?Sized,
        F: Fn(&mut Simulator<C>) -> CallbackResult + 'static,
    {
        self.schedule_recurrence_action(sim, recurrence, zone, window, priority, Rc::new(callback))
    }

    fn schedule_recurrence_action<C, R>(
        &self,
        sim: &mut Simulator<C>,
        recurrence: &R,
        zone: Tz,
        window: &Window,
        priority: Priority,
        action: Action<C>,
    ) -> SimResult<Vec<EventHandle<C>>>
    where
        R: Recurrence + ?Sized,
    {
        let start = match &window.start {
            Some(start) => self.localized(start)?,
            None => sim.now(),
        };
        let end = match &window.end {
            Some(end) => self.localized(end)?,
            None => sim.end_time(),
        };

        let occurrences = self.expand(recurrence, zone, start, end)?;
        // Validate the whole batch before touching the queue.
        if let Some(first) = occurrences.first().copied() {
            if first < sim.now() {
                return Err(SimError::CausalityViolation {
                    operation: "expand recurrence",
                    requested: first,
                    current: sim.now(),
                });
            }
        }

        let mut handles = Vec::with_capacity(occurrences.len());
        for at in occurrences {
            handles.push(sim.schedule_action(at, priority, Rc::clone(&action))?);
        }
        debug!(
            count = handles.len(),
            timezone = zone.name(),
            from = %start,
            to = %end,
            "recurrence expanded"
        );
        Ok(handles)
    }

    /// Absolute instants of every occurrence of `recurrence` in
    /// `[start, end]`, plus the single overrun occurrence described in the
    /// module docs. Pure; nothing is scheduled.
    pub fn expand<R>(&self, recurrence: &R, zone: Tz, start: SimTime, end: SimTime) -> SimResult<Vec<SimTime>>
    where
        R: Recurrence + ?Sized,
    {
        if end < start {
            return Err(SimError::InvalidConfiguration(format!(
                "recurrence window ends at {} before it starts at {}",
                end, start
            )));
        }

        let mut occurrences: Vec<SimTime> = Vec::new();
        let mut cursor = recurrence.next_from(tz::to_local(start, zone)?);
        while let Some(local) = cursor {
            if tz::is_nonexistent(local, zone) {
                debug!(%local, timezone = zone.name(), "occurrence inside a DST gap skipped");
            } else {
                let at = tz::from_local(local, zone, self.dst_policy)?;
                // An ambiguous wall time at the very start can resolve to an
                // instant just before the window.
                if at >= start {
                    if occurrences.last().is_some_and(|last| at <= *last) {
                        return Err(SimError::InvalidRecurrenceRule {
                            rule: format!("{local} in {}", zone.name()),
                            reason: "occurrences do not advance in absolute time".to_string(),
                        });
                    }
                    occurrences.push(at);
                    if at >= end {
                        break;
                    }
                }
            }

            cursor = recurrence.next_after(local);
            if let Some(next) = cursor {
                if next <= local {
                    return Err(SimError::InvalidRecurrenceRule {
                        rule: format!("{local} in {}", zone.name()),
                        reason: format!("next occurrence {next} does not advance"),
                    });
                }
            }
        }
        Ok(occurrences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, NaiveDateTime, Timelike};

    type Log = Vec<(i64, &'static str)>;

    fn utc() -> Calendar {
        Calendar::new("UTC").unwrap()
    }

    fn record(label: &'static str) -> impl Fn(&mut Simulator<Log>) -> CallbackResult {
        move |sim: &mut Simulator<Log>| {
            let now = sim.now().seconds();
            sim.context_mut().push((now, label));
            Ok(())
        }
    }

    #[test]
    fn test_half_hourly_over_one_hour() {
        let cal = utc();
        let day = CalendarTime::date(2017, 1, 1);
        let mut sim = cal
            .simulator(&day, &CalendarTime::date(2017, 1, 2), Log::new())
            .unwrap();
        let base = sim.now().seconds();

        let handles = cal
            .cron_schedule(
                &mut sim,
                "*/30 * * * *",
                &Window::between(day.clone(), CalendarTime::new(2017, 1, 1, 1, 0, 0)),
                1,
                record("tick"),
            )
            .unwrap();
        assert_eq!(handles.len(), 3);

        sim.run().unwrap();
        let times: Vec<i64> = sim.context().iter().map(|(t, _)| t - base).collect();
        assert_eq!(times, vec![0, 1800, 3600]);
    }

    #[test]
    fn test_off_grid_end_schedules_one_overrun() {
        let cal = utc();
        let start = SimTime::new(0);
        let end = SimTime::new(3599);
        let rule = CronRule::parse("*/30 * * * *").unwrap();
        let times = cal.expand(&rule, Tz::UTC, start, end).unwrap();
        let seconds: Vec<i64> = times.iter().map(|t| t.seconds()).collect();
        assert_eq!(seconds, vec![0, 1800, 3600]);
    }

    #[test]
    fn test_start_off_grid_begins_at_next_occurrence() {
        let cal = utc();
        let rule = CronRule::parse("0 * * * *").unwrap();
        let times = cal.expand(&rule, Tz::UTC, SimTime::new(60), SimTime::new(7200)).unwrap();
        let seconds: Vec<i64> = times.iter().map(|t| t.seconds()).collect();
        assert_eq!(seconds, vec![3600, 7200]);
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let cal = utc();
        let mut sim: Simulator<Log> = Simulator::new(SimTime::new(0), SimTime::new(100_000)).unwrap();
        let err = cal
            .cron_schedule(
                &mut sim,
                "* * * * *",
                &Window::between(
                    CalendarTime::new(1970, 1, 1, 1, 0, 0),
                    CalendarTime::new(1970, 1, 1, 0, 0, 0),
                ),
                0,
                record("x"),
            )
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidConfiguration(_)));
        assert_eq!(sim.pending_count(), 0);
    }

    #[test]
    fn test_bad_rule_and_zone_leave_queue_untouched() {
        let cal = utc();
        let mut sim: Simulator<Log> = Simulator::new(SimTime::new(0), SimTime::new(100_000)).unwrap();

        let err = cal
            .cron_schedule(&mut sim, "every tuesday", &Window::whole(), 0, record("x"))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidRecurrenceRule { .. }));

        let err = cal
            .cron_schedule(&mut sim, ("0 * * * *", "Nowhere/Special"), &Window::whole(), 0, record("x"))
            .unwrap_err();
        assert!(matches!(err, SimError::UnknownTimezone(_)));
        assert_eq!(sim.pending_count(), 0);
    }

    #[test]
    fn test_window_in_the_past_is_atomic() {
        let cal = utc();
        let mut sim: Simulator<Log> = Simulator::new(SimTime::new(7200), SimTime::new(100_000)).unwrap();
        let err = cal
            .cron_schedule(
                &mut sim,
                "*/30 * * * *",
                &Window::between(CalendarTime::date(1970, 1, 1), CalendarTime::new(1970, 1, 1, 4, 0, 0)),
                0,
                record("x"),
            )
            .unwrap_err();
        assert!(matches!(err, SimError::CausalityViolation { .. }));
        assert_eq!(sim.pending_count(), 0);
    }

    #[test]
    fn test_default_window_runs_from_now_to_horizon() {
        let cal = utc();
        let mut sim: Simulator<Log> = Simulator::new(SimTime::new(0), SimTime::new(3 * 3600)).unwrap();
        let handles = cal
            .cron_schedule(&mut sim, "0 * * * *", &Window::whole(), 0, record("hourly"))
            .unwrap();
        let times: Vec<i64> = handles.iter().map(|h| h.time().seconds()).collect();
        assert_eq!(times, vec![0, 3600, 7200, 10_800]);
    }

    #[test]
    fn test_rule_timezone_overrides_default() {
        // Default zone is UTC but the rule is read in Brisbane (UTC+10).
        let cal = utc();
        let mut sim: Simulator<Log> = Simulator::new(SimTime::new(0), SimTime::new(86_400)).unwrap();
        let handles = cal
            .cron_schedule(&mut sim, ("0 20 * * *", "Australia/Brisbane"), &Window::whole(), 0, record("x"))
            .unwrap();
        // 20:00 Brisbane on 1970-01-01 is 10:00Z.
        assert_eq!(handles[0].time().seconds(), 10 * 3600);
        let local = cal.to_local(handles[0].time(), Some("Australia/Brisbane")).unwrap();
        assert_eq!(local.hour(), 20);
    }

    #[test]
    fn test_occurrences_share_one_callback_and_priority() {
        let cal = utc();
        let mut sim: Simulator<Log> = Simulator::new(SimTime::new(0), SimTime::new(7200)).unwrap();
        cal.cron_schedule(&mut sim, "0 * * * *", &Window::whole(), 2, record("log"))
            .unwrap();
        cal.cron_schedule(&mut sim, "0 * * * *", &Window::whole(), 1, record("order"))
            .unwrap();
        sim.run().unwrap();
        let labels: Vec<&str> = sim.context().iter().map(|(_, l)| *l).collect();
        assert_eq!(labels, vec!["order", "log", "order", "log", "order", "log"]);
    }

    #[test]
    fn test_daily_rule_across_dst_change() {
        // Sydney leaves DST on 2017-04-02; 20:00 local shifts from 09:00Z to 10:00Z.
        let cal = Calendar::new("Australia/Sydney").unwrap();
        let rule = CronRule::parse("0 20 * * *").unwrap();
        let start = cal.localized(&CalendarTime::date(2017, 4, 1)).unwrap();
        let end = cal.localized(&CalendarTime::date(2017, 4, 3)).unwrap();
        let times = cal.expand(&rule, cal.timezone(), start, end).unwrap();

        let utc_hours: Vec<u32> = times
            .iter()
            .map(|t| t.to_utc().unwrap().hour())
            .collect();
        assert_eq!(utc_hours, vec![9, 10, 10]);
        for t in &times {
            assert_eq!(cal.to_local(*t, None).unwrap().hour(), 20);
        }
    }

    #[test]
    fn test_ambiguous_occurrence_follows_policy() {
        // 02:30 happens twice in Sydney on 2017-04-02.
        let rule = CronRule::parse("30 2 2 4 *").unwrap();
        let start = SimTime::new(1_491_000_000); // 2017-03-31
        let end = SimTime::new(1_491_200_000);

        let standard = Calendar::new("Australia/Sydney").unwrap();
        let times = standard.expand(&rule, standard.timezone(), start, end).unwrap();
        // 02:30 AEST == 16:30Z on 2017-04-01.
        assert_eq!(times[0].to_utc().unwrap().hour(), 16);

        let strict = standard.with_dst_policy(DstPolicy::Strict);
        assert!(matches!(
            strict.expand(&rule, strict.timezone(), start, end),
            Err(SimError::AmbiguousLocalTime { .. })
        ));
    }

    #[test]
    fn test_stalled_recurrence_is_rejected() {
        let cal = utc();
        let stuck = |t: NaiveDateTime| Some(t);
        let err = cal
            .expand(&stuck, Tz::UTC, SimTime::new(0), SimTime::new(10))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidRecurrenceRule { .. }));
    }

    #[test]
    fn test_custom_recurrence() {
        let cal = utc();
        let mut sim: Simulator<Log> = Simulator::new(SimTime::new(0), SimTime::new(1000)).unwrap();
        let every_400s = |t: NaiveDateTime| t.checked_add_signed(Duration::seconds(400));
        let handles = cal
            .schedule_recurrence(&mut sim, &every_400s, Tz::UTC, &Window::whole(), 0, record("x"))
            .unwrap();
        let times: Vec<i64> = handles.iter().map(|h| h.time().seconds()).collect();
        // A closure recurrence is anchored at the window start.
        assert_eq!(times, vec![0, 400, 800, 1200]);
    }

    fn sydney_spring_forward(rule: &str, from_hour: u32, to_hour: u32) -> Vec<i64> {
        // Sydney jumps from 02:00 AEST to 03:00 AEDT on 2017-10-01.
        let cal = Calendar::new("Australia/Sydney").unwrap();
        let start = cal.localized(&CalendarTime::new(2017, 10, 1, from_hour, 0, 0)).unwrap();
        let end = cal.localized(&CalendarTime::new(2017, 10, 1, to_hour, 0, 0)).unwrap();
        let rule = CronRule::parse(rule).unwrap();
        cal.expand(&rule, cal.timezone(), start, end)
            .unwrap()
            .iter()
            .map(|t| t.seconds())
            .collect()
    }

    #[test]
    fn test_half_hourly_rule_skips_spring_forward_gap() {
        let times = sydney_spring_forward("*/30 * * * *", 1, 5);
        assert_eq!(
            times,
            vec![
                1_506_783_600, // 01:00 AEST
                1_506_785_400, // 01:30 AEST
                1_506_787_200, // 03:00 AEDT
                1_506_789_000,
                1_506_790_800,
                1_506_792_600,
                1_506_794_400, // 05:00 AEDT
            ]
        );
    }

    #[test]
    fn test_hourly_rule_fires_once_after_spring_forward() {
        let times = sydney_spring_forward("0 * * * *", 0, 5);
        assert_eq!(
            times,
            vec![1_506_780_000, 1_506_783_600, 1_506_787_200, 1_506_790_800, 1_506_794_400]
        );

        let cal = Calendar::new("Australia/Sydney").unwrap();
        let mut sim = cal
            .simulator(
                &CalendarTime::date(2017, 10, 1),
                &CalendarTime::new(2017, 10, 1, 5, 0, 0),
                Log::new(),
            )
            .unwrap();
        cal.cron_schedule(&mut sim, "0 * * * *", &Window::whole(), 0, record("hourly"))
            .unwrap();
        sim.run().unwrap();
        let fired: Vec<i64> = sim.context().iter().map(|(t, _)| *t).collect();
        assert_eq!(fired, times);
    }

    #[test]
    fn test_gap_occurrence_is_skipped_even_when_strict() {
        let strict = Calendar::new("Australia/Sydney")
            .unwrap()
            .with_dst_policy(DstPolicy::Strict);
        let rule = CronRule::parse("30 2 * * *").unwrap();
        let start = strict.localized(&CalendarTime::date(2017, 9, 30)).unwrap();
        let end = strict.localized(&CalendarTime::date(2017, 10, 3)).unwrap();
        let days: Vec<u32> = strict
            .expand(&rule, strict.timezone(), start, end)
            .unwrap()
            .iter()
            .map(|t| strict.to_local(*t, None).unwrap().day())
            .collect();
        // 02:30 on 2017-10-01 never happens in Sydney.
        assert_eq!(days, vec![30, 2, 3]);
    }

    #[test]
    fn test_local_schedule_and_simulator_in_mixed_zones() {
        let cal = Calendar::new("Australia/Brisbane").unwrap();
        let mut sim = cal
            .simulator(
                &CalendarTime::date(2016, 12, 1).in_zone("Australia/Sydney"),
                &CalendarTime::new(2017, 5, 31, 23, 59, 59).in_zone("America/New_York"),
                Log::new(),
            )
            .unwrap();
        // Sydney is UTC+11 in December.
        assert_eq!(sim.now().to_utc().unwrap().hour(), 13);

        let handle = cal
            .schedule(&mut sim, &CalendarTime::new(2017, 1, 1, 8, 0, 0), 1, record("x"))
            .unwrap();
        assert_eq!(cal.to_local(handle.time(), None).unwrap().hour(), 8);
    }
}
