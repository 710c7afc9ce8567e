/// Fluent builder DSL for simulation setup.
///
/// Collects the horizon, calendar defaults, application context, one-shot
/// events and cron registrations, then validates and materializes them in
/// one go. Nothing is scheduled until `build`, and `build` fails on the
/// first bad entry without handing back a half-populated simulator.

use std::rc::Rc;

use crate::calendar::{Calendar, RuleSpec, Window};
use crate::config::SimulationConfig;
use crate::error::SimResult;
use crate::event::{Action, Priority};
use crate::simulation::{CallbackResult, Simulator};
use crate::tz::{CalendarTime, DstPolicy};

enum Registration<C> {
    At {
        time: CalendarTime,
        priority: Priority,
        action: Action<C>,
    },
    Cron {
        rule: RuleSpec,
        window: Window,
        priority: Priority,
        action: Action<C>,
    },
}

// ── SimulationBuilder ─────────────────────────────────────────────────

/// Fluent builder for a `Simulator` + `Calendar` pair.
///
/// # Example
/// ```rust
/// use cronsim::dsl::SimulationBuilder;
/// use cronsim::{CalendarTime, Simulator};
///
/// let (mut sim, _calendar) = SimulationBuilder::new(Vec::<i64>::new())
///     .timezone("Australia/Brisbane")
///     .starting(CalendarTime::date(2017, 1, 1))
///     .ending(CalendarTime::date(2017, 1, 2))
///     .cron("0 */6 * * *", 1, |sim: &mut Simulator<Vec<i64>>| {
///         let now = sim.now().seconds();
///         sim.context_mut().push(now);
///         Ok(())
///     })
///     .build()
///     .unwrap();
///
/// sim.run().unwrap();
/// assert_eq!(sim.context().len(), 5);
/// ```
pub struct SimulationBuilder<C> {
    config: SimulationConfig,
    context: C,
    registrations: Vec<Registration<C>>,
}

impl<C> SimulationBuilder<C> {
    /// Start a builder around an application context. The horizon
    /// defaults to the first day of 1970, UTC.
    pub fn new(context: C) -> Self {
        SimulationBuilder {
            config: SimulationConfig::new(CalendarTime::date(1970, 1, 1), CalendarTime::date(1970, 1, 2)),
            context,
            registrations: Vec::new(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: SimulationConfig, context: C) -> Self {
        SimulationBuilder {
            config,
            context,
            registrations: Vec::new(),
        }
    }

    // ── Calendar ──────────────────────────────────────────────

    /// Default timezone for times and rules that do not name one.
    pub fn timezone(mut self, name: &str) -> Self {
        self.config.calendar.default_timezone = name.to_string();
        self
    }

    pub fn dst_policy(mut self, policy: DstPolicy) -> Self {
        self.config.calendar.dst_policy = policy;
        self
    }

    // ── Horizon ───────────────────────────────────────────────

    pub fn starting(mut self, start: CalendarTime) -> Self {
        self.config.start = start;
        self
    }

    pub fn ending(mut self, end: CalendarTime) -> Self {
        self.config.end = end;
        self
    }

    // ── Events ────────────────────────────────────────────────

    /// Schedule a one-shot event at a wall-clock time.
    pub fn at<F>(mut self, time: CalendarTime, priority: Priority, callback: F) -> Self
    where
        F: Fn(&mut Simulator<C>) -> CallbackResult + 'static,
    {
        self.registrations.push(Registration::At {
            time,
            priority,
            action: Rc::new(callback),
        });
        self
    }

    /// Register a cron rule over the whole horizon.
    pub fn cron<F>(self, rule: impl Into<RuleSpec>, priority: Priority, callback: F) -> Self
    where
        F: Fn(&mut Simulator<C>) -> CallbackResult + 'static,
    {
        self.cron_within(rule, Window::whole(), priority, callback)
    }

    /// Register a cron rule over an explicit window.
    pub fn cron_within<F>(mut self, rule: impl Into<RuleSpec>, window: Window, priority: Priority, callback: F) -> Self
    where
        F: Fn(&mut Simulator<C>) -> CallbackResult + 'static,
    {
        self.registrations.push(Registration::Cron {
            rule: rule.into(),
            window,
            priority,
            action: Rc::new(callback),
        });
        self
    }

    // ── Build ─────────────────────────────────────────────────

    /// Validate everything and produce the simulator with all
    /// registrations queued, in registration order.
    pub fn build(self) -> SimResult<(Simulator<C>, Calendar)> {
        let (mut sim, calendar) = self.config.build(self.context)?;
        for registration in self.registrations {
            match registration {
                Registration::At { time, priority, action } => {
                    let at = calendar.localized(&time)?;
                    sim.schedule_action(at, priority, action)?;
                }
                Registration::Cron {
                    rule,
                    window,
                    priority,
                    action,
                } => {
                    calendar.cron_schedule_action(&mut sim, &rule, &window, priority, action)?;
                }
            }
        }
        Ok((sim, calendar))
    }
}
