//! Explicit configuration structures.
//!
//! Everything a simulation needs to know up front lives here as plain
//! data. With the `serialize` feature these (de)serialize with serde, so a
//! scenario can be loaded from whatever format the application prefers.

use crate::calendar::Calendar;
use crate::error::SimResult;
use crate::simulation::Simulator;
use crate::tz::{CalendarTime, DstPolicy};

/// Timezone defaults for the calendar layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct CalendarConfig {
    /// IANA zone used when a time or rule does not name one.
    pub default_timezone: String,
    pub dst_policy: DstPolicy,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        CalendarConfig {
            default_timezone: "UTC".to_string(),
            dst_policy: DstPolicy::default(),
        }
    }
}

/// Wall-clock horizon plus calendar defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationConfig {
    pub start: CalendarTime,
    pub end: CalendarTime,
    #[cfg_attr(feature = "serialize", serde(default))]
    pub calendar: CalendarConfig,
}

impl SimulationConfig {
    pub fn new(start: CalendarTime, end: CalendarTime) -> Self {
        SimulationConfig {
            start,
            end,
            calendar: CalendarConfig::default(),
        }
    }

    /// Validate the configuration and build the simulator and its calendar.
    pub fn build<C>(&self, context: C) -> SimResult<(Simulator<C>, Calendar)> {
        let calendar = Calendar::from_config(&self.calendar)?;
        let sim = calendar.simulator(&self.start, &self.end, context)?;
        Ok((sim, calendar))
    }
}
