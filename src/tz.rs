/// Timezone and wall-clock conversion.
///
/// Pure functions that move between the simulator's absolute clock and a
/// timezone-local calendar. Local → absolute is where daylight-saving
/// transitions bite: a wall-clock time can map to two instants (clocks
/// fall back) or to none (clocks spring forward). `DstPolicy` makes the
/// choice deterministic.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone};
use chrono_tz::{OffsetComponents, Tz};
use tracing::warn;

use crate::error::{SimError, SimResult};
use crate::time::SimTime;

// ── DST policy ────────────────────────────────────────────────────────

/// How to resolve wall-clock times that do not map to exactly one instant.
///
/// In every non-strict mode, a nonexistent time is read with the UTC
/// offset in force before the transition, which lands it just after the
/// gap (02:30 on a spring-forward night becomes 03:30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum DstPolicy {
    /// Ambiguous times take the standard-time mapping.
    #[default]
    PreferStandard,
    /// Ambiguous times take the earlier instant.
    Earliest,
    /// Ambiguous times take the later instant.
    Latest,
    /// Ambiguous and nonexistent times are errors.
    Strict,
}

// ── Calendar time ─────────────────────────────────────────────────────

/// A wall-clock reading, optionally pinned to a timezone.
///
/// Without a timezone it is interpreted in the calendar's default zone.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CalendarTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    #[cfg_attr(feature = "serialize", serde(default))]
    pub timezone: Option<String>,
}

impl CalendarTime {
    pub fn new(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        CalendarTime {
            year,
            month,
            day,
            hour,
            minute,
            second,
            timezone: None,
        }
    }

    /// Midnight on the given date.
    pub fn date(year: i32, month: u32, day: u32) -> Self {
        Self::new(year, month, day, 0, 0, 0)
    }

    /// Pin this reading to a named timezone.
    pub fn in_zone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// The wall-clock reading as a naive datetime.
    pub fn naive(&self) -> SimResult<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|d| d.and_hms_opt(self.hour, self.minute, self.second))
            .ok_or_else(|| {
                SimError::InvalidConfiguration(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02} is not a valid calendar time",
                    self.year, self.month, self.day, self.hour, self.minute, self.second
                ))
            })
    }
}

// ── Conversions ───────────────────────────────────────────────────────

/// Look up an IANA timezone name such as `"Australia/Brisbane"`.
pub fn parse_timezone(name: &str) -> SimResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| SimError::UnknownTimezone(name.to_string()))
}

/// Project an absolute instant into `tz`.
pub fn to_zoned(time: SimTime, tz: Tz) -> SimResult<DateTime<Tz>> {
    let utc = time.to_utc().ok_or(SimError::OutOfRange(time))?;
    Ok(utc.with_timezone(&tz))
}

/// The wall-clock reading in `tz` at an absolute instant.
pub fn to_local(time: SimTime, tz: Tz) -> SimResult<NaiveDateTime> {
    Ok(to_zoned(time, tz)?.naive_local())
}

/// The absolute instant of a wall-clock reading in `tz`.
pub fn from_local(local: NaiveDateTime, tz: Tz, policy: DstPolicy) -> SimResult<SimTime> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(SimTime::new(dt.timestamp())),
        LocalResult::Ambiguous(earliest, latest) => {
            let chosen = match policy {
                DstPolicy::Strict => {
                    return Err(SimError::AmbiguousLocalTime {
                        local,
                        timezone: tz.name().to_string(),
                    })
                }
                DstPolicy::Earliest => earliest,
                DstPolicy::Latest => latest,
                DstPolicy::PreferStandard => {
                    if is_standard(&earliest) && !is_standard(&latest) {
                        earliest
                    } else {
                        latest
                    }
                }
            };
            warn!(%local, timezone = tz.name(), ?policy, resolved = %chosen, "ambiguous local time");
            Ok(SimTime::new(chosen.timestamp()))
        }
        LocalResult::None => {
            if policy == DstPolicy::Strict {
                return Err(SimError::NonexistentLocalTime {
                    local,
                    timezone: tz.name().to_string(),
                });
            }
            let resolved = resolve_gap(local, tz)?;
            warn!(%local, timezone = tz.name(), resolved = %resolved, "nonexistent local time");
            Ok(resolved)
        }
    }
}

/// `true` when `local` never shows on the wall clock in `tz` because the
/// clocks sprang forward over it.
pub fn is_nonexistent(local: NaiveDateTime, tz: Tz) -> bool {
    matches!(tz.from_local_datetime(&local), LocalResult::None)
}

fn is_standard(dt: &DateTime<Tz>) -> bool {
    dt.offset().dst_offset() == Duration::zero()
}

/// Read `local` with the offset in force a day earlier, i.e. before the
/// transition that opened the gap.
fn resolve_gap(local: NaiveDateTime, tz: Tz) -> SimResult<SimTime> {
    let out_of_range = || SimError::InvalidConfiguration(format!("local time {local} is out of range"));
    let probe = local.checked_sub_signed(Duration::days(1)).ok_or_else(out_of_range)?;
    let before = tz.offset_from_utc_datetime(&probe).fix();
    let seconds = local.and_utc().timestamp() - i64::from(before.local_minus_utc());
    Ok(SimTime::new(seconds))
}
