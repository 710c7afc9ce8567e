/// Simulation time.
///
/// A `SimTime` is an absolute instant counted in whole seconds since the
/// Unix epoch. Time advances only when the simulator dispatches events,
/// never from wall-clock observation. The calendar layer projects these
/// instants onto local wall clocks; the core only compares them.

use chrono::{DateTime, Utc};

/// An absolute instant on the simulation clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(i64);

impl SimTime {
    /// 1970-01-01T00:00:00Z.
    pub const EPOCH: SimTime = SimTime(0);

    /// Create a `SimTime` from seconds since the Unix epoch.
    #[inline]
    pub fn new(seconds: i64) -> Self {
        SimTime(seconds)
    }

    /// Return the raw second count.
    #[inline]
    pub fn seconds(self) -> i64 {
        self.0
    }

    /// The instant `offset` seconds after `self` (negative offsets go back).
    /// Returns `None` on overflow.
    #[inline]
    pub fn plus(self, offset: i64) -> Option<SimTime> {
        self.0.checked_add(offset).map(SimTime)
    }

    /// Build from a UTC datetime, truncating sub-second precision.
    pub fn from_utc(datetime: DateTime<Utc>) -> Self {
        SimTime(datetime.timestamp())
    }

    /// Project onto a UTC datetime. `None` when outside chrono's range.
    pub fn to_utc(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }
}

impl From<i64> for SimTime {
    fn from(seconds: i64) -> Self {
        SimTime(seconds)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_epoch() {
        assert_eq!(SimTime::EPOCH.seconds(), 0);
    }

    #[test]
    fn test_ordering() {
        let t1 = SimTime::new(10);
        let t2 = SimTime::new(20);
        assert!(t1 < t2);
        assert!(t2 > t1);
    }

    #[test]
    fn test_plus() {
        let t = SimTime::new(100);
        assert_eq!(t.plus(50), Some(SimTime::new(150)));
        assert_eq!(t.plus(-100), Some(SimTime::EPOCH));
    }

    #[test]
    fn test_plus_overflow() {
        assert!(SimTime::new(i64::MAX).plus(1).is_none());
    }

    #[test]
    fn test_utc_conversion() {
        let dt = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
        let t = SimTime::from_utc(dt);
        assert_eq!(t.seconds(), 1_483_228_800);
        assert_eq!(t.to_utc(), Some(dt));
    }

    #[test]
    fn test_out_of_range() {
        assert!(SimTime::new(i64::MAX).to_utc().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", SimTime::new(42)), "T=42");
    }
}
