//! Closed date ranges used for tick-store reads and top-level routing
//! (spec.md §3 "Top-level routing entry", §4.9, §4.10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An inclusive `[start, end]` range over UTC timestamps.
///
/// Mirrors the original source's `DateRange`: both bounds are inclusive,
/// which is why routing intervals in the original use `23:59:59.999` as an
/// end bound rather than midnight of the following day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    /// Construct a range, rejecting `end < start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(Error::invalid_input("date range end precedes start"));
        }
        Ok(Self { start, end })
    }

    /// Inclusive start of the range.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Inclusive end of the range.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether `ts` falls within `[start, end]`.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Whether two ranges share any instant.
    pub fn intersects(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(DateRange::new(dt(2011, 1, 1), dt(2010, 1, 1)).is_err());
    }

    #[test]
    fn non_overlapping_ranges_do_not_intersect() {
        let a = DateRange::new(dt(2010, 1, 1), dt(2010, 12, 31)).unwrap();
        let b = DateRange::new(dt(2011, 1, 1), dt(2011, 12, 31)).unwrap();
        assert!(!a.intersects(&b));
    }

    #[test]
    fn touching_ranges_intersect() {
        let a = DateRange::new(dt(2010, 1, 1), dt(2010, 6, 30)).unwrap();
        let b = DateRange::new(dt(2010, 6, 1), dt(2010, 12, 31)).unwrap();
        assert!(a.intersects(&b));
    }

    #[test]
    fn contains_respects_inclusive_bounds() {
        let r = DateRange::new(dt(2010, 1, 1), dt(2010, 12, 31)).unwrap();
        assert!(r.contains(dt(2010, 1, 1)));
        assert!(r.contains(dt(2010, 12, 31)));
        assert!(!r.contains(dt(2011, 1, 1)));
    }
}
