//! Wall-clock source.
//!
//! Reply and reminder texts render local time-of-day, and the broadcast
//! scheduler keys its once-per-minute guard on local minutes, so everything
//! works in `NaiveDateTime` taken from the local zone.

use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};
use parking_lot::Mutex;

/// Source of the current local wall-clock time.
pub trait Clock: Send + Sync {
    /// Current local date and time.
    fn now(&self) -> NaiveDateTime;
}

/// The process clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    /// Start at the given instant.
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at `hour:minute:second` on 2026-01-01.
    ///
    /// Returns `None` for an out-of-range time.
    pub fn at(hour: u32, minute: u32, second: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1)?.and_hms_opt(hour, minute, second)?;
        Some(Self::new(start))
    }

    /// Move forward (or backward, for a negative delta).
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn manual_clock_starts_where_told() {
        let clock = ManualClock::at(14, 2, 0).unwrap();
        let now = clock.now();
        assert_eq!((now.hour(), now.minute(), now.second()), (14, 2, 0));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at(14, 2, 0).unwrap();
        clock.advance(TimeDelta::seconds(90));
        let now = clock.now();
        assert_eq!((now.hour(), now.minute(), now.second()), (14, 3, 30));
    }

    #[test]
    fn manual_clock_rolls_over_midnight() {
        let clock = ManualClock::at(23, 59, 59).unwrap();
        let before = clock.now().date();
        clock.advance(TimeDelta::seconds(1));
        assert_eq!(clock.now().date(), before.succ_opt().unwrap());
    }

    #[test]
    fn invalid_time_rejected() {
        assert!(ManualClock::at(24, 0, 0).is_none());
        assert!(ManualClock::at(12, 60, 0).is_none());
    }

    #[test]
    fn system_clock_is_close_to_local_now() {
        let delta = Local::now().naive_local() - SystemClock.now();
        assert!(delta.num_seconds().abs() < 2);
    }
}
