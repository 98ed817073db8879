//! Wall-clock access and the reference timezone used for "today".

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use std::sync::Mutex;

/// Reflection days roll over at midnight UTC+9 regardless of where the
/// server runs.
pub const REFERENCE_OFFSET_SECS: i32 = 9 * 60 * 60;

pub fn reference_offset() -> FixedOffset {
    FixedOffset::east_opt(REFERENCE_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Calendar day of `instant` in the reference timezone.
pub fn reference_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&reference_offset()).date_naive()
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        reference_date(self.now())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = *guard + by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reference_date_rolls_over_at_kst_midnight() {
        // 14:59 UTC is 23:59 KST
        let before = Utc.with_ymd_and_hms(2024, 5, 1, 14, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 5, 1, 15, 0, 0).unwrap();
        assert_eq!(reference_date(before), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(reference_date(after), NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
    }

    #[test]
    fn test_fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(chrono::Duration::hours(1));
        assert_eq!(clock.now(), start + chrono::Duration::hours(1));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }
}
