use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

/// Counts executed orders per local calendar day.
///
/// The caller drives the clock: `tick` is handed the local wall-clock time and
/// resets the count whenever the date has moved on.
#[derive(Debug, Clone)]
pub struct DailyTradeCounter {
    count: u32,
    limit: u32,
    day: NaiveDate,
}

impl DailyTradeCounter {
    pub fn new(limit: u32, now: NaiveDateTime) -> Self {
        Self { count: 0, limit, day: now.date() }
    }

    /// Returns true when this call rolled the counter over to a new day.
    pub fn tick(&mut self, now: NaiveDateTime) -> bool {
        let today = now.date();
        if today > self.day {
            self.day = today;
            self.count = 0;
            return true;
        }
        false
    }

    pub fn can_trade(&self) -> bool {
        self.count < self.limit
    }

    pub fn record(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Time left until the next local midnight.
    pub fn until_reset(&self, now: NaiveDateTime) -> TimeDelta {
        match now.date().succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)) {
            Some(midnight) => midnight - now,
            None => TimeDelta::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn blocks_once_limit_reached() {
        let mut c = DailyTradeCounter::new(2, at(2026, 3, 1, 9, 0));
        assert!(c.can_trade());
        c.record();
        c.record();
        assert!(!c.can_trade());
        assert_eq!(c.count(), 2);
    }

    #[test]
    fn resets_when_local_date_advances() {
        let mut c = DailyTradeCounter::new(1, at(2026, 3, 1, 23, 50));
        c.record();
        assert!(!c.tick(at(2026, 3, 1, 23, 59)));
        assert!(!c.can_trade());

        assert!(c.tick(at(2026, 3, 2, 0, 0)));
        assert_eq!(c.count(), 0);
        assert!(c.can_trade());

        // same day again: no second reset
        c.record();
        assert!(!c.tick(at(2026, 3, 2, 12, 0)));
        assert_eq!(c.count(), 1);
    }

    #[test]
    fn skipped_days_reset_once() {
        let mut c = DailyTradeCounter::new(5, at(2026, 3, 1, 10, 0));
        c.record();
        assert!(c.tick(at(2026, 3, 4, 8, 0)));
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn clock_going_backwards_does_not_reset() {
        let mut c = DailyTradeCounter::new(5, at(2026, 3, 2, 0, 5));
        c.record();
        assert!(!c.tick(at(2026, 3, 1, 23, 59)));
        assert_eq!(c.count(), 1);
    }

    #[test]
    fn zero_limit_never_trades() {
        let c = DailyTradeCounter::new(0, at(2026, 3, 1, 10, 0));
        assert!(!c.can_trade());
    }

    #[test]
    fn until_reset_counts_to_next_midnight() {
        let c = DailyTradeCounter::new(5, at(2026, 3, 1, 10, 0));
        assert_eq!(c.until_reset(at(2026, 3, 1, 22, 30)), TimeDelta::minutes(90));
        assert_eq!(c.until_reset(at(2026, 3, 1, 0, 0)), TimeDelta::hours(24));
    }
}
