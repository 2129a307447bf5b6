//! Parking fee engine
//!
//! The tariff class is fixed by the entry time of day:
//! - Day entry (default 06:00-22:00): free period, then a base fee covering the
//!   base window, then a full hourly increment for every started hour after it.
//! - Night entry: no free period, otherwise the same shape with its own window.
//!
//! All timestamps are naive local time. No time-zone conversion happens here.

use chrono::{NaiveDateTime, NaiveTime};
use serde::Deserialize;

const MINUTES_PER_HOUR: u64 = 60;

/// Billing thresholds for one entry window
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TariffWindow {
    /// Stays up to this many minutes are free; `None` means no free period
    #[serde(default)]
    pub free_minutes: Option<u64>,
    /// Flat fee covering the base window
    pub base_fee: u64,
    /// Minutes covered by the base fee
    pub base_window_minutes: u64,
}

/// Immutable day/night tariff shared by both operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TariffRule {
    day_start: NaiveTime,
    day_end: NaiveTime,
    day: TariffWindow,
    night: TariffWindow,
    hourly_rate: u64,
}

impl Default for TariffRule {
    fn default() -> Self {
        Self {
            day_start: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or_default(),
            day_end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
            day: TariffWindow { free_minutes: Some(30), base_fee: 50, base_window_minutes: 120 },
            night: TariffWindow { free_minutes: None, base_fee: 50, base_window_minutes: 60 },
            hourly_rate: 50,
        }
    }
}

impl TariffRule {
    pub fn new(
        day_start: NaiveTime,
        day_end: NaiveTime,
        day: TariffWindow,
        night: TariffWindow,
        hourly_rate: u64,
    ) -> Self {
        Self { day_start, day_end, day, night, hourly_rate }
    }

    /// Whether an entry at this time of day bills on the day window.
    ///
    /// The window is half-open, `[day_start, day_end)`, and may wrap midnight.
    pub fn is_day_entry(&self, entry: NaiveDateTime) -> bool {
        let t = entry.time();
        if self.day_start <= self.day_end {
            self.day_start <= t && t < self.day_end
        } else {
            t >= self.day_start || t < self.day_end
        }
    }

    /// Window that applies for the whole stay, chosen by entry time only
    pub fn window_for(&self, entry: NaiveDateTime) -> &TariffWindow {
        if self.is_day_entry(entry) {
            &self.day
        } else {
            &self.night
        }
    }

    /// Amount owed for a stay between `entry` and `exit`
    pub fn compute_fee(&self, entry: NaiveDateTime, exit: NaiveDateTime) -> u64 {
        let minutes = stay_minutes(entry, exit);
        self.fee_for_minutes(self.window_for(entry), minutes)
    }

    /// Amount owed for `minutes` on a given window
    pub fn fee_for_minutes(&self, window: &TariffWindow, minutes: u64) -> u64 {
        if let Some(free) = window.free_minutes {
            if minutes <= free {
                return 0;
            }
        }
        if minutes <= window.base_window_minutes {
            return window.base_fee;
        }
        let extra_hours = (minutes - window.base_window_minutes).div_ceil(MINUTES_PER_HOUR);
        window.base_fee + extra_hours * self.hourly_rate
    }

    /// Free minutes left before a day-entry stay starts costing money.
    ///
    /// Night entries have no free period and always report zero.
    pub fn free_minutes_remaining(&self, entry: NaiveDateTime, now: NaiveDateTime) -> u64 {
        let free = self.window_for(entry).free_minutes.unwrap_or(0);
        free.saturating_sub(stay_minutes(entry, now))
    }

    pub fn day_free_minutes(&self) -> u64 {
        self.day.free_minutes.unwrap_or(0)
    }

    pub fn day_start(&self) -> NaiveTime {
        self.day_start
    }

    pub fn day_end(&self) -> NaiveTime {
        self.day_end
    }

    pub fn hourly_rate(&self) -> u64 {
        self.hourly_rate
    }
}

/// Whole minutes between two timestamps, order-insensitive.
///
/// An exit recorded before the entry (clock skew) yields the same gap as the ordered pair.
pub fn stay_minutes(entry: NaiveDateTime, exit: NaiveDateTime) -> u64 {
    let seconds = (exit - entry).num_seconds().unsigned_abs();
    seconds / 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    fn fee_after(entry: NaiveDateTime, minutes: i64) -> u64 {
        TariffRule::default().compute_fee(entry, entry + Duration::minutes(minutes))
    }

    #[test]
    fn test_day_boundaries() {
        let entry = at(10, 0);
        assert_eq!(fee_after(entry, 0), 0);
        assert_eq!(fee_after(entry, 30), 0);
        assert_eq!(fee_after(entry, 31), 50);
        assert_eq!(fee_after(entry, 120), 50);
        assert_eq!(fee_after(entry, 121), 100);
        assert_eq!(fee_after(entry, 180), 100);
        assert_eq!(fee_after(entry, 181), 150);
    }

    #[test]
    fn test_night_boundaries() {
        let entry = at(23, 0);
        assert_eq!(fee_after(entry, 0), 50);
        assert_eq!(fee_after(entry, 60), 50);
        assert_eq!(fee_after(entry, 61), 100);
        assert_eq!(fee_after(entry, 180), 150);
    }

    #[test]
    fn test_partial_minute_is_floored() {
        let rule = TariffRule::default();
        let entry = at(10, 0);
        let exit = entry + Duration::seconds(30 * 60 + 59);
        assert_eq!(rule.compute_fee(entry, exit), 0);
    }

    #[test]
    fn test_window_edges_follow_entry_only() {
        let rule = TariffRule::default();
        assert!(rule.is_day_entry(at(6, 0)));
        assert!(rule.is_day_entry(at(21, 59)));
        assert!(!rule.is_day_entry(at(22, 0)));
        assert!(!rule.is_day_entry(at(5, 59)));

        // Entered at 21:50, stays past 22:00: still billed on the day window
        assert_eq!(fee_after(at(21, 50), 25), 0);
        // Entered at 05:50, stays into the day: night window, no free period
        assert_eq!(fee_after(at(5, 50), 25), 50);
    }

    #[test]
    fn test_reversed_timestamps_match_ordered() {
        let rule = TariffRule::default();
        let entry = at(12, 0);
        let exit = entry + Duration::minutes(200);
        assert_eq!(rule.compute_fee(exit, entry), rule.compute_fee(entry, exit));
        assert_eq!(stay_minutes(exit, entry), 200);
    }

    #[test]
    fn test_day_fee_is_monotonic() {
        let entry = at(8, 15);
        let mut previous = 0;
        for minutes in 0..=24 * 60 {
            let fee = fee_after(entry, minutes);
            assert!(fee >= previous, "fee dropped at {minutes} minutes");
            previous = fee;
        }
    }

    #[test]
    fn test_wrapping_day_window() {
        let rule = TariffRule::new(
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            TariffWindow { free_minutes: Some(10), base_fee: 20, base_window_minutes: 60 },
            TariffWindow { free_minutes: None, base_fee: 30, base_window_minutes: 60 },
            10,
        );
        assert!(rule.is_day_entry(at(23, 0)));
        assert!(rule.is_day_entry(at(3, 59)));
        assert!(!rule.is_day_entry(at(12, 0)));
        assert_eq!(rule.compute_fee(at(23, 0), at(23, 5)), 0);
        assert_eq!(rule.compute_fee(at(23, 0), at(23, 0) + Duration::minutes(61)), 30);
    }

    #[test]
    fn test_free_minutes_remaining() {
        let rule = TariffRule::default();
        let entry = at(9, 0);
        assert_eq!(rule.free_minutes_remaining(entry, entry + Duration::minutes(12)), 18);
        assert_eq!(rule.free_minutes_remaining(entry, entry + Duration::minutes(45)), 0);
        assert_eq!(rule.free_minutes_remaining(at(23, 0), at(23, 5)), 0);
    }
}
