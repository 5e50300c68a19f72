//! The shared game clock.
//!
//! Game time is a 24-hour cycle advanced by the tick scheduler; everything
//! else that cares about "when" (cooldowns, respawns, idle timeouts) uses
//! monotonic wall-clock instants instead, stored as absolute expiries.

use std::sync::atomic::{AtomicU8, Ordering};

pub const HOURS_PER_DAY: u8 = 24;

/// Broad stretch of the game day, used for ambient flavor text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPeriod {
    Night,
    Morning,
    Afternoon,
    Evening,
}

impl DayPeriod {
    pub fn from_hour(hour: u8) -> Self {
        match hour % HOURS_PER_DAY {
            0..=5 => DayPeriod::Night,
            6..=11 => DayPeriod::Morning,
            12..=17 => DayPeriod::Afternoon,
            _ => DayPeriod::Evening,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DayPeriod::Night => "night",
            DayPeriod::Morning => "morning",
            DayPeriod::Afternoon => "afternoon",
            DayPeriod::Evening => "evening",
        }
    }
}

/// Hour-of-day shared by every session and tick thread.
///
/// Stored in a single atomic so concurrent `advance_hour` calls from the
/// scheduler and admin commands never lose an increment.
#[derive(Debug, Default)]
pub struct GameClock {
    hour: AtomicU8,
}

impl GameClock {
    pub fn new(hour: u8) -> Self {
        Self {
            hour: AtomicU8::new(hour % HOURS_PER_DAY),
        }
    }

    pub fn hour(&self) -> u8 {
        self.hour.load(Ordering::SeqCst)
    }

    /// Advance the clock one hour, wrapping at midnight. Returns the new hour.
    pub fn advance_hour(&self) -> u8 {
        let prev = self
            .hour
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |h| {
                Some((h + 1) % HOURS_PER_DAY)
            })
            .unwrap_or(0);
        (prev + 1) % HOURS_PER_DAY
    }

    pub fn period(&self) -> DayPeriod {
        DayPeriod::from_hour(self.hour())
    }

    pub fn time_string(&self) -> String {
        time_string(self.hour())
    }

    pub fn descriptive_time(&self) -> String {
        descriptive_time(self.hour())
    }
}

/// Render an hour as a wall-clock string, e.g. `06:00`.
pub fn time_string(hour: u8) -> String {
    format!("{:02}:00", hour % HOURS_PER_DAY)
}

/// A sentence describing the hour, e.g. `It is noon`.
pub fn descriptive_time(hour: u8) -> String {
    match hour % HOURS_PER_DAY {
        0 => "It is midnight".to_string(),
        12 => "It is noon".to_string(),
        h => format!("It is {} in the {}", time_string(h), DayPeriod::from_hour(h).name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn periods_match_expected_table() {
        for hour in [0, 3] {
            assert_eq!(DayPeriod::from_hour(hour).name(), "night", "hour {hour}");
        }
        for hour in [6, 9] {
            assert_eq!(DayPeriod::from_hour(hour).name(), "morning", "hour {hour}");
        }
        for hour in [12, 15] {
            assert_eq!(DayPeriod::from_hour(hour).name(), "afternoon", "hour {hour}");
        }
        for hour in [18, 21] {
            assert_eq!(DayPeriod::from_hour(hour).name(), "evening", "hour {hour}");
        }
    }

    #[test]
    fn time_string_zero_pads() {
        assert_eq!(time_string(6), "06:00");
        assert_eq!(time_string(23), "23:00");
    }

    #[test]
    fn descriptive_time_has_special_cases() {
        assert_eq!(descriptive_time(12), "It is noon");
        assert_eq!(descriptive_time(0), "It is midnight");
        assert_eq!(descriptive_time(6), "It is 06:00 in the morning");
    }

    #[test]
    fn advance_wraps_at_midnight() {
        let clock = GameClock::new(23);
        assert_eq!(clock.advance_hour(), 0);
        assert_eq!(clock.hour(), 0);
    }

    #[test]
    fn new_clock_normalizes_hour() {
        assert_eq!(GameClock::new(25).hour(), 1);
    }

    #[test]
    fn concurrent_advances_are_not_lost() {
        let clock = Arc::new(GameClock::new(0));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let clock = Arc::clone(&clock);
            handles.push(std::thread::spawn(move || {
                for _ in 0..10 {
                    clock.advance_hour();
                }
            }));
        }
        for _ in 0..10 {
            let clock = Arc::clone(&clock);
            handles.push(std::thread::spawn(move || {
                for _ in 0..20 {
                    let hour = clock.hour();
                    assert!(hour < HOURS_PER_DAY);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        // 50 advances from hour 0 land on 50 mod 24.
        assert_eq!(clock.hour(), 2);
    }
}
