use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

/// Daily trigger: the run proceeds only during the configured local minute.
///
/// The wall clock is converted into `timezone` first, so the trigger follows
/// daylight-saving changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub hour: u32,
    pub minute: u32,
    pub timezone: Tz,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            hour: 5,
            minute: 0,
            timezone: chrono_tz::Europe::Berlin,
        }
    }
}

/// Raw `[schedule]` table as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    pub hour: u32,
    pub minute: u32,
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hour: 5,
            minute: 0,
            timezone: "Europe/Berlin".to_string(),
        }
    }
}

impl Schedule {
    pub fn new(hour: u32, minute: u32, timezone: &str) -> Result<Self, String> {
        if hour > 23 || minute > 59 {
            return Err(format!("invalid run time {hour:02}:{minute:02}"));
        }
        let timezone: Tz = timezone
            .parse()
            .map_err(|e| format!("unknown timezone \"{timezone}\": {e}"))?;
        Ok(Self {
            hour,
            minute,
            timezone,
        })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self, String> {
        Self::new(config.hour, config.minute, &config.timezone)
    }

    /// Whether `now` falls inside the trigger minute in local time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        local.hour() == self.hour && local.minute() == self.minute
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02} {}", self.hour, self.minute, self.timezone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 30).unwrap()
    }

    #[test]
    fn test_berlin_winter_time() {
        let s = Schedule::default();
        // CET = UTC+1
        assert!(s.is_due(utc(2025, 1, 15, 4, 0)));
        assert!(!s.is_due(utc(2025, 1, 15, 5, 0)));
        assert!(!s.is_due(utc(2025, 1, 15, 4, 1)));
    }

    #[test]
    fn test_berlin_summer_time() {
        let s = Schedule::default();
        // CEST = UTC+2
        assert!(s.is_due(utc(2025, 7, 15, 3, 0)));
        assert!(!s.is_due(utc(2025, 7, 15, 4, 0)));
    }

    #[test]
    fn test_dst_switch_days() {
        let s = Schedule::default();
        // clocks go forward at 02:00 local on 2025-03-30, 05:00 is already CEST
        assert!(s.is_due(utc(2025, 3, 30, 3, 0)));
        // clocks go back at 03:00 local on 2025-10-26, 05:00 is CET again
        assert!(s.is_due(utc(2025, 10, 26, 4, 0)));
    }

    #[test]
    fn test_other_zone() {
        let s = Schedule::new(23, 45, "America/New_York").unwrap();
        assert!(s.is_due(utc(2025, 1, 16, 4, 45)));
        assert_eq!(s.to_string(), "23:45 America/New_York");
    }

    #[test]
    fn test_invalid_schedule() {
        assert!(Schedule::new(24, 0, "Europe/Berlin").is_err());
        assert!(Schedule::new(5, 60, "Europe/Berlin").is_err());
        assert!(Schedule::new(5, 0, "Mars/Olympus").is_err());
    }
}
