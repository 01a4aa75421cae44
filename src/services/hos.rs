//! Hours-of-Service break insertion
//!
//! Breaks are folded into the drive time of the leg during which the driver
//! crosses a threshold. The counters carry over between legs of one trip.

use serde::{Deserialize, Serialize};

/// Break thresholds. Historical rule sets disagree, so every value is
/// configurable through the dispatch rules file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HosRules {
    pub short_break_after_hours: f64,
    pub short_break_minutes: f64,
    pub major_break_after_hours: f64,
    pub major_break_minutes: f64,
    /// Rest interval applied on legs where no 15/45 break fell
    pub rest_interval_hours: f64,
    pub rest_minutes: f64,
}

impl Default for HosRules {
    fn default() -> Self {
        Self {
            short_break_after_hours: 4.0,
            short_break_minutes: 15.0,
            major_break_after_hours: 8.0,
            major_break_minutes: 45.0,
            rest_interval_hours: 3.0,
            rest_minutes: 10.0,
        }
    }
}

/// Breaks added on a single leg
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LegBreaks {
    pub drive_hours: f64,
    pub break_minutes: f64,
}

impl LegBreaks {
    pub fn effective_hours(&self) -> f64 {
        self.drive_hours + self.break_minutes / 60.0
    }
}

/// Driving counters carried across legs
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HosState {
    /// Hours driven since the last 45-minute break
    pub hours_since_major: f64,
    /// Hours driven since any break was last inserted
    pub hours_since_break: f64,
    /// 15-minute break already taken in the current major cycle
    pub short_break_taken: bool,
}

impl HosState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive one leg and return the break time it requires.
    pub fn drive(&mut self, rules: &HosRules, drive_hours: f64) -> LegBreaks {
        let drive_hours = drive_hours.max(0.0);
        let mut break_minutes = 0.0;
        let mut inserted = false;

        self.hours_since_major += drive_hours;
        self.hours_since_break += drive_hours;

        if rules.major_break_after_hours > 0.0 {
            while self.hours_since_major >= rules.major_break_after_hours {
                if !self.short_break_taken {
                    break_minutes += rules.short_break_minutes;
                }
                break_minutes += rules.major_break_minutes;
                self.hours_since_major -= rules.major_break_after_hours;
                self.short_break_taken = false;
                inserted = true;
            }
        }

        if !self.short_break_taken
            && rules.short_break_after_hours > 0.0
            && self.hours_since_major >= rules.short_break_after_hours
        {
            break_minutes += rules.short_break_minutes;
            self.short_break_taken = true;
            inserted = true;
        }

        if inserted {
            self.hours_since_break = 0.0;
        } else if rules.rest_interval_hours > 0.0 {
            let intervals = (self.hours_since_break / rules.rest_interval_hours).floor();
            if intervals >= 1.0 {
                break_minutes += intervals * rules.rest_minutes;
                self.hours_since_break -= intervals * rules.rest_interval_hours;
            }
        }

        LegBreaks {
            drive_hours,
            break_minutes,
        }
    }
}

/// Effective hours for a sequence of legs driven back to back
pub fn effective_drive_hours(rules: &HosRules, legs: &[f64]) -> f64 {
    let mut state = HosState::new();
    legs.iter().map(|h| state.drive(rules, *h).effective_hours()).sum()
}
