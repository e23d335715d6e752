//! Rest countdown between sets.
//!
//! A timer is an end instant plus the name of the exercise that started it.
//! Remaining time is always recomputed from the clock, so polling cadence only
//! affects how quickly expiry is noticed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Countdown started after a completed set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RestTimer {
    pub name: String,
    pub total_seconds: u32,
    pub ends_at: DateTime<Utc>,
}

impl RestTimer {
    pub fn start(name: impl Into<String>, seconds: u32, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            total_seconds: seconds,
            ends_at: now + Duration::seconds(seconds as i64),
        }
    }

    /// Whole seconds left, rounded up, never negative
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u32 {
        let millis = (self.ends_at - now).num_milliseconds();
        if millis <= 0 {
            0
        } else {
            ((millis + 999) / 1000) as u32
        }
    }

    /// Fraction of the rest already elapsed, in `[0, 1]`
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        if self.total_seconds == 0 {
            return 1.0;
        }
        let remaining = self.remaining_seconds(now) as f64;
        (1.0 - remaining / self.total_seconds as f64).clamp(0.0, 1.0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at
    }

    /// Push the end instant forward without restarting the countdown
    pub fn extend(&mut self, seconds: u32) {
        self.ends_at += Duration::seconds(seconds as i64);
        self.total_seconds += seconds;
        tracing::debug!("Rest for {} extended by {}s", self.name, seconds);
    }
}

/// Side effect fired once when a rest timer reaches zero
pub trait RestAlert {
    fn alert(&mut self, exercise_name: &str);
}

/// Rings the terminal bell and prints a short notice
#[derive(Debug, Default)]
pub struct TerminalBell;

impl RestAlert for TerminalBell {
    fn alert(&mut self, exercise_name: &str) {
        let mut out = std::io::stdout();
        // A failed bell only loses the notification
        if let Err(e) = writeln!(out, "\x07Rest over: {}", exercise_name).and_then(|_| out.flush()) {
            tracing::warn!("Failed to ring rest alert: {}", e);
        }
    }
}
