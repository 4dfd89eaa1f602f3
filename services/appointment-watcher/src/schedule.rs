//! Run cadence: cron fire times plus a random start delay.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

pub struct RunSchedule {
    schedule: cron::Schedule,
    max_jitter: Duration,
}

impl RunSchedule {
    pub fn new(expression: &str, max_jitter: Duration) -> Result<Self> {
        let schedule = cron::Schedule::from_str(expression)
            .with_context(|| format!("invalid cron expression {expression:?}"))?;
        Ok(Self {
            schedule,
            max_jitter,
        })
    }

    /// Next fire time strictly after `now`, if the expression has one.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    /// Time to sleep from `now` until the next run should start.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.delay_with(now, rand::random::<f64>())
    }

    /// `fraction` in [0, 1) picks the share of `max_jitter` added after the
    /// cron fire time.
    fn delay_with(&self, now: DateTime<Utc>, fraction: f64) -> Option<Duration> {
        let next = self.next_after(now)?;
        let until_fire = (next - now).to_std().unwrap_or(Duration::ZERO);
        Some(until_fire + self.max_jitter.mul_f64(fraction.clamp(0.0, 1.0)))
    }
}
