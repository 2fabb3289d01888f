//! Randomized pauses between steps and the tap timeline submitted with a game.

use crate::config::{DelayRange, PacingConfig};
use core_logic::Sleeper;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum PacingPolicy {
    /// Pauses drawn uniformly from the configured ranges.
    Uniform(PacingConfig),
    /// Every pause is zero. Used by tests and `pacing.enabled = false`.
    Disabled,
}

impl PacingPolicy {
    pub fn from_config(config: &PacingConfig) -> Self {
        if config.enabled {
            PacingPolicy::Uniform(config.clone())
        } else {
            PacingPolicy::Disabled
        }
    }

    pub fn draw(&self, pick: impl Fn(&PacingConfig) -> DelayRange) -> Duration {
        match self {
            PacingPolicy::Uniform(config) => uniform(pick(config), &mut rand::thread_rng()),
            PacingPolicy::Disabled => Duration::ZERO,
        }
    }

    /// Sleeps for a pause drawn from the selected range. Zero pauses skip the sleeper.
    pub async fn pause(&self, sleeper: &dyn Sleeper, pick: impl Fn(&PacingConfig) -> DelayRange) {
        let delay = self.draw(pick);
        if !delay.is_zero() {
            sleeper.sleep(delay).await;
        }
    }
}

pub fn uniform<R: Rng + ?Sized>(range: DelayRange, rng: &mut R) -> Duration {
    let (lo, hi) = if range.min_ms <= range.max_ms {
        (range.min_ms, range.max_ms)
    } else {
        (range.max_ms, range.min_ms)
    };
    Duration::from_millis(rng.gen_range(lo..=hi))
}

/// Parameters of the simulated tapping session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapModel {
    pub min_taps: u32,
    pub max_taps: u32,
    pub duration_ms: u64,
    pub jitter: f64,
    pub micro_delay_chance: f64,
    pub micro_delay_max_ms: u64,
}

impl From<&PacingConfig> for TapModel {
    fn from(config: &PacingConfig) -> Self {
        Self {
            min_taps: config.min_taps,
            max_taps: config.max_taps,
            duration_ms: config.game_duration_ms,
            jitter: config.tap_jitter,
            micro_delay_chance: config.micro_delay_chance,
            micro_delay_max_ms: config.micro_delay_max_ms,
        }
    }
}

impl TapModel {
    /// Latest possible offset of the final tap from the start time.
    pub fn upper_bound_ms(&self, taps: usize) -> u64 {
        let jitter_ms = (self.duration_ms as f64 * self.jitter).ceil() as u64;
        self.duration_ms + jitter_ms + taps as u64 * (self.micro_delay_max_ms + 1)
    }

    /// Epoch-millisecond tap times starting after `start_ms`, non-decreasing.
    pub fn synthesize<R: Rng + ?Sized>(&self, start_ms: i64, rng: &mut R) -> Vec<i64> {
        let count = rng.gen_range(self.min_taps..=self.max_taps.max(self.min_taps)).max(1);
        let mean = self.duration_ms as f64 / count as f64;

        let mut current = start_ms;
        let mut taps = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let offset = if self.jitter > 0.0 {
                rng.gen_range(-self.jitter..self.jitter) * mean
            } else {
                0.0
            };
            let interval = (mean + offset).floor().max(0.0) as i64;
            if self.micro_delay_max_ms > 0
                && self.micro_delay_chance > 0.0
                && rng.gen_bool(self.micro_delay_chance.min(1.0))
            {
                current += rng.gen_range(0..=self.micro_delay_max_ms) as i64;
            }
            current += interval;
            taps.push(current);
        }
        taps
    }
}
