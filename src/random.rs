// Random helpers for the playback loop
use rand::Rng;
use std::time::Duration;

use crate::scheduler::types::PlaybackConfig;

/// Upper bound (exclusive) of the random delay before the first cycle
pub const MAX_INITIAL_DELAY_MS: i64 = 5000;

/// Uniform integer in `[min, max)`. Collapses to `min` on an empty range.
pub fn rand_int<R: Rng + ?Sized>(rng: &mut R, min: i64, max: i64) -> i64 {
    if max <= min {
        return min;
    }
    rng.gen_range(min..max)
}

/// Weighted coin flip: true with probability `chance`
pub fn roll<R: Rng + ?Sized>(rng: &mut R, chance: f64) -> bool {
    if chance.is_nan() {
        return false;
    }
    rng.gen_bool(chance.clamp(0.0, 1.0))
}

/// Uniform index into a list of `len` items
pub fn pick_index<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(rng.gen_range(0..len))
    }
}

/// Delay before the first cycle, uniform in `[0, 5000)` ms
pub fn initial_delay<R: Rng + ?Sized>(rng: &mut R) -> Duration {
    millis(rand_int(rng, 0, MAX_INITIAL_DELAY_MS))
}

/// `cycle_duration` plus a symmetric jitter drawn from `[-cycle_delta, +cycle_delta]`
pub fn next_cycle_delay<R: Rng + ?Sized>(rng: &mut R, config: &PlaybackConfig) -> Duration {
    let base = duration_ms(config.cycle_duration);
    let delta = duration_ms(config.cycle_delta);
    let jitter = if delta == 0 {
        0
    } else {
        rng.gen_range(-delta..=delta)
    };
    millis(base.saturating_add(jitter))
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}
