// Scheduler state and playback configuration
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::validation::{FieldErrors, ValidationError};

/// Lifecycle state of a `SoundScheduler`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Nothing loaded yet, or torn down after a failed cycle
    Uninitialized,
    /// Ready; a cycle may be pending
    Stopped,
    /// A sound is rendering
    Playing,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Stopped => "stopped",
            Self::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// Playback config as supplied by a caller, before validation.
///
/// Durations are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfigInput {
    pub play_chance: f64,
    pub cycle_duration_ms: f64,
    pub cycle_delta_ms: f64,
}

impl Default for PlaybackConfigInput {
    /// Play a sound every 30 seconds
    fn default() -> Self {
        Self {
            play_chance: 1.0,
            cycle_duration_ms: 30_000.0,
            cycle_delta_ms: 0.0,
        }
    }
}

impl PlaybackConfigInput {
    /// Check every field and collect all failures.
    ///
    /// On success the durations are floored to whole milliseconds.
    pub fn validate(&self) -> Result<PlaybackConfig, ValidationError> {
        let mut errors = FieldErrors::new();

        if self.play_chance.is_nan() || !(0.0..=1.0).contains(&self.play_chance) {
            errors.add("play_chance", "Must be a percentage [0,1].");
        }
        check_duration(&mut errors, "cycle_duration", self.cycle_duration_ms);
        check_duration(&mut errors, "cycle_delta", self.cycle_delta_ms);

        if !errors.is_empty() {
            return Err(ValidationError::Config(errors));
        }

        Ok(PlaybackConfig {
            play_chance: self.play_chance,
            cycle_duration: Duration::from_millis(self.cycle_duration_ms.floor() as u64),
            cycle_delta: Duration::from_millis(self.cycle_delta_ms.floor() as u64),
        })
    }
}

fn check_duration(errors: &mut FieldErrors, field: &str, value: f64) {
    if value.is_nan() || value < 0.0 {
        errors.add(field, "Must be positive.");
    } else if !value.is_finite() {
        errors.add(field, "Must be a finite number of milliseconds.");
    }
}

/// Validated, normalized playback config
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackConfig {
    /// Probability in `[0, 1]` that a cycle plays a sound
    pub play_chance: f64,
    /// Nominal wait between cycles
    pub cycle_duration: Duration,
    /// Symmetric jitter applied to `cycle_duration`
    pub cycle_delta: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            play_chance: 1.0,
            cycle_duration: Duration::from_secs(30),
            cycle_delta: Duration::ZERO,
        }
    }
}

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The first cycle was armed after `delay`
    Scheduled { delay: Duration },
    /// A cycle was already armed; nothing changed
    AlreadyRunning,
}

impl StartOutcome {
    /// Delay of the newly armed cycle, zero when already running
    pub fn delay(&self) -> Duration {
        match self {
            Self::Scheduled { delay } => *delay,
            Self::AlreadyRunning => Duration::ZERO,
        }
    }
}

/// How a single playback finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The sound rendered to its end
    Completed,
    /// `stop()` (or a reload) halted the sound
    Halted,
}
