// Random ambient playback
// A timer loop that rolls the dice every cycle and plays one of the loaded sounds.

pub mod player;
pub mod sound;
mod timer;
pub mod types;

pub use player::SoundScheduler;
pub use sound::{fetch_fn, validate_sounds, FetchBytes, FnFetcher, SoundDescriptor};
pub use types::{PlayOutcome, PlaybackConfig, PlaybackConfigInput, SchedulerState, StartOutcome};
