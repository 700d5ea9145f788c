// Ambient Soundboard
// Stores sound clips in buckets and plays a random one every few seconds

pub mod audio;
pub mod db;
pub mod error;
pub mod library;
pub mod logging;
pub mod random;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod validation;

#[cfg(test)]
mod test_utils;

pub use audio::{AudioRenderer, CpalRenderer, RenderHandle, RenderOutcome};
pub use db::{AddedFile, BucketStore, DbLocation, FileBlob, StoredFile};
pub use error::{RenderError, SchedulerError, StoreError};
pub use logging::init_logging;
pub use scheduler::{
    fetch_fn, FetchBytes, PlayOutcome, PlaybackConfig, PlaybackConfigInput, SchedulerState,
    SoundDescriptor, SoundScheduler, StartOutcome,
};
pub use settings::SoundboardSettings;
pub use state::AppState;
pub use validation::{FieldErrors, ValidationError};
