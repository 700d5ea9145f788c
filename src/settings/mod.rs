// Persisted application settings
#[allow(clippy::module_inception)]
mod settings;

pub use settings::{LoggingSettings, SoundboardSettings, StorageSettings};
