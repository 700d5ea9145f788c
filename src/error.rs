// Error types for the scheduler, the render port and the bucket store
use thiserror::Error;

use crate::validation::ValidationError;

/// Failures reported by an audio renderer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// The encoded bytes could not be probed or decoded
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// The container holds no decodable audio track
    #[error("No audio track found")]
    NoAudioTrack,

    /// The output device could not be opened or driven
    #[error("Audio device error: {0}")]
    Device(String),

    /// Sample rate conversion failed
    #[error("Resampling failed: {0}")]
    Resample(String),

    /// The renderer's device thread is gone
    #[error("Audio device is closed")]
    DeviceClosed,

    /// A render started but reported a terminal failure
    #[error("Playback failed: {0}")]
    Playback(String),
}

/// Errors returned by the playback scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No config or sound list has been loaded yet
    #[error("Scheduler is not ready: load a config or a sound list first")]
    NotReady,

    /// A sound is already rendering
    #[error("Already playing a sound")]
    AlreadyPlaying,

    /// The held sound list is empty
    #[error("Empty sound list: nothing to play")]
    EmptySoundList,

    /// No sound at the requested position
    #[error("Sound at position {0} not found")]
    NotFound(usize),

    /// Rejected config or sound list
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A held descriptor cannot be played
    #[error("Malformed sound descriptor {id:?}")]
    InvalidDescriptor { id: String },

    /// The descriptor's byte fetcher failed
    #[error("Failed to fetch bytes for sound {id}: {source}")]
    Fetch {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The byte fetcher resolved without any data
    #[error("Sound {id} returned no audio bytes")]
    EmptyPayload { id: String },

    /// Decode or playback failure
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The timer loop needs a Tokio runtime
    #[error("No Tokio runtime available to run the timer loop")]
    NoRuntime,
}

/// Errors returned by the bucket store
#[derive(Debug, Error)]
pub enum StoreError {
    /// `setup()` has not completed
    #[error("Bucket store is not ready: call setup first")]
    NotReady,

    /// The requested schema version cannot be opened
    #[error(
        "Unsupported schema version {requested} (database is at {current}, supported up to {supported})"
    )]
    SchemaVersion {
        requested: u32,
        current: u32,
        supported: u32,
    },

    /// The underlying transaction failed and was rolled back
    #[error("Transaction failed: {0}")]
    Transaction(#[from] rusqlite::Error),

    /// Filesystem error while opening the database
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The blocking database worker panicked or was cancelled
    #[error("Database task failed: {0}")]
    Task(String),
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
