// Audio rendering
// Uses Symphonia for decoding, Rubato for resampling and cpal for output

pub mod decoder;
pub mod device;
pub mod output;
pub mod render;
pub mod resample;

pub use device::CpalRenderer;
pub use render::{render_channel, AudioRenderer, RenderCompletion, RenderHandle, RenderOutcome};
