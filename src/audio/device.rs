// cpal-backed render port
// The output stream is not Send, so it lives on a dedicated device thread that
// serves one command at a time. A second Play waits until the first one ends.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::decoder::{decode_clip, DecodedClip};
use super::output::AudioOutput;
use super::render::{render_channel, AudioRenderer, RenderCompletion, RenderHandle, RenderOutcome};
use super::resample::adapt_clip;
use crate::error::RenderError;

/// Samples handed to the ring buffer per write
const WRITE_CHUNK: usize = 4096;

/// Back-off while the ring buffer is full or draining
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Longest wait for the callback to drop queued samples after a halt
const CLEAR_TIMEOUT: Duration = Duration::from_millis(100);

enum DeviceCommand {
    Play {
        clip: DecodedClip,
        completion: RenderCompletion,
        started: oneshot::Sender<Result<(), RenderError>>,
    },
    Suspend {
        done: oneshot::Sender<Result<(), RenderError>>,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

/// Renders clips on the default output device
pub struct CpalRenderer {
    commands: Mutex<mpsc::Sender<DeviceCommand>>,
}

impl CpalRenderer {
    /// Spawn the device thread. The device itself is opened on the first render.
    pub fn new() -> Result<Self, RenderError> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("soundboard-audio".into())
            .spawn(move || device_loop(rx))
            .map_err(|e| RenderError::Device(format!("Failed to spawn audio thread: {}", e)))?;

        Ok(Self {
            commands: Mutex::new(tx),
        })
    }

    fn send(&self, command: DeviceCommand) -> Result<(), RenderError> {
        self.commands
            .lock()
            .send(command)
            .map_err(|_| RenderError::DeviceClosed)
    }
}

#[async_trait]
impl AudioRenderer for CpalRenderer {
    async fn decode_and_play(&self, bytes: Vec<u8>) -> Result<RenderHandle, RenderError> {
        let clip = tokio::task::spawn_blocking(move || decode_clip(bytes))
            .await
            .map_err(|e| RenderError::Decode(format!("Decoder task failed: {}", e)))??;

        debug!(
            frames = clip.frames(),
            sample_rate = clip.sample_rate,
            channels = clip.channels,
            "Decoded clip"
        );

        let (handle, completion) = render_channel();
        let (started_tx, started_rx) = oneshot::channel();
        self.send(DeviceCommand::Play {
            clip,
            completion,
            started: started_tx,
        })?;
        started_rx.await.map_err(|_| RenderError::DeviceClosed)??;

        Ok(handle)
    }

    async fn suspend(&self) -> Result<(), RenderError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(DeviceCommand::Suspend { done: done_tx })?;
        done_rx.await.map_err(|_| RenderError::DeviceClosed)?
    }

    async fn close(&self) -> Result<(), RenderError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(DeviceCommand::Close { done: done_tx })?;
        done_rx.await.map_err(|_| RenderError::DeviceClosed)
    }
}

fn device_loop(commands: mpsc::Receiver<DeviceCommand>) {
    let mut output: Option<AudioOutput> = None;

    while let Ok(command) = commands.recv() {
        match command {
            DeviceCommand::Play {
                clip,
                completion,
                started,
            } => match prepare(&mut output, &clip) {
                Ok(samples) => {
                    let _ = started.send(Ok(()));
                    let outcome = match output.as_ref() {
                        Some(out) => render(out, &samples, &completion),
                        None => RenderOutcome::Failed(RenderError::DeviceClosed.to_string()),
                    };
                    completion.finish(outcome);
                }
                Err(e) => {
                    completion.finish(RenderOutcome::Failed(e.to_string()));
                    let _ = started.send(Err(e));
                }
            },
            DeviceCommand::Suspend { done } => {
                let result = match output.as_mut() {
                    Some(out) => out.pause(),
                    None => Ok(()),
                };
                let _ = done.send(result);
            }
            DeviceCommand::Close { done } => {
                if output.take().is_some() {
                    info!("Audio output closed");
                }
                let _ = done.send(());
            }
        }
    }

    debug!("Audio device thread exiting");
}

/// Open the device on first use, make sure it runs, and fit the clip to it
fn prepare(output: &mut Option<AudioOutput>, clip: &DecodedClip) -> Result<Vec<f32>, RenderError> {
    if output.is_none() {
        let opened = AudioOutput::open()?;
        info!(
            sample_rate = opened.sample_rate(),
            channels = opened.channels(),
            "Audio output opened"
        );
        *output = Some(opened);
    }
    let Some(out) = output.as_mut() else {
        return Err(RenderError::DeviceClosed);
    };
    out.resume()?;
    adapt_clip(clip, out.sample_rate(), out.channels() as usize)
}

fn render(output: &AudioOutput, samples: &[f32], completion: &RenderCompletion) -> RenderOutcome {
    let mut remaining = samples;

    while !remaining.is_empty() {
        if completion.is_halted() {
            return halt(output);
        }
        let written = output.write(&remaining[..remaining.len().min(WRITE_CHUNK)]);
        if written > 0 {
            remaining = &remaining[written..];
        } else {
            thread::sleep(POLL_INTERVAL);
        }
    }

    // Let the device play out what is still queued
    while output.buffered() > 0 {
        if completion.is_halted() {
            return halt(output);
        }
        thread::sleep(POLL_INTERVAL);
    }

    RenderOutcome::Completed
}

/// Drop what is queued so the next clip starts clean
fn halt(output: &AudioOutput) -> RenderOutcome {
    output.clear();
    let started = Instant::now();
    while output.clear_pending() && started.elapsed() < CLEAR_TIMEOUT {
        thread::sleep(POLL_INTERVAL);
    }
    RenderOutcome::Halted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_undecodable_bytes_never_reach_the_device() {
        let renderer = CpalRenderer::new().unwrap();
        let err = renderer
            .decode_and_play(b"not audio at all".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Decode(_)));
    }

    #[tokio::test]
    async fn test_suspend_and_close_before_first_render() {
        let renderer = CpalRenderer::new().unwrap();
        renderer.suspend().await.unwrap();
        renderer.close().await.unwrap();
        renderer.close().await.unwrap();
    }
}
