// Shared test helpers
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::render::{render_channel, AudioRenderer, RenderHandle, RenderOutcome};
use crate::error::RenderError;
use crate::scheduler::sound::{fetch_fn, FetchBytes, SoundDescriptor};

/// Renderer that "plays" for a fixed time on the Tokio clock and records what happened.
///
/// Events: `play:<payload>`, `halt`, `ended`, `suspend`, `close`.
pub struct ScriptedRenderer {
    events: Arc<Mutex<Vec<String>>>,
    clip_length: Mutex<Duration>,
    fail_decode: AtomicBool,
    fail_playback: AtomicBool,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl ScriptedRenderer {
    pub fn new(clip_length: Duration) -> Arc<Self> {
        Arc::new(Self {
            events: Arc::new(Mutex::new(Vec::new())),
            clip_length: Mutex::new(clip_length),
            fail_decode: AtomicBool::new(false),
            fail_playback: AtomicBool::new(false),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn set_clip_length(&self, length: Duration) {
        *self.clip_length.lock() = length;
    }

    pub fn fail_decode(&self, fail: bool) {
        self.fail_decode.store(fail, Ordering::SeqCst);
    }

    pub fn fail_playback(&self, fail: bool) {
        self.fail_playback.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| e.as_str() == event).count()
    }

    pub fn plays(&self) -> usize {
        self.events.lock().iter().filter(|e| e.starts_with("play:")).count()
    }

    /// Highest number of renders that were ever in flight at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn log(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
}

#[async_trait]
impl AudioRenderer for ScriptedRenderer {
    async fn decode_and_play(&self, bytes: Vec<u8>) -> Result<RenderHandle, RenderError> {
        self.log(format!("play:{}", String::from_utf8_lossy(&bytes)));
        if self.fail_decode.load(Ordering::SeqCst) {
            return Err(RenderError::Decode("scripted decode failure".into()));
        }

        let (handle, mut completion) = render_channel();
        let length = *self.clip_length.lock();
        let fail = self.fail_playback.load(Ordering::SeqCst);
        let events = self.events.clone();
        let active = self.active.clone();
        let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = completion.halted() => {
                    events.lock().push("halt".into());
                    RenderOutcome::Halted
                }
                _ = tokio::time::sleep(length) => {
                    if fail {
                        RenderOutcome::Failed("scripted playback failure".into())
                    } else {
                        RenderOutcome::Completed
                    }
                }
            };
            active.fetch_sub(1, Ordering::SeqCst);
            events.lock().push("ended".into());
            completion.finish(outcome);
        });

        Ok(handle)
    }

    async fn suspend(&self) -> Result<(), RenderError> {
        self.log("suspend");
        Ok(())
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.log("close");
        Ok(())
    }
}

/// Fetcher that returns the sound id as its bytes
pub fn echo_fetcher() -> Arc<dyn FetchBytes> {
    fetch_fn(|id, _extra| async move { Ok(id.into_bytes()) })
}

/// `count` descriptors named `s0`, `s1`, ...
pub fn echo_sounds(count: usize) -> Vec<SoundDescriptor> {
    let fetcher = echo_fetcher();
    (0..count)
        .map(|i| SoundDescriptor::new(format!("s{}", i), fetcher.clone()))
        .collect()
}
