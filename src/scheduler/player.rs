// Playback scheduler
// Owns the state machine, the jittered cycle loop and the single-flight render pipeline.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::sound::{validate_sounds, SoundDescriptor};
use super::timer::ScheduledTask;
use super::types::{
    PlayOutcome, PlaybackConfig, PlaybackConfigInput, SchedulerState, StartOutcome,
};
use crate::audio::render::{AudioRenderer, RenderHandle, RenderOutcome};
use crate::error::{RenderError, SchedulerError, SchedulerResult};
use crate::random;

type CycleFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Held for the whole of one play; dropping it releases the slot
type SlotGuard = watch::Sender<()>;

/// Wait until the play holding `slot` has finished, aborted or not
async fn slot_released(slot: Option<watch::Receiver<()>>) {
    if let Some(mut slot) = slot {
        // Nothing is ever sent; this only returns once the guard is dropped
        while slot.changed().await.is_ok() {}
    }
}

struct Core {
    state: SchedulerState,
    sounds: Arc<[SoundDescriptor]>,
    config: PlaybackConfig,
    timer: Option<ScheduledTask>,
    current: Option<RenderHandle>,
    /// Closes once the play holding the slot has let go, fetch included
    slot: Option<watch::Receiver<()>>,
    /// Bumped by every stop/teardown; work started under an older epoch must not touch state
    epoch: u64,
}

impl Core {
    fn new() -> Self {
        Self {
            state: SchedulerState::Uninitialized,
            sounds: Arc::from(Vec::new()),
            config: PlaybackConfig::default(),
            timer: None,
            current: None,
            slot: None,
            epoch: 0,
        }
    }

    fn ensure_ready(&self) -> SchedulerResult<()> {
        if self.state == SchedulerState::Uninitialized {
            Err(SchedulerError::NotReady)
        } else {
            Ok(())
        }
    }

    fn mark_loaded(&mut self) {
        if self.state == SchedulerState::Uninitialized {
            self.state = SchedulerState::Stopped;
        }
    }
}

struct Inner {
    renderer: Arc<dyn AudioRenderer>,
    core: Mutex<Core>,
    rng: Mutex<StdRng>,
    next_task_id: AtomicU64,
}

/// Plays a random loaded sound every `cycle_duration ± cycle_delta`.
///
/// Cheap to clone; clones share the same state. At most one cycle is armed and at
/// most one sound renders at any time.
#[derive(Clone)]
pub struct SoundScheduler {
    inner: Arc<Inner>,
}

impl SoundScheduler {
    pub fn new(renderer: Arc<dyn AudioRenderer>) -> Self {
        Self::with_rng(renderer, StdRng::from_entropy())
    }

    /// Use a specific RNG, e.g. a seeded one for reproducible cycles
    pub fn with_rng(renderer: Arc<dyn AudioRenderer>, rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Inner {
                renderer,
                core: Mutex::new(Core::new()),
                rng: Mutex::new(rng),
                next_task_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn status(&self) -> SchedulerState {
        self.inner.core.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.status() == SchedulerState::Playing
    }

    /// True while a cycle is armed
    pub fn is_running(&self) -> bool {
        self.inner.core.lock().timer.is_some()
    }

    /// Delay the currently armed cycle was scheduled with
    pub fn pending_delay(&self) -> Option<Duration> {
        self.inner.core.lock().timer.as_ref().map(ScheduledTask::delay)
    }

    pub fn config(&self) -> PlaybackConfig {
        self.inner.core.lock().config
    }

    pub fn sound_ids(&self) -> Vec<String> {
        self.inner
            .core
            .lock()
            .sounds
            .iter()
            .map(|sound| sound.id.clone())
            .collect()
    }

    /// Validate and replace the whole sound list.
    ///
    /// Stops any playback first and waits until the render has been released.
    pub async fn load_sounds(&self, sounds: Vec<SoundDescriptor>) -> SchedulerResult<()> {
        let sounds = validate_sounds(sounds)?;

        self.stop().await;

        let count = sounds.len();
        {
            let mut core = self.inner.core.lock();
            core.sounds = Arc::from(sounds);
            core.mark_loaded();
        }
        info!(count, "Loaded sounds");
        Ok(())
    }

    /// Validate and replace the playback config, returning the normalized values.
    ///
    /// Stops any playback first and waits until the render has been released.
    pub async fn load_config(&self, input: PlaybackConfigInput) -> SchedulerResult<PlaybackConfig> {
        let config = input.validate()?;

        self.stop().await;

        {
            let mut core = self.inner.core.lock();
            core.config = config;
            core.mark_loaded();
        }
        info!(
            play_chance = config.play_chance,
            cycle_duration_ms = config.cycle_duration.as_millis() as u64,
            cycle_delta_ms = config.cycle_delta.as_millis() as u64,
            "Loaded playback config"
        );
        Ok(config)
    }

    /// Arm the first cycle after a random delay in `[0, 5000)` ms
    pub fn start(&self) -> SchedulerResult<StartOutcome> {
        let delay = random::initial_delay(&mut *self.inner.rng.lock());
        self.start_after(delay)
    }

    /// Arm the first cycle after `delay`. A no-op if a cycle is already armed.
    pub fn start_after(&self, delay: Duration) -> SchedulerResult<StartOutcome> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let mut core = self.inner.core.lock();
        core.ensure_ready()?;
        if core.timer.is_some() {
            debug!("Start requested while already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.inner.install_timer(&runtime, &mut core, delay, None);
        info!(delay_ms = delay.as_millis() as u64, "Starting sound cycles");
        Ok(StartOutcome::Scheduled { delay })
    }

    /// Cancel the armed cycle and halt the playing sound, if any.
    ///
    /// Resolves only after the render has been released. Always safe to call.
    pub async fn stop(&self) {
        self.inner.stop().await;
    }

    /// Play a uniformly random sound from the loaded list
    pub async fn play_random_sound(&self) -> SchedulerResult<PlayOutcome> {
        self.inner.play(None).await
    }

    /// Play the sound at `index` and wait for it to finish
    pub async fn play_sound(&self, index: usize) -> SchedulerResult<PlayOutcome> {
        self.inner.play(Some(index)).await
    }
}

impl Inner {
    /// Arm a new cycle, cancelling whatever was armed before.
    ///
    /// `replacing` is the id of the task doing the re-arm; it is left to finish.
    fn install_timer(
        self: &Arc<Self>,
        runtime: &Handle,
        core: &mut Core,
        delay: Duration,
        replacing: Option<u64>,
    ) {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let epoch = core.epoch;
        let cycle = Arc::clone(self).run_cycle(id, epoch);
        let task = ScheduledTask::spawn(runtime, id, delay, cycle);

        if let Some(previous) = core.timer.replace(task) {
            if Some(previous.id()) == replacing {
                previous.detach();
            } else {
                previous.cancel();
            }
        }
    }

    fn run_cycle(self: Arc<Self>, id: u64, epoch: u64) -> CycleFuture {
        Box::pin(async move {
            match self.cycle(epoch).await {
                Ok(()) => self.rearm(id, epoch),
                Err(err) => {
                    error!(error = %err, "Sound cycle failed, tearing the scheduler down");
                    self.teardown(id).await;
                }
            }
        })
    }

    /// One roll of the dice and, maybe, one sound
    async fn cycle(&self, epoch: u64) -> SchedulerResult<()> {
        let play_chance = {
            let core = self.core.lock();
            if core.epoch != epoch {
                return Ok(());
            }
            core.config.play_chance
        };

        let play = random::roll(&mut *self.rng.lock(), play_chance);
        if !play {
            debug!("Skipping this cycle");
            return Ok(());
        }

        match self.play(None).await {
            Ok(outcome) => {
                debug!(?outcome, "Cycle finished");
                Ok(())
            }
            Err(SchedulerError::EmptySoundList) => {
                warn!("Empty sound list: nothing to play this cycle");
                Ok(())
            }
            Err(SchedulerError::AlreadyPlaying) => {
                debug!("A sound is already playing, skipping this cycle");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn rearm(self: &Arc<Self>, id: u64, epoch: u64) {
        let config = self.core.lock().config;
        let delay = random::next_cycle_delay(&mut *self.rng.lock(), &config);

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(error = %err, "Lost the runtime, cannot arm the next cycle");
                return;
            }
        };

        let mut core = self.core.lock();
        let still_armed =
            core.epoch == epoch && core.timer.as_ref().map(ScheduledTask::id) == Some(id);
        if !still_armed {
            debug!("Stopped during the cycle, not re-arming");
            return;
        }

        self.install_timer(&runtime, &mut core, delay, Some(id));
        debug!(delay_ms = delay.as_millis() as u64, "Next sound cycle armed");
    }

    /// Claim the single playback slot for a sound
    fn begin_play(
        &self,
        index: Option<usize>,
    ) -> SchedulerResult<(SoundDescriptor, u64, SlotGuard)> {
        let mut core = self.core.lock();
        core.ensure_ready()?;

        let index = match index {
            Some(index) => index,
            None => random::pick_index(&mut *self.rng.lock(), core.sounds.len())
                .ok_or(SchedulerError::EmptySoundList)?,
        };
        let sound = core
            .sounds
            .get(index)
            .cloned()
            .ok_or(SchedulerError::NotFound(index))?;

        if core.state == SchedulerState::Playing {
            return Err(SchedulerError::AlreadyPlaying);
        }
        core.state = SchedulerState::Playing;
        let (guard, slot) = watch::channel(());
        core.slot = Some(slot);
        Ok((sound, core.epoch, guard))
    }

    async fn play(&self, index: Option<usize>) -> SchedulerResult<PlayOutcome> {
        let (sound, epoch, _slot) = self.begin_play(index)?;
        debug!(sound_id = %sound.id, "Playing sound");

        let result = self.render(&sound, epoch).await;
        self.release(epoch).await;

        if let Err(err) = &result {
            warn!(sound_id = %sound.id, error = %err, "Sound failed to play");
        }
        result
    }

    /// fetch -> check bytes -> decode and render -> wait for the end
    async fn render(&self, sound: &SoundDescriptor, epoch: u64) -> SchedulerResult<PlayOutcome> {
        let fetcher = match &sound.fetcher {
            Some(fetcher) if !sound.id.is_empty() => fetcher,
            _ => {
                return Err(SchedulerError::InvalidDescriptor {
                    id: sound.id.clone(),
                })
            }
        };

        let bytes = fetcher
            .fetch(&sound.id, &sound.extra)
            .await
            .map_err(|source| SchedulerError::Fetch {
                id: sound.id.clone(),
                source,
            })?;

        let superseded = self.core.lock().epoch != epoch;
        if superseded {
            debug!(sound_id = %sound.id, "Stopped while fetching, not rendering");
            return Ok(PlayOutcome::Halted);
        }
        if bytes.is_empty() {
            return Err(SchedulerError::EmptyPayload {
                id: sound.id.clone(),
            });
        }

        let handle = self.renderer.decode_and_play(bytes).await?;

        let superseded = {
            let mut core = self.core.lock();
            if core.epoch == epoch {
                core.current = Some(handle.clone());
                false
            } else {
                true
            }
        };
        if superseded {
            // Stopped while decoding
            handle.halt();
            handle.ended().await;
            return Ok(PlayOutcome::Halted);
        }

        match handle.ended().await {
            RenderOutcome::Completed => Ok(PlayOutcome::Completed),
            RenderOutcome::Halted => Ok(PlayOutcome::Halted),
            RenderOutcome::Failed(reason) => {
                Err(SchedulerError::Render(RenderError::Playback(reason)))
            }
        }
    }

    /// Give the playback slot back once a render is over
    async fn release(&self, epoch: u64) {
        let owned = {
            let mut core = self.core.lock();
            if core.epoch == epoch {
                core.current = None;
                core.slot = None;
                if core.state == SchedulerState::Playing {
                    core.state = SchedulerState::Stopped;
                }
                true
            } else {
                false
            }
        };

        if owned {
            if let Err(err) = self.renderer.suspend().await {
                warn!(error = %err, "Failed to suspend audio output");
            }
        }
    }

    async fn stop(&self) {
        let (timer, current, slot, epoch) = {
            let mut core = self.core.lock();
            core.epoch += 1;
            (
                core.timer.take(),
                core.current.take(),
                core.slot.take(),
                core.epoch,
            )
        };

        if let Some(timer) = timer {
            timer.cancel();
            debug!("Cancelled the pending cycle");
        }
        if let Some(handle) = current {
            handle.halt();
            let outcome = handle.ended().await;
            debug!(?outcome, "Halted the playing sound");
        }
        // A play still fetching or decoding holds the slot without a render
        slot_released(slot).await;
        if let Err(err) = self.renderer.suspend().await {
            warn!(error = %err, "Failed to suspend audio output");
        }

        let mut core = self.core.lock();
        if core.epoch == epoch && core.state == SchedulerState::Playing {
            core.state = SchedulerState::Stopped;
        }
    }

    /// Drop everything and go back to `Uninitialized`
    async fn teardown(&self, id: u64) {
        let (timer, current, slot, epoch) = {
            let mut core = self.core.lock();
            core.epoch += 1;
            (
                core.timer.take(),
                core.current.take(),
                core.slot.take(),
                core.epoch,
            )
        };

        if let Some(timer) = timer {
            if timer.id() == id {
                timer.detach();
            } else {
                timer.cancel();
            }
        }
        if let Some(handle) = current {
            handle.halt();
            handle.ended().await;
        }
        slot_released(slot).await;
        if let Err(err) = self.renderer.close().await {
            warn!(error = %err, "Failed to close audio output");
        }

        let mut core = self.core.lock();
        if core.epoch == epoch {
            core.state = SchedulerState::Uninitialized;
            core.sounds = Arc::from(Vec::new());
            core.config = PlaybackConfig::default();
            info!("Scheduler torn down; load a config or sounds to start again");
        }
    }
}
