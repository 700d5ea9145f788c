// Application state management
// One scheduler and one store, constructed together and handed to whoever drives them.

use anyhow::Context;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::audio::render::AudioRenderer;
use crate::db::models::AddedFile;
use crate::db::store::BucketStore;
use crate::library::{DirectoryScanner, StoreFetcher};
use crate::scheduler::types::{PlaybackConfig, PlaybackConfigInput};
use crate::scheduler::SoundScheduler;
use crate::settings::SoundboardSettings;

pub struct AppState {
    pub scheduler: SoundScheduler,
    pub store: Arc<BucketStore>,
    pub settings: Mutex<SoundboardSettings>,
    pub app_dir: PathBuf,
}

impl AppState {
    /// Load settings, open the store and hand the saved playback config to the scheduler
    pub async fn initialize(
        app_dir: impl Into<PathBuf>,
        renderer: Arc<dyn AudioRenderer>,
    ) -> anyhow::Result<Self> {
        let app_dir = app_dir.into();
        let settings = SoundboardSettings::load(&app_dir)?;

        let store = Arc::new(BucketStore::new(settings.database_location(&app_dir)));
        store
            .setup()
            .await
            .context("Failed to set up the sound library")?;

        let scheduler = SoundScheduler::new(renderer);
        scheduler
            .load_config(settings.playback)
            .await
            .context("Saved playback settings are invalid")?;

        info!(app_dir = %app_dir.display(), "Soundboard initialized");
        Ok(Self {
            scheduler,
            store,
            settings: Mutex::new(settings),
            app_dir,
        })
    }

    /// Store every audio file under `directory` in `bucket`
    pub async fn import_directory(
        &self,
        bucket: &str,
        directory: &Path,
    ) -> anyhow::Result<Vec<AddedFile>> {
        let directory = directory.to_path_buf();
        let files = tokio::task::spawn_blocking(move || DirectoryScanner::load_directory(directory))
            .await
            .context("Directory import task failed")??;

        let added = self
            .store
            .add_files_to_bucket(bucket, files, Vec::new())
            .await
            .with_context(|| format!("Failed to add files to bucket {}", bucket))?;
        Ok(added)
    }

    /// Replace the scheduler's sounds with the contents of `bucket`
    pub async fn load_bucket(&self, bucket: &str) -> anyhow::Result<usize> {
        let files = self
            .store
            .get_bucket_files(bucket)
            .await
            .with_context(|| format!("Failed to read bucket {}", bucket))?;

        let sounds = StoreFetcher::new(self.store.clone()).descriptors(&files);
        let count = sounds.len();
        self.scheduler.load_sounds(sounds).await?;

        info!(bucket, count, "Loaded bucket");
        Ok(count)
    }

    /// Apply a new playback config and persist it once accepted
    pub async fn update_playback(
        &self,
        input: PlaybackConfigInput,
    ) -> anyhow::Result<PlaybackConfig> {
        let config = self.scheduler.load_config(input).await?;

        let mut settings = self.settings.lock();
        settings.playback = input;
        settings.save(&self.app_dir)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use crate::scheduler::types::{PlayOutcome, SchedulerState};
    use crate::test_utils::ScriptedRenderer;
    use std::time::Duration;

    #[tokio::test]
    async fn test_import_load_and_play_a_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let sounds = dir.path().join("sounds");
        std::fs::create_dir_all(&sounds).unwrap();
        std::fs::write(sounds.join("owl.wav"), b"hoot").unwrap();
        std::fs::write(sounds.join("cricket.mp3"), b"chirp").unwrap();

        let renderer = ScriptedRenderer::new(Duration::ZERO);
        let state = AppState::initialize(dir.path().join("app"), renderer.clone())
            .await
            .unwrap();
        assert_eq!(state.scheduler.status(), SchedulerState::Stopped);

        let added = state.import_directory("night", &sounds).await.unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(state.load_bucket("night").await.unwrap(), 2);

        assert_eq!(
            state.scheduler.play_sound(0).await.unwrap(),
            PlayOutcome::Completed
        );
        assert_eq!(renderer.count("play:chirp") + renderer.count("play:hoot"), 1);
        assert!(dir.path().join("app").join("soundLibrary.db").exists());
    }

    #[tokio::test]
    async fn test_update_playback_validates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer::new(Duration::ZERO);
        let state = AppState::initialize(dir.path(), renderer).await.unwrap();

        let input = PlaybackConfigInput {
            play_chance: 0.5,
            cycle_duration_ms: 10_000.0,
            cycle_delta_ms: 2_000.0,
        };
        let config = state.update_playback(input).await.unwrap();
        assert_eq!(config.cycle_delta, Duration::from_secs(2));
        assert_eq!(SoundboardSettings::load(dir.path()).unwrap().playback, input);

        let bad = PlaybackConfigInput {
            play_chance: 2.0,
            ..input
        };
        let err = state.update_playback(bad).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SchedulerError>(),
            Some(SchedulerError::Validation(_))
        ));
        assert_eq!(SoundboardSettings::load(dir.path()).unwrap().playback, input);
    }
}
