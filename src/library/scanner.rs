use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::db::models::FileBlob;

/// Supported audio file extensions and the MIME type reported for each
const SUPPORTED_EXTENSIONS: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("flac", "audio/flac"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/wav"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("opus", "audio/opus"),
];

/// MIME type for a supported audio file, `None` for anything else
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .find(|(supported, _)| *supported == ext)
        .map(|(_, mime)| *mime)
}

/// Scanner for finding audio files in a directory tree
pub struct DirectoryScanner;

impl DirectoryScanner {
    /// Scan a directory recursively and return all audio file paths, sorted
    pub fn scan<P: AsRef<Path>>(directory: P) -> Result<Vec<PathBuf>, anyhow::Error> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            anyhow::bail!("{} is not a directory", directory.display());
        }

        let mut audio_files = Vec::new();
        for entry in WalkDir::new(directory)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();

            // Skip directories
            if !path.is_file() {
                continue;
            }

            if mime_type_for(path).is_some() {
                audio_files.push(path.to_path_buf());
            }
        }

        debug!(directory = %directory.display(), count = audio_files.len(), "Scanned for audio files");
        Ok(audio_files)
    }

    /// Read one audio file into a blob with its file-picker metadata
    pub fn load_file(path: &Path) -> Result<FileBlob, anyhow::Error> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut blob = FileBlob::new(name, bytes);
        if let Some(mime) = mime_type_for(path) {
            blob = blob.with_mime_type(mime);
        }
        if let Some(modified) = modified_millis(path) {
            blob = blob.with_last_modified(modified);
        }
        Ok(blob)
    }

    /// Scan `directory` and load every audio file found.
    ///
    /// Unreadable files are skipped with a warning.
    pub fn load_directory<P: AsRef<Path>>(directory: P) -> Result<Vec<FileBlob>, anyhow::Error> {
        let mut blobs = Vec::new();
        for path in Self::scan(directory)? {
            match Self::load_file(&path) {
                Ok(blob) => blobs.push(blob),
                Err(e) => warn!(error = %e, "Skipping unreadable audio file"),
            }
        }
        Ok(blobs)
    }
}

/// Modification time truncated to whole milliseconds, as the store keeps it
fn modified_millis(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    DateTime::<Utc>::from_timestamp_millis(DateTime::<Utc>::from(modified).timestamp_millis())
}
