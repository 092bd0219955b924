use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

const STORAGE_SUBDIRS: &[&str] = &[
    "downloads",
    "audioDrafts",
    "convertedVideos",
    "uploadVideos",
    "videos",
];

/// Create the fixed local scratch layout under the storage root.
pub async fn ensure_directories(root: &Path) -> Result<()> {
    for sub in STORAGE_SUBDIRS {
        let dir = root.join(sub);
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::info!("Created directory: {}", dir.display());
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Per-item scratch file tracker. Every local artifact a job creates is
/// registered here and removed when the item finishes, success or not.
#[derive(Debug, Default)]
pub struct Scratch {
    files: Vec<PathBuf>,
}

impl Scratch {
    pub fn new() -> Self {
        Scratch::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    /// Best-effort removal of everything tracked. Missing files are fine.
    pub async fn remove_all(&mut self) {
        for path in self.files.drain(..) {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!("Could not remove scratch file {}: {}", path.display(), err),
            }
        }
    }
}

pub fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string()
}

pub fn has_extension(name: &str, allowed: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            allowed.iter().any(|a| a.trim_start_matches('.') == lower)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_extension("Morning Calm.MP3", &[".mp3"]));
        assert!(has_extension("video.mp4", &["mp4", "mkv"]));
        assert!(!has_extension("notes.txt", &[".mp3"]));
        assert!(!has_extension("noext", &[".mp3"]));
    }

    #[test]
    fn stem_strips_one_extension() {
        assert_eq!(file_stem("Focus.mp3"), "Focus");
        assert_eq!(file_stem("plain"), "plain");
    }

    #[tokio::test]
    async fn scratch_ignores_missing_files() {
        let mut scratch = Scratch::new();
        scratch.track("/nonexistent/scratch/file.tmp");
        scratch.remove_all().await;
        assert!(scratch.files.is_empty());
    }
}
