use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Static name -> id table for the remote storage folders. Folder ids are
/// configured, never discovered dynamically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveFolders {
    /// "1. Add Audio" - generated narration lands here for editing.
    pub add_audio: String,
    /// "1.1. MUSIC FILES" - background tracks.
    pub music: String,
    /// "1.2. VIDEO FILES" - stock clips for assembly.
    pub stock_videos: String,
    /// "2. Content to Send Off" - assembled videos awaiting curation.
    pub content_to_send: String,
    /// "4. Publish to Youtube" - approved videos awaiting upload.
    pub publish_pending: String,
    /// "X. ARCHIVE CONTENT" - terminal location for consumed assets.
    pub archive: String,
    /// User-submitted raw videos to be reformatted into stock clips.
    pub user_videos: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub openai_key: String,
    pub elevenlabs_key: String,
    #[serde(default = "default_voice_id")]
    pub eleven_voice_id: String,
    #[serde(default = "default_model_id")]
    pub eleven_model_id: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    pub spreadsheet_id: String,
    pub folders: DriveFolders,
    /// Chapter number (1..3) -> source document file id.
    pub chapters: HashMap<u8, String>,
    pub admin_emails: Vec<String>,
    /// Address the Gmail client sends alerts from.
    #[serde(default = "default_sender")]
    pub alert_sender: String,

    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: PathBuf,
}

fn default_voice_id() -> String {
    "bwBMii6YyaA3YprSpbXH".to_string()
}

fn default_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_sender() -> String {
    "me".to_string()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("localStorage")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("Logging/automationLogs")
}

fn default_credentials_dir() -> PathBuf {
    PathBuf::from("config/credentials")
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)?;

        if config.openai_key.is_empty() {
            anyhow::bail!("config.json: openai_key missing");
        }
        if config.elevenlabs_key.is_empty() {
            anyhow::bail!("config.json: elevenlabs_key missing");
        }
        if config.spreadsheet_id.is_empty() {
            anyhow::bail!("config.json: spreadsheet_id missing");
        }

        Ok(config)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.storage_root.join("downloads")
    }

    pub fn audio_drafts_dir(&self) -> PathBuf {
        self.storage_root.join("audioDrafts")
    }

    pub fn converted_videos_dir(&self) -> PathBuf {
        self.storage_root.join("convertedVideos")
    }

    pub fn upload_videos_dir(&self) -> PathBuf {
        self.storage_root.join("uploadVideos")
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.storage_root.join("videos")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_keys() {
        let raw = serde_json::json!({
            "openai_key": "sk-test",
            "elevenlabs_key": "el-test",
            "spreadsheet_id": "sheet-1",
            "folders": {
                "add_audio": "a", "music": "b", "stock_videos": "c",
                "content_to_send": "d", "publish_pending": "e",
                "archive": "f", "user_videos": "g"
            },
            "chapters": {"1": "doc-1", "2": "doc-2", "3": "doc-3"},
            "admin_emails": ["admin@example.com"]
        });
        let cfg: Config = serde_json::from_value(raw).unwrap();
        assert_eq!(cfg.openai_model, "gpt-4o-mini");
        assert_eq!(cfg.storage_root, PathBuf::from("localStorage"));
        assert_eq!(cfg.downloads_dir(), PathBuf::from("localStorage/downloads"));
        assert_eq!(cfg.chapters.get(&2).unwrap(), "doc-2");
    }
}
