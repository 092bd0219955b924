use crate::error::ServiceResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub mod auth;
pub mod drive;
pub mod elevenlabs;
pub mod gmail;
pub mod openai;
pub mod sheets;
pub mod youtube;

/// A file owned by the remote storage service. Only the id is durable; local
/// copies are scoped scratch artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
}

/// One timestamped caption from the transcription model.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Remote file storage (Google Drive in production).
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Children of a folder; an empty folder yields an empty vec, not an error.
    async fn list_children(&self, folder_id: &str) -> ServiceResult<Vec<RemoteFile>>;

    /// Download into the local downloads directory under `dest_name`. Returns
    /// None on failure so per-item loops can skip and continue.
    async fn download(&self, file_id: &str, dest_name: &str) -> Option<PathBuf>;

    /// Resumable upload; returns the new remote file id.
    async fn upload(&self, local: &Path, folder_id: &str, mime_type: &str) -> ServiceResult<String>;

    /// Re-parent a file. Single-writer usage assumed.
    async fn move_file(&self, file_id: &str, target_folder_id: &str) -> ServiceResult<()>;

    /// Best-effort delete.
    async fn delete(&self, file_id: &str) -> bool;

    /// Best-effort anyone-with-link share; returns the public link.
    async fn make_public(&self, file_id: &str) -> Option<String>;
}

/// One worksheet of the state spreadsheet. All mutations are single-cell or
/// single-row; rows and columns are 1-indexed, row 1 is the header.
#[async_trait]
pub trait Table: Send + Sync {
    async fn all_values(&self) -> ServiceResult<Vec<Vec<String>>>;
    async fn update_cell(&self, row: usize, col: usize, value: &str) -> ServiceResult<()>;
    async fn append_row(&self, values: &[String]) -> ServiceResult<()>;
    async fn find_in_column(&self, col: usize, value: &str) -> ServiceResult<Option<usize>>;

    /// Re-resolve the row by key immediately before deleting it, so a stale
    /// row index can never delete the wrong row. Returns false when the key
    /// is no longer present.
    async fn delete_row_by_key(&self, col: usize, value: &str) -> ServiceResult<bool>;
}

/// The language-model text service.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> ServiceResult<String>;
}

/// The speech-synthesis service.
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    async fn synthesize(&self, text: &str) -> ServiceResult<Vec<u8>>;
}

/// The speech-to-text transcription model.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> ServiceResult<Vec<CaptionSegment>>;
}

/// The video hosting platform.
#[async_trait]
pub trait VideoHost: Send + Sync {
    async fn upload_video(
        &self,
        local: &Path,
        title: &str,
        description: &str,
    ) -> ServiceResult<String>;
}

/// Outbound email. Returns a bool rather than an error because the alert
/// path must never raise.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_message(&self, to: &str, subject: &str, body: &str) -> bool;
}
