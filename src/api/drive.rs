use crate::api::auth::TokenKeeper;
use crate::api::{FileStore, RemoteFile};
use crate::error::{ServiceError, ServiceResult};
use crate::retry::{retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{error, info, warn};

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
pub(crate) const UPLOAD_CHUNK: u64 = 8 * 1024 * 1024;

/// Content-Range header value for the chunk covering `[offset, end)`.
pub(crate) fn content_range(offset: u64, end: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", offset, end - 1, total)
}

/// Read one chunk from a seekable file so only a single chunk is resident
/// in memory at a time, however large the video is.
pub(crate) async fn read_chunk(
    file: &mut fs::File,
    offset: u64,
    len: usize,
) -> ServiceResult<Vec<u8>> {
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ParentList {
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

pub struct DriveClient {
    http: Client,
    auth: Arc<TokenKeeper>,
    download_dir: PathBuf,
    policy: RetryPolicy,
}

impl DriveClient {
    pub fn new(http: Client, auth: Arc<TokenKeeper>, download_dir: PathBuf) -> Self {
        DriveClient {
            http,
            auth,
            download_dir,
            policy: RetryPolicy::default(),
        }
    }

    async fn list_once(&self, folder_id: &str) -> ServiceResult<Vec<RemoteFile>> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .get(FILES_URL)
            .bearer_auth(&token)
            .query(&[
                ("q", format!("'{}' in parents", folder_id).as_str()),
                ("fields", "files(id, name)"),
            ])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        let list: FileList = resp.json().await?;
        Ok(list
            .files
            .into_iter()
            .map(|f| RemoteFile { id: f.id, name: f.name })
            .collect())
    }

    async fn download_once(&self, file_id: &str, dest: &Path) -> ServiceResult<PathBuf> {
        let token = self.auth.access_token().await?;
        let mut resp = self
            .http
            .get(format!("{}/{}", FILES_URL, file_id))
            .bearer_auth(&token)
            .query(&[("alt", "media")])
            .timeout(Duration::from_secs(600))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }

        let total = resp.content_length().unwrap_or(0);
        let mut file = fs::File::create(dest).await?;
        let mut received: u64 = 0;
        let mut last_logged_pct: u64 = 0;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            if total > 0 {
                let pct = received * 100 / total;
                if pct >= last_logged_pct + 25 {
                    info!("Download {}%", pct);
                    last_logged_pct = pct;
                }
            }
        }
        file.flush().await?;
        Ok(dest.to_path_buf())
    }

    async fn upload_once(
        &self,
        local: &Path,
        folder_id: &str,
        mime_type: &str,
    ) -> ServiceResult<String> {
        let token = self.auth.access_token().await?;
        let name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ServiceError::Resource(format!("bad file name: {}", local.display())))?;

        let metadata = serde_json::json!({"name": name, "parents": [folder_id]});
        let init = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(&token)
            .query(&[("uploadType", "resumable"), ("fields", "id")])
            .header("X-Upload-Content-Type", mime_type)
            .json(&metadata)
            .send()
            .await?;
        let status = init.status();
        if !status.is_success() {
            let body = init.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        let session = init
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::Data("resumable session missing location".into()))?;

        let mut file = fs::File::open(local).await?;
        let total = file.metadata().await?.len();
        // Chunk failures get their own retry budget before the whole upload
        // is retried with a fresh session.
        let chunk_policy = RetryPolicy { max_attempts: 3, ..self.policy };

        let mut created: Option<CreatedFile> = None;
        let mut offset: u64 = 0;
        while offset < total {
            let end = (offset + UPLOAD_CHUNK).min(total);
            let range = content_range(offset, end, total);
            let chunk = read_chunk(&mut file, offset, (end - offset) as usize).await?;
            let session_ref = &session;
            let range_ref = &range;
            let done = retry(chunk_policy, "drive upload chunk", || {
                let chunk = chunk.clone();
                async move {
                    let resp = self
                        .http
                        .put(session_ref)
                        .header("Content-Range", range_ref)
                        .header("Content-Type", mime_type)
                        .timeout(Duration::from_secs(600))
                        .body(chunk)
                        .send()
                        .await?;
                    let status = resp.status();
                    // 308 means the chunk landed and the session continues.
                    if status.as_u16() == 308 {
                        return Ok(None);
                    }
                    if status.is_success() {
                        let created: CreatedFile = resp.json().await?;
                        return Ok(Some(created));
                    }
                    let body = resp.text().await.unwrap_or_default();
                    Err(ServiceError::from_status(status, &body))
                }
            })
            .await?;

            offset = end;
            info!("Uploaded {}%", offset * 100 / total.max(1));
            if let Some(file) = done {
                created = Some(file);
            }
        }

        let id = created
            .map(|c| c.id)
            .ok_or_else(|| ServiceError::Data("upload finished without a file id".into()))?;
        info!("Upload complete {} -> {}", local.display(), id);
        Ok(id)
    }

    async fn move_once(&self, file_id: &str, target_folder_id: &str) -> ServiceResult<()> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .get(format!("{}/{}", FILES_URL, file_id))
            .bearer_auth(&token)
            .query(&[("fields", "parents")])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        let parents: ParentList = resp.json().await?;
        let previous = parents.parents.join(",");

        let resp = self
            .http
            .patch(format!("{}/{}", FILES_URL, file_id))
            .bearer_auth(&token)
            .query(&[
                ("addParents", target_folder_id),
                ("removeParents", previous.as_str()),
                ("fields", "id, parents"),
            ])
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        info!("Moved file {} to folder {}", file_id, target_folder_id);
        Ok(())
    }

    async fn delete_once(&self, file_id: &str) -> ServiceResult<()> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .delete(format!("{}/{}", FILES_URL, file_id))
            .bearer_auth(&token)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for DriveClient {
    async fn list_children(&self, folder_id: &str) -> ServiceResult<Vec<RemoteFile>> {
        retry(self.policy, "drive list", || self.list_once(folder_id)).await
    }

    async fn download(&self, file_id: &str, dest_name: &str) -> Option<PathBuf> {
        let dest = self.download_dir.join(dest_name);
        match retry(self.policy, "drive download", || self.download_once(file_id, &dest)).await {
            Ok(path) => {
                info!("Downloaded {}", dest_name);
                Some(path)
            }
            Err(err) => {
                error!("Failed to download {}: {}", dest_name, err);
                None
            }
        }
    }

    async fn upload(&self, local: &Path, folder_id: &str, mime_type: &str) -> ServiceResult<String> {
        retry(self.policy, "drive upload", || self.upload_once(local, folder_id, mime_type)).await
    }

    async fn move_file(&self, file_id: &str, target_folder_id: &str) -> ServiceResult<()> {
        retry(self.policy, "drive move", || self.move_once(file_id, target_folder_id)).await
    }

    async fn delete(&self, file_id: &str) -> bool {
        match retry(self.policy, "drive delete", || self.delete_once(file_id)).await {
            Ok(()) => {
                info!("Deleted file with ID {}", file_id);
                true
            }
            Err(err) => {
                error!("Could not delete file {}: {}", file_id, err);
                false
            }
        }
    }

    async fn make_public(&self, file_id: &str) -> Option<String> {
        let result = retry(self.policy, "drive share", || async {
            let token = self.auth.access_token().await?;
            let resp = self
                .http
                .post(format!("{}/{}/permissions", FILES_URL, file_id))
                .bearer_auth(&token)
                .json(&serde_json::json!({"role": "reader", "type": "anyone"}))
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ServiceError::from_status(status, &body));
            }
            Ok(())
        })
        .await;

        match result {
            Ok(()) => {
                let link = format!("https://drive.google.com/file/d/{}/view?usp=sharing", file_id);
                info!("Public link created for file {}: {}", file_id, link);
                Some(link)
            }
            Err(err) => {
                warn!("Failed to make file public {}: {}", file_id, err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_covers_the_exact_byte_span() {
        assert_eq!(content_range(0, 10, 10), "bytes 0-9/10");

        let total = UPLOAD_CHUNK * 2 + 5;
        assert_eq!(
            content_range(0, UPLOAD_CHUNK, total),
            format!("bytes 0-{}/{}", UPLOAD_CHUNK - 1, total)
        );
        // The final short chunk ends on the last byte of the file.
        assert_eq!(
            content_range(UPLOAD_CHUNK * 2, total, total),
            format!("bytes {}-{}/{}", UPLOAD_CHUNK * 2, total - 1, total)
        );
    }

    #[tokio::test]
    async fn read_chunk_returns_the_requested_span() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.bin");
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        fs::write(&path, &data).await.unwrap();

        let mut file = fs::File::open(&path).await.unwrap();
        let chunk = read_chunk(&mut file, 300, 400).await.unwrap();
        assert_eq!(chunk, &data[300..700]);

        // Chunks can be read out of order; the session retry path rewinds.
        let chunk = read_chunk(&mut file, 0, 10).await.unwrap();
        assert_eq!(chunk, &data[0..10]);
    }
}
