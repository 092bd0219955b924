use crate::api::auth::TokenKeeper;
use crate::api::drive::{content_range, read_chunk, UPLOAD_CHUNK};
use crate::api::VideoHost;
use crate::error::{ServiceError, ServiceResult};
use crate::retry::{retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::info;

const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// People & Blogs.
const DEFAULT_CATEGORY: &str = "22";
const DEFAULT_PRIVACY: &str = "unlisted";

#[derive(Debug, Deserialize)]
struct InsertedVideo {
    id: String,
}

pub struct YouTubeClient {
    http: Client,
    auth: Arc<TokenKeeper>,
    policy: RetryPolicy,
}

impl YouTubeClient {
    pub fn new(http: Client, auth: Arc<TokenKeeper>) -> Self {
        YouTubeClient {
            http,
            auth,
            policy: RetryPolicy::default(),
        }
    }

    async fn upload_once(
        &self,
        local: &Path,
        title: &str,
        description: &str,
    ) -> ServiceResult<String> {
        let token = self.auth.access_token().await?;
        let metadata = serde_json::json!({
            "snippet": {
                "title": title,
                "description": description,
                "tags": [],
                "categoryId": DEFAULT_CATEGORY,
            },
            "status": {"privacyStatus": DEFAULT_PRIVACY},
        });

        let init = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(&token)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Type", "video/*")
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

        let mut inserted: Option<InsertedVideo> = None;
        let mut offset: u64 = 0;
        while offset < total {
            let end = (offset + UPLOAD_CHUNK).min(total);
            let range = content_range(offset, end, total);
            let chunk = read_chunk(&mut file, offset, (end - offset) as usize).await?;
            let session_ref = &session;
            let range_ref = &range;
            let done = retry(chunk_policy, "youtube upload chunk", || {
                let chunk = chunk.clone();
                async move {
                    let resp = self
                        .http
                        .put(session_ref)
                        .header("Content-Range", range_ref)
                        .header("Content-Type", "video/*")
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
                        let inserted: InsertedVideo = resp.json().await?;
                        return Ok(Some(inserted));
                    }
                    let body = resp.text().await.unwrap_or_default();
                    Err(ServiceError::from_status(status, &body))
                }
            })
            .await?;

            offset = end;
            info!("Uploaded {}%", offset * 100 / total.max(1));
            if let Some(video) = done {
                inserted = Some(video);
            }
        }

        let id = inserted
            .map(|v| v.id)
            .ok_or_else(|| ServiceError::Data("upload finished without a video id".into()))?;
        let link = format!("https://youtu.be/{}", id);
        info!("Uploaded successfully: {}", link);
        Ok(link)
    }
}

#[async_trait]
impl VideoHost for YouTubeClient {
    async fn upload_video(
        &self,
        local: &Path,
        title: &str,
        description: &str,
    ) -> ServiceResult<String> {
        retry(self.policy, "youtube upload", || self.upload_once(local, title, description)).await
    }
}
