use crate::api::{CaptionSegment, ChatModel, Transcriber};
use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const TRANSCRIBE_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    segments: Vec<TranscriptionSegment>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionSegment {
    start: f64,
    end: f64,
    text: String,
}

pub struct OpenAiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(http: Client, api_key: &str, model: &str) -> Self {
        OpenAiClient {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, prompt: &str) -> ServiceResult<String> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .http
            .post(CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(300))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let snippet = raw.chars().take(400).collect::<String>();
            return Err(ServiceError::from_status(status, &snippet));
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ServiceError::Data("chat completion had no choices".into()))
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, audio: &Path) -> ServiceResult<Vec<CaptionSegment>> {
        let bytes = fs::read(audio).await?;
        let name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();
        let part = multipart::Part::bytes(bytes)
            .file_name(name)
            .mime_str("audio/mpeg")
            .map_err(|err| ServiceError::Data(err.to_string()))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("model", "whisper-1")
            .text("response_format", "verbose_json");

        let resp = self
            .http
            .post(TRANSCRIBE_URL)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .timeout(Duration::from_secs(600))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let snippet = raw.chars().take(400).collect::<String>();
            return Err(ServiceError::from_status(status, &snippet));
        }

        let parsed: TranscriptionResponse = resp.json().await?;
        Ok(parsed
            .segments
            .into_iter()
            .map(|s| CaptionSegment {
                start: s.start,
                end: s.end,
                text: s.text.trim().to_string(),
            })
            .collect())
    }
}
