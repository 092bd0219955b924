use crate::api::SpeechSynth;
use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub struct ElevenLabsClient {
    http: Client,
    api_key: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsClient {
    pub fn new(http: Client, api_key: &str, voice_id: &str, model_id: &str) -> Self {
        ElevenLabsClient {
            http,
            api_key: api_key.to_string(),
            voice_id: voice_id.to_string(),
            model_id: model_id.to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynth for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> ServiceResult<Vec<u8>> {
        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=mp3_44100_128",
            self.voice_id
        );

        let body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
        });

        let resp = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header("xi-api-key", &self.api_key)
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

        // The service streams the audio; collect the chunks into one payload.
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(ServiceError::Data("empty audio payload".into()));
        }
        Ok(bytes.to_vec())
    }
}
