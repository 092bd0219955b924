use crate::api::auth::TokenKeeper;
use crate::api::Mailer;
use crate::error::{ServiceError, ServiceResult};
use crate::retry::{retry, RetryPolicy};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

const SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: String,
}

pub struct GmailClient {
    http: Client,
    auth: Arc<TokenKeeper>,
    sender: String,
    policy: RetryPolicy,
}

impl GmailClient {
    pub fn new(http: Client, auth: Arc<TokenKeeper>, sender: &str) -> Self {
        GmailClient {
            http,
            auth,
            sender: sender.to_string(),
            policy: RetryPolicy::default(),
        }
    }

    fn encode_message(&self, to: &str, subject: &str, body: &str) -> String {
        let raw = format!(
            "To: {}\r\nFrom: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=\"utf-8\"\r\n\r\n{}",
            to, self.sender, subject, body
        );
        URL_SAFE.encode(raw.as_bytes())
    }

    async fn send_once(&self, raw: &str) -> ServiceResult<String> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .post(SEND_URL)
            .bearer_auth(&token)
            .json(&serde_json::json!({"raw": raw}))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        let sent: SendResponse = resp.json().await?;
        Ok(sent.id)
    }
}

#[async_trait]
impl Mailer for GmailClient {
    async fn send_message(&self, to: &str, subject: &str, body: &str) -> bool {
        // A distribution list is a comma-separated header; validate each
        // address before spending any quota.
        let all_valid = to
            .split(',')
            .map(str::trim)
            .all(|addr| ADDRESS_RE.is_match(addr));
        if !all_valid {
            warn!("{} is not a valid address list - email not sent", to);
            return false;
        }

        let raw = self.encode_message(to, subject, body);
        match retry(self.policy, "gmail send", || self.send_once(&raw)).await {
            Ok(id) => {
                info!("Email sent to {}, Message ID: {}", to, id);
                true
            }
            Err(err) => {
                // Never error-level: an ERROR record here would feed the
                // alert mailer that is already failing.
                warn!("Failed to send email to {}: {}", to, err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validation() {
        assert!(ADDRESS_RE.is_match("user@example.com"));
        assert!(!ADDRESS_RE.is_match("not-an-address"));
        assert!(!ADDRESS_RE.is_match("two@@example.com"));
    }
}
