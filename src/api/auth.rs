use crate::error::{ServiceError, ServiceResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{info, warn};

const OOB_REDIRECT: &str = "urn:ietf:wg:oauth:2.0:oob";

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Persisted authorization state for one Google service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl StoredToken {
    fn is_fresh(&self) -> bool {
        match self.expiry {
            Some(expiry) => expiry > Utc::now() + Duration::seconds(60),
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClientSecrets {
    installed: InstalledSecrets,
}

#[derive(Debug, Deserialize)]
struct InstalledSecrets {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_auth_uri")]
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

enum AuthState {
    Unchecked,
    Ready(StoredToken),
    /// Authorization failed once this process; every later call reports the
    /// same Auth error instead of re-running the flow or crashing.
    Failed(String),
}

/// Lazily establishes and persists an authorization token, refreshing it
/// silently when expired and falling back to a console consent flow when the
/// refresh is impossible.
pub struct TokenKeeper {
    http: reqwest::Client,
    token_path: PathBuf,
    secrets_path: PathBuf,
    scope: String,
    state: Mutex<AuthState>,
}

impl TokenKeeper {
    pub fn new(
        http: reqwest::Client,
        token_path: PathBuf,
        secrets_path: PathBuf,
        scope: &str,
    ) -> Self {
        TokenKeeper {
            http,
            token_path,
            secrets_path,
            scope: scope.to_string(),
            state: Mutex::new(AuthState::Unchecked),
        }
    }

    /// A bearer token valid for at least the next minute.
    pub async fn access_token(&self) -> ServiceResult<String> {
        let mut state = self.state.lock().await;
        match &*state {
            AuthState::Ready(token) if token.is_fresh() => return Ok(token.access_token.clone()),
            AuthState::Failed(msg) => return Err(ServiceError::Auth(msg.clone())),
            _ => {}
        }

        match self.establish().await {
            Ok(token) => {
                let access = token.access_token.clone();
                *state = AuthState::Ready(token);
                Ok(access)
            }
            Err(err) => {
                let msg = err.to_string();
                *state = AuthState::Failed(msg.clone());
                Err(ServiceError::Auth(msg))
            }
        }
    }

    async fn establish(&self) -> ServiceResult<StoredToken> {
        if let Some(token) = self.load_persisted().await {
            if token.is_fresh() {
                return Ok(token);
            }
            if token.refresh_token.is_some() {
                match self.refresh(&token).await {
                    Ok(refreshed) => {
                        info!("Token refreshed successfully: {}", self.token_path.display());
                        self.persist(&refreshed).await?;
                        return Ok(refreshed);
                    }
                    Err(err) => {
                        warn!("Token refresh failed ({}), starting manual authorization", err)
                    }
                }
            }
        } else {
            warn!(
                "No valid token at {}, starting manual authorization",
                self.token_path.display()
            );
        }

        let token = self.authorize_interactive().await?;
        self.persist(&token).await?;
        info!("Authorization complete, new token saved");
        Ok(token)
    }

    async fn load_persisted(&self) -> Option<StoredToken> {
        let raw = fs::read_to_string(&self.token_path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(err) => {
                warn!("Ignoring unreadable token file {}: {}", self.token_path.display(), err);
                None
            }
        }
    }

    async fn persist(&self, token: &StoredToken) -> ServiceResult<()> {
        if let Some(parent) = self.token_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.token_path, serde_json::to_vec_pretty(token)?).await?;
        Ok(())
    }

    async fn refresh(&self, token: &StoredToken) -> ServiceResult<StoredToken> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| ServiceError::Auth("no refresh token".into()))?;
        let params = [
            ("client_id", token.client_id.as_str()),
            ("client_secret", token.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let resp = self.http.post(&token.token_uri).form(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        let fresh: TokenResponse = resp.json().await?;
        Ok(StoredToken {
            access_token: fresh.access_token,
            refresh_token: fresh.refresh_token.or_else(|| token.refresh_token.clone()),
            expiry: fresh.expires_in.map(|s| Utc::now() + Duration::seconds(s)),
            client_id: token.client_id.clone(),
            client_secret: token.client_secret.clone(),
            token_uri: token.token_uri.clone(),
        })
    }

    /// Console consent flow: print the authorization URL, read the code from
    /// stdin, exchange it for a token.
    async fn authorize_interactive(&self) -> ServiceResult<StoredToken> {
        let raw = fs::read_to_string(&self.secrets_path).await.map_err(|err| {
            ServiceError::Auth(format!(
                "missing client secrets {}: {}",
                self.secrets_path.display(),
                err
            ))
        })?;
        let secrets: ClientSecrets =
            serde_json::from_str(&raw).map_err(|err| ServiceError::Auth(err.to_string()))?;
        let installed = secrets.installed;

        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            installed.auth_uri, installed.client_id, OOB_REDIRECT, self.scope
        );
        eprintln!("Authorize this application by visiting:\n  {}", auth_url);
        eprintln!("Paste the authorization code here and press enter:");

        let mut code = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut code)
            .await
            .map_err(|err| ServiceError::Auth(format!("could not read consent code: {}", err)))?;
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::Auth("empty consent code".into()));
        }

        let params = [
            ("code", code),
            ("client_id", installed.client_id.as_str()),
            ("client_secret", installed.client_secret.as_str()),
            ("redirect_uri", OOB_REDIRECT),
            ("grant_type", "authorization_code"),
        ];
        let resp = self.http.post(&installed.token_uri).form(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Auth(format!("code exchange failed: HTTP {} {}", status, body)));
        }
        let granted: TokenResponse = resp.json().await?;

        Ok(StoredToken {
            access_token: granted.access_token,
            refresh_token: granted.refresh_token,
            expiry: granted.expires_in.map(|s| Utc::now() + Duration::seconds(s)),
            client_id: installed.client_id,
            client_secret: installed.client_secret,
            token_uri: installed.token_uri,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_without_expiry_counts_as_fresh() {
        let token = StoredToken {
            access_token: "t".into(),
            refresh_token: None,
            expiry: None,
            client_id: "c".into(),
            client_secret: "s".into(),
            token_uri: default_token_uri(),
        };
        assert!(token.is_fresh());
    }

    #[test]
    fn stored_token_survives_json_persistence() {
        let token = StoredToken {
            access_token: "t".into(),
            refresh_token: Some("r".into()),
            expiry: Some(Utc::now() + Duration::hours(1)),
            client_id: "c".into(),
            client_secret: "s".into(),
            token_uri: default_token_uri(),
        };
        let raw = serde_json::to_string(&token).unwrap();
        let restored: StoredToken = serde_json::from_str(&raw).unwrap();
        assert_eq!(restored.expiry, token.expiry);
        assert_eq!(restored.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn expired_token_is_stale() {
        let token = StoredToken {
            access_token: "t".into(),
            refresh_token: Some("r".into()),
            expiry: Some(Utc::now() - Duration::minutes(5)),
            client_id: "c".into(),
            client_secret: "s".into(),
            token_uri: default_token_uri(),
        };
        assert!(!token.is_fresh());
    }
}
