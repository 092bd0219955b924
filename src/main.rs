use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use wellcast::api::auth::TokenKeeper;
use wellcast::api::Mailer;
use wellcast::api::drive::DriveClient;
use wellcast::api::elevenlabs::ElevenLabsClient;
use wellcast::api::gmail::GmailClient;
use wellcast::api::openai::OpenAiClient;
use wellcast::api::sheets::SheetsClient;
use wellcast::api::youtube::YouTubeClient;
use wellcast::config::Config;
use wellcast::{edit, generate, logging, prepare, publish, reformat, storage, unsubscribe};

const DRIVE_SHEETS_SCOPE: &str =
    "https://www.googleapis.com/auth/drive https://www.googleapis.com/auth/spreadsheets";
const GMAIL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";
const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

const JOBS: &[&str] = &[
    "generate-content",
    "edit-content",
    "prepare-videos",
    "upload-videos",
    "reformat-videos",
    "unsubscribe",
];

#[tokio::main]
async fn main() -> Result<()> {
    let job = match std::env::args().nth(1) {
        Some(job) if JOBS.contains(&job.as_str()) => job,
        Some(other) => bail!("unknown job '{}', expected one of: {}", other, JOBS.join(", ")),
        None => bail!("usage: wellcast <{}>", JOBS.join("|")),
    };

    let cfg = Config::load("config.json").await?;
    let alerts = logging::init(&job, &cfg.log_dir)?;

    storage::ensure_directories(&cfg.storage_root).await?;
    if !storage::check_ffmpeg().await {
        warn!("ffmpeg not found in PATH, video jobs will fail");
    }

    let http = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .context("Failed to build the HTTP client")?;

    let creds = cfg.credentials_dir.clone();
    let drive_auth = Arc::new(TokenKeeper::new(
        http.clone(),
        creds.join("token.json"),
        creds.join("credentialsDrive.json"),
        DRIVE_SHEETS_SCOPE,
    ));
    let gmail_auth = Arc::new(TokenKeeper::new(
        http.clone(),
        creds.join("tokenGmail.json"),
        creds.join("credentialsGmail.json"),
        GMAIL_SCOPE,
    ));
    let youtube_auth = Arc::new(TokenKeeper::new(
        http.clone(),
        creds.join("tokenYoutube.json"),
        creds.join("credentialsYoutube.json"),
        YOUTUBE_SCOPE,
    ));

    let drive = DriveClient::new(http.clone(), Arc::clone(&drive_auth), cfg.downloads_dir());
    let sheets = SheetsClient::new(http.clone(), Arc::clone(&drive_auth), &cfg.spreadsheet_id);
    let themes = sheets.worksheet("Content Themes");
    let scripts = sheets.worksheet("Active Scripts");
    let published = sheets.worksheet("Published");
    let production = sheets.worksheet("Production");
    let unsub_requests = sheets.worksheet("Form Responses");
    let unsub_archive = sheets.worksheet("Form Archive");
    let contacts = sheets.worksheet("Contact List");

    let openai = OpenAiClient::new(http.clone(), &cfg.openai_key, &cfg.openai_model);
    let eleven = ElevenLabsClient::new(
        http.clone(),
        &cfg.elevenlabs_key,
        &cfg.eleven_voice_id,
        &cfg.eleven_model_id,
    );
    let youtube = YouTubeClient::new(http.clone(), youtube_auth);
    let gmail: Arc<dyn Mailer> =
        Arc::new(GmailClient::new(http.clone(), gmail_auth, &cfg.alert_sender));

    // Error records are mailed to the admins one by one as they are emitted,
    // not batched until the end of the run.
    let (stop_alerts, alerts_stopped) = oneshot::channel();
    let alert_task = tokio::spawn(logging::forward_alerts(
        Arc::clone(&gmail),
        cfg.admin_emails.clone(),
        job.clone(),
        alerts,
        alerts_stopped,
    ));

    let outcome = match job.as_str() {
        "generate-content" => {
            generate::run(generate::GenerateDeps {
                cfg: &cfg,
                themes: &themes,
                production: &production,
                store: &drive,
                chat: &openai,
                speech: &eleven,
            })
            .await
        }
        "edit-content" => {
            edit::run(edit::EditDeps {
                cfg: &cfg,
                store: &drive,
                production: &production,
                transcriber: &openai,
            })
            .await
        }
        "prepare-videos" => {
            prepare::run(prepare::PrepareDeps {
                cfg: &cfg,
                scripts: &scripts,
                published: &published,
                store: &drive,
                chat: &openai,
            })
            .await
        }
        "upload-videos" => {
            publish::run(publish::PublishDeps {
                cfg: &cfg,
                store: &drive,
                published: &published,
                host: &youtube,
            })
            .await
        }
        "reformat-videos" => {
            reformat::run(reformat::ReformatDeps { cfg: &cfg, store: &drive }).await
        }
        "unsubscribe" => {
            unsubscribe::run(unsubscribe::UnsubDeps {
                requests: &unsub_requests,
                archive: &unsub_archive,
                contacts: &contacts,
            })
            .await
        }
        _ => unreachable!(),
    };

    match outcome {
        Ok(true) => info!("{} finished", job),
        Ok(false) => error!("{} aborted, see the log for details", job),
        Err(err) => error!("{} failed: {:#}", job, err),
    }

    // Let the mailer drain any alert still in flight before exiting.
    let _ = stop_alerts.send(());
    let _ = alert_task.await;
    Ok(())
}
