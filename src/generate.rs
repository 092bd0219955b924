//! Daily content generation: theme -> chapter text -> script -> narration
//! audio -> upload. Linear and fail-fast; an abort before the final stage
//! leaves the rotation state untouched so the whole run can be retried.

use crate::api::{ChatModel, FileStore, SpeechSynth, Table};
use crate::config::Config;
use crate::retry::{retry, RetryPolicy};
use crate::storage::Scratch;
use crate::themes;
use anyhow::Result;
use chrono::Local;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tracing::{error, info};

pub struct GenerateDeps<'a> {
    pub cfg: &'a Config,
    pub themes: &'a dyn Table,
    pub production: &'a dyn Table,
    pub store: &'a dyn FileStore,
    pub chat: &'a dyn ChatModel,
    pub speech: &'a dyn SpeechSynth,
}

/// Python-style capitalize: first letter upper, the rest lower.
fn capitalize(s: &str) -> String {
    let s = s.trim();
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Full text of the source document. PDFs go through pdftotext; anything
/// else is read as plain text.
async fn extract_document_text(path: &Path) -> Result<String> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if !is_pdf {
        return Ok(fs::read_to_string(path).await?);
    }

    let output = Command::new("pdftotext").arg(path).arg("-").output().await?;
    if !output.status.success() {
        anyhow::bail!("pdftotext failed for {}", path.display());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn draft_prompt(theme: &str, activity: Option<&str>, chapter_text: &str) -> String {
    match activity {
        None => format!(
            "Are you able to read the below text and create a 30 second to 1 minute text to \
             speech script about {}. The video should include an activity that relates to the \
             topic, preferably with reference to the text. This request is automated so it \
             would be great if you just return the script. The text is: {}",
            theme, chapter_text
        ),
        Some(activity) => format!(
            "Are you able to read the below text and create a 30 second to 1 minute text to \
             speech script about {}. The video should include an activity for the viewer based \
             around {}. This request is automated so it would be great if you just return the \
             script. The text is: {}",
            theme, activity, chapter_text
        ),
    }
}

fn cleanup_prompt(draft: &str) -> String {
    format!(
        "Could you please clean this script up to be entered directly into text-to-speech. \
         The result should just have the script with no directions, and please remove any \
         title if there is one. The script is: {}",
        draft
    )
}

pub async fn run(deps: GenerateDeps<'_>) -> Result<bool> {
    info!("*****************GENERATING CONTENT*********************");
    let policy = RetryPolicy::default();
    let mut scratch = Scratch::new();

    let (theme, row_count) = themes::select_active(deps.themes).await?;
    info!("(1/8) -> Theme selected: {}", theme.theme);

    let chapter_id = match deps.cfg.chapters.get(&theme.chapter) {
        Some(id) => id,
        None => {
            error!("No source document mapped for chapter {}", theme.chapter);
            return Ok(false);
        }
    };
    let chapter_path = match deps.store.download(chapter_id, "workingChapter.pdf").await {
        Some(path) => path,
        None => {
            error!("Could not download the chapter document");
            return Ok(false);
        }
    };
    scratch.track(chapter_path.clone());
    info!("(2/8) -> Successfully downloaded {}", chapter_path.display());

    let chapter_text = match extract_document_text(&chapter_path).await {
        Ok(text) => text,
        Err(err) => {
            error!("Unable to extract the chapter text: {}", err);
            return Ok(false);
        }
    };
    info!("(3/8) -> Chapter text successfully extracted");

    let prompt = draft_prompt(&theme.theme, theme.activity.as_deref(), &chapter_text);
    let draft = match retry(policy, "openai draft script", || deps.chat.complete(&prompt)).await {
        Ok(text) => text,
        Err(err) => {
            error!("Failed to generate draft script: {}", err);
            return Ok(false);
        }
    };
    info!("(4/8) -> Draft script successfully generated");

    let prompt = cleanup_prompt(&draft);
    let script = match retry(policy, "openai clean script", || deps.chat.complete(&prompt)).await {
        Ok(text) => text,
        Err(err) => {
            error!("Failed to generate edited script: {}", err);
            return Ok(false);
        }
    };
    info!("(5/8) -> Script successfully generated");

    let audio = match retry(policy, "elevenlabs synthesis", || deps.speech.synthesize(&script)).await
    {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Unable to get the audio from the speech service: {}", err);
            return Ok(false);
        }
    };
    info!("(6/8) -> Successfully created the audio");

    let audio_name = deps
        .cfg
        .audio_drafts_dir()
        .join(format!("{}.mp3", capitalize(&theme.theme)));
    if let Err(err) = fs::write(&audio_name, &audio).await {
        error!("Unable to save audio to local disk: {}", err);
        return Ok(false);
    }
    scratch.track(audio_name.clone());
    info!("(7/8) -> Successfully saved the audio to {}", audio_name.display());

    let audio_id = deps
        .store
        .upload(&audio_name, &deps.cfg.folders.add_audio, "audio/mpeg")
        .await?;
    info!("(8/8) -> Audio uploaded to remote storage");

    themes::advance(deps.themes, theme.row, row_count).await?;
    info!("Content themes spreadsheet updated");

    let today = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    deps.production
        .append_row(&[audio_id, script, today])
        .await?;

    scratch.remove_all().await;
    info!("*******************CONTENT SUCCESSFULLY GENERATED**********************");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalize_matches_sheet_naming() {
        assert_eq!(capitalize(" morning FOCUS "), "Morning focus");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn prompt_switches_on_activity() {
        let with = draft_prompt("Focus", Some("journaling"), "text");
        assert!(with.contains("based around journaling"));
        let without = draft_prompt("Focus", None, "text");
        assert!(without.contains("an activity that relates to the topic"));
    }
}
