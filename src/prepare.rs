//! Publish preparation: walks the Active Scripts sheet, and for each script
//! with a decided publish flag either stages it for upload (description
//! drafting, Published row, move to the pending folder) or discards it.
//! Undecided rows are left alone.

use crate::api::{ChatModel, FileStore, Table};
use crate::config::Config;
use crate::retry::{retry, RetryPolicy};
use crate::rows::{data_rows, PublishFlag, PublishedRecord, ScriptRecord, SCRIPT_ID_COL};
use anyhow::Result;
use tracing::{error, info, warn};

pub struct PrepareDeps<'a> {
    pub cfg: &'a Config,
    pub scripts: &'a dyn Table,
    pub published: &'a dyn Table,
    pub store: &'a dyn FileStore,
    pub chat: &'a dyn ChatModel,
}

fn describe_prompt(script: &str) -> String {
    format!(
        "Could you generate a one paragraph description for a youtube video \
         using the attached script, this is an automated process so the answer \
         should just be the description. The script is here: {}",
        script
    )
}

fn cleanup_prompt(description: &str) -> String {
    format!(
        "Could you please remove any extra text from the attached description \
         of a youtube video, the result should only be the one paragraph \
         description and no other text. The paragraph is here: {}",
        description
    )
}

/// Two chained model calls: draft a description, then strip any surrounding
/// chatter so only the paragraph remains. Empty scripts get no description.
async fn draft_description(chat: &dyn ChatModel, script: &str) -> String {
    if script.trim().is_empty() {
        return String::new();
    }
    let policy = RetryPolicy::default();

    let draft = match retry(policy, "description draft", || {
        let prompt = describe_prompt(script);
        async move { chat.complete(&prompt).await }
    })
    .await
    {
        Ok(draft) => draft,
        Err(err) => {
            warn!("Could not draft a description: {}", err);
            return String::new();
        }
    };

    match retry(policy, "description cleanup", || {
        let prompt = cleanup_prompt(&draft);
        async move { chat.complete(&prompt).await }
    })
    .await
    {
        Ok(cleaned) => cleaned,
        Err(err) => {
            warn!("Could not clean up the description: {}", err);
            String::new()
        }
    }
}

async fn stage_for_publish(deps: &PrepareDeps<'_>, record: &ScriptRecord) -> Result<()> {
    deps.store
        .move_file(&record.id, &deps.cfg.folders.publish_pending)
        .await?;

    let description = draft_description(deps.chat, &record.script).await;

    let today = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let entry = PublishedRecord::awaiting_upload(
        &record.id,
        &record.feedback,
        &record.content_type,
        &record.script,
        &description,
        &today,
    );
    deps.published.append_row(&entry.to_row()).await?;
    Ok(())
}

async fn remove_script_row(deps: &PrepareDeps<'_>, id: &str) -> Result<()> {
    info!("Updating the scripts spreadsheet");
    if deps.scripts.delete_row_by_key(SCRIPT_ID_COL, id).await? {
        info!("{} removed from scripts", id);
    } else {
        warn!("{} is not present in the script", id);
    }
    Ok(())
}

pub async fn run(deps: PrepareDeps<'_>) -> Result<bool> {
    info!("************************PREPARING VIDEOS*************************");

    let values = deps.scripts.all_values().await?;
    let (header, rows) = data_rows(&values);

    // Decisions are collected before any mutation so row deletions cannot
    // shift unvisited rows.
    let records: Vec<ScriptRecord> = rows
        .iter()
        .map(|(row, values)| ScriptRecord::from_values(*row, &header, values))
        .collect();

    for record in &records {
        let outcome = match &record.publish {
            PublishFlag::Yes => {
                if let Err(err) = stage_for_publish(&deps, record).await {
                    Err(err)
                } else {
                    remove_script_row(&deps, &record.id).await
                }
            }
            PublishFlag::No => {
                let removed = remove_script_row(&deps, &record.id).await;
                if !deps.store.delete(&record.id).await {
                    warn!("Could not delete remote file {}", record.id);
                }
                removed
            }
            PublishFlag::Pending(_) => continue,
        };
        if let Err(err) = outcome {
            error!("Could not process script {}: {}", record.id, err);
        }
    }

    info!("***********************VIDEOS PREPARED*********************");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_embed_the_text() {
        assert!(describe_prompt("hello world").ends_with("hello world"));
        assert!(cleanup_prompt("a paragraph").ends_with("a paragraph"));
    }
}
