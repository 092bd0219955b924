//! Upload job: every file waiting in the publish-pending folder is pushed to
//! the video host with the description staged on its Published row, the row is
//! stamped with the outcome, and the file is archived.

use crate::api::{FileStore, RemoteFile, Table, VideoHost};
use crate::config::Config;
use crate::rows::{
    PUBLISHED_DESC_COL, PUBLISHED_ID_COL, PUBLISHED_LINK_COL, PUBLISHED_STATUS_COL,
    PUBLISHED_TITLE_COL, PUBLISHED_UPLOAD_DATE_COL,
};
use crate::storage::{file_stem, Scratch};
use anyhow::{bail, Result};
use tracing::{error, info, warn};

pub struct PublishDeps<'a> {
    pub cfg: &'a Config,
    pub store: &'a dyn FileStore,
    pub published: &'a dyn Table,
    pub host: &'a dyn VideoHost,
}

async fn process_item(deps: &PublishDeps<'_>, file: &RemoteFile, scratch: &mut Scratch) -> Result<()> {
    let title = file_stem(&file.name);

    let Some(local) = deps.store.download(&file.id, &file.name).await else {
        bail!("download failed for {}", file.name);
    };
    scratch.track(local.clone());

    let Some(row) = deps.published.find_in_column(PUBLISHED_ID_COL, &file.id).await? else {
        warn!("{} has no row on the Published sheet, skipping", file.id);
        return Ok(());
    };

    let values = deps.published.all_values().await?;
    let description = values
        .get(row - 1)
        .and_then(|cells| cells.get(PUBLISHED_DESC_COL - 1))
        .cloned()
        .unwrap_or_default();

    let link = deps.host.upload_video(&local, &title, &description).await?;
    info!("{} Uploaded to youtube as {}", file.name, link);

    let today = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    deps.published.update_cell(row, PUBLISHED_UPLOAD_DATE_COL, &today).await?;
    deps.published.update_cell(row, PUBLISHED_LINK_COL, &link).await?;
    deps.published.update_cell(row, PUBLISHED_STATUS_COL, "Uploaded").await?;
    deps.published.update_cell(row, PUBLISHED_TITLE_COL, &title).await?;
    info!("Spreadsheet updated");

    deps.store.move_file(&file.id, &deps.cfg.folders.archive).await?;
    Ok(())
}

pub async fn run(deps: PublishDeps<'_>) -> Result<bool> {
    info!("*********************UPLOADING PENDING VIDEOS************************");

    let files = deps.store.list_children(&deps.cfg.folders.publish_pending).await?;

    for file in &files {
        let mut scratch = Scratch::new();
        if let Err(err) = process_item(&deps, file, &mut scratch).await {
            error!("Unexpected error uploading {}: {}", file.name, err);
        }
        scratch.remove_all().await;
    }

    info!("*************************PENDING VIDEOS UPLOADED*****************************");
    Ok(true)
}
