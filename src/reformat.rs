//! Reformat job: user-submitted clips are normalized to mp4 and moved into the
//! stock-videos folder so the edit job can stitch them. Output names are
//! timestamp-unique, the remote original is removed afterwards.

use crate::api::{FileStore, RemoteFile};
use crate::config::Config;
use crate::ffmpeg;
use crate::storage::{has_extension, Scratch};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info};

const CONVERTIBLE: &[&str] = &[".mkv", ".avi", ".mov", ".flv", ".webm", ".wmv", ".m4v"];

pub struct ReformatDeps<'a> {
    pub cfg: &'a Config,
    pub store: &'a dyn FileStore,
}

/// Re-encode to mp4, or plain-copy when the source already is one.
async fn to_mp4(cfg: &Config, input: &Path, name: &str) -> Result<PathBuf> {
    let unique_id = chrono::Local::now().format("%Y%m%d%H%M%S%f").to_string();
    let output = cfg.converted_videos_dir().join(format!("{}.mp4", unique_id));

    if has_extension(name, CONVERTIBLE) {
        if !ffmpeg::convert_to_mp4(input, &output).await? {
            bail!("conversion failed for {}", input.display());
        }
        info!("Converted: {} -> {}", input.display(), output.display());
    } else {
        fs::copy(input, &output).await?;
        info!("No conversion necessary: {}, moved to {}", input.display(), output.display());
    }
    Ok(output)
}

async fn process_item(deps: &ReformatDeps<'_>, file: &RemoteFile, scratch: &mut Scratch) -> Result<()> {
    let mut video_exts: Vec<&str> = CONVERTIBLE.to_vec();
    video_exts.push(".mp4");
    if !has_extension(&file.name, &video_exts) {
        info!("Skipping {} as it is not a video", file.name);
        return Ok(());
    }

    let Some(local) = deps.store.download(&file.id, &file.name).await else {
        bail!("download failed for {}", file.name);
    };
    scratch.track(local.clone());

    let converted = to_mp4(deps.cfg, &local, &file.name).await?;
    scratch.track(converted.clone());

    deps.store
        .upload(&converted, &deps.cfg.folders.stock_videos, "video/mp4")
        .await?;

    if !deps.store.delete(&file.id).await {
        bail!("could not remove the remote original {}", file.id);
    }
    Ok(())
}

pub async fn run(deps: ReformatDeps<'_>) -> Result<bool> {
    info!("*********************REFORMATTING USER VIDEOS************************");

    let files = deps.store.list_children(&deps.cfg.folders.user_videos).await?;

    for file in &files {
        let mut scratch = Scratch::new();
        if let Err(err) = process_item(&deps, file, &mut scratch).await {
            error!("Unexpected error reformatting {}: {}", file.name, err);
        }
        scratch.remove_all().await;
    }

    info!("*************************USER VIDEOS REFORMATTED*****************************");
    Ok(true)
}
