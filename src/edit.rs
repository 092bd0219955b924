//! Audio/video assembly: each narration mp3 in the add-audio folder is mixed
//! with a random background track, laid over stitched stock clips, captioned,
//! and shipped to the content-to-send folder. Failures are isolated per item;
//! every item's scratch files are removed on every exit path.

use crate::api::{FileStore, RemoteFile, Table, Transcriber};
use crate::captions;
use crate::config::Config;
use crate::ffmpeg;
use crate::rows::{PRODUCTION_LINK_COL, PRODUCTION_VIDEO_ID_COL};
use crate::storage::{file_stem, has_extension, Scratch};
use anyhow::{bail, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

pub struct EditDeps<'a> {
    pub cfg: &'a Config,
    pub store: &'a dyn FileStore,
    pub production: &'a dyn Table,
    pub transcriber: &'a dyn Transcriber,
}

/// Stitch enough randomly chosen stock clips to cover the narration, one clip
/// per ten seconds of audio, clamped to the available inventory.
async fn build_stock_video(deps: &EditDeps<'_>, narration: &PathBuf, scratch: &mut Scratch) -> Result<PathBuf> {
    let clips = deps.store.list_children(&deps.cfg.folders.stock_videos).await?;
    if clips.is_empty() {
        bail!("no stock clips available");
    }

    let length = ffmpeg::ffprobe_duration_seconds(narration).await?;
    let mut needed = ((length / 10.0) as usize + 1).max(1);
    if needed > clips.len() {
        warn!("Requested {} clips but only had {}", needed, clips.len());
        needed = clips.len();
    }

    let chosen: Vec<&RemoteFile> = clips.choose_multiple(&mut rand::thread_rng(), needed).collect();

    let list_path = deps.cfg.downloads_dir().join("videos.txt");
    let mut list = fs::File::create(&list_path).await?;
    scratch.track(list_path.clone());
    for (i, clip) in chosen.iter().enumerate() {
        let temp_name = format!("stitch_{}.mp4", i + 1);
        let Some(local) = deps.store.download(&clip.id, &temp_name).await else {
            bail!("could not download stock clip {}", clip.name);
        };
        scratch.track(local);
        list.write_all(format!("file '{}'\n", temp_name).as_bytes()).await?;
    }
    list.flush().await?;

    let out = deps.cfg.videos_dir().join("video.mp4");
    if !ffmpeg::concat_videos(&list_path, &out).await? {
        bail!("stock clip concat failed");
    }
    scratch.track(out.clone());
    Ok(out)
}

async fn process_item(
    deps: &EditDeps<'_>,
    file: &RemoteFile,
    music: &[RemoteFile],
    scratch: &mut Scratch,
) -> Result<()> {
    let Some(local_voice) = deps.store.download(&file.id, &file.name).await else {
        bail!("download failed for {}", file.name);
    };
    scratch.track(local_voice.clone());

    let choice = rand::thread_rng().gen_range(0..music.len());
    let track = &music[choice];
    let Some(local_music) = deps.store.download(&track.id, &track.name).await else {
        bail!("download failed for music {}", track.name);
    };
    scratch.track(local_music.clone());

    let segments = deps.transcriber.transcribe(&local_voice).await?;
    let subs_path = deps.cfg.downloads_dir().join("subs.srt");
    captions::write_srt(&subs_path, &segments).await?;
    scratch.track(subs_path.clone());
    info!("Successfully transcribed subtitles for {}", local_voice.display());

    let base = file_stem(&file.name);
    let mixed = deps.cfg.audio_drafts_dir().join(format!("mixed_{}.mp3", base));
    if !ffmpeg::mix_voice_and_music(&local_voice, &local_music, &mixed).await? {
        bail!("mixing narration and music failed");
    }
    scratch.track(mixed.clone());

    let stock_video = build_stock_video(deps, &mixed, scratch).await?;

    let no_subs = deps.cfg.upload_videos_dir().join("nosub.mp4");
    if !ffmpeg::replace_audio(&stock_video, &mixed, &no_subs).await? {
        bail!("replacing video audio failed");
    }
    scratch.track(no_subs.clone());

    let final_video = deps.cfg.upload_videos_dir().join(format!("{}.mp4", base));
    if !ffmpeg::burn_subtitles(&no_subs, &subs_path, &final_video).await? {
        bail!("burning subtitles failed");
    }
    scratch.track(final_video.clone());

    let video_id = deps
        .store
        .upload(&final_video, &deps.cfg.folders.content_to_send, "video/mp4")
        .await?;
    info!("Successfully uploaded {} to remote storage", final_video.display());

    deps.store.move_file(&file.id, &deps.cfg.folders.archive).await?;
    info!("Successfully moved the source audio to the archive");

    // Tie the produced video back to its production row.
    if let Some(row) = deps
        .production
        .find_in_column(PRODUCTION_LINK_COL, &file.id)
        .await?
    {
        deps.production
            .update_cell(row, PRODUCTION_VIDEO_ID_COL, &video_id)
            .await?;
    }

    Ok(())
}

pub async fn run(deps: EditDeps<'_>) -> Result<bool> {
    info!("*********************EDITING CONTENT************************");

    let files = deps.store.list_children(&deps.cfg.folders.add_audio).await?;
    let music = deps.store.list_children(&deps.cfg.folders.music).await?;
    if music.is_empty() {
        error!("No music files in remote storage");
        return Ok(false);
    }

    for file in &files {
        if !has_extension(&file.name, &[".mp3"]) {
            info!("Skipping {} as it is not mp3", file.name);
            continue;
        }

        info!("Processing {}...", file.name);
        let mut scratch = Scratch::new();
        if let Err(err) = process_item(&deps, file, &music, &mut scratch).await {
            error!("Unexpected error processing {}: {}", file.name, err);
        }
        scratch.remove_all().await;
    }

    info!("*************************CONTENT SUCCESSFULLY EDITED*****************************");
    Ok(true)
}
