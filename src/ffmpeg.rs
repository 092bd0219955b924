//! Thin wrappers around the local ffmpeg/ffprobe binaries. Every hard media
//! operation is delegated here; callers get a bool back and skip-and-continue
//! on failure.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::{error, info};

async fn run_cmd(args: &[String], description: &str) -> Result<bool> {
    if args.is_empty() {
        return Ok(true);
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let status = cmd.status().await.context("Command execution failed")?;
    if !status.success() {
        error!("{} failed: {:?}", description, args);
        return Ok(false);
    }
    info!("{} completed successfully", description);
    Ok(true)
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(anyhow::anyhow!("Invalid duration"));
    }
    Ok(duration)
}

/// Mix narration over a background track: voice as-is, music at 20%, output
/// truncated to the narration length.
pub async fn mix_voice_and_music(voice: &Path, music: &Path, out_mp3: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        voice.display().to_string(),
        "-i".to_string(),
        music.display().to_string(),
        "-filter_complex".to_string(),
        "[0:a]volume=1.1[a0];[1:a]volume=0.2[a1];[a0][a1]amix=inputs=2:duration=first:dropout_transition=2[a]"
            .to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-c:a".to_string(),
        "mp3".to_string(),
        out_mp3.display().to_string(),
    ];
    run_cmd(&args, "adding music to content").await
}

/// Stitch the clips named in a concat list, stream-copied.
pub async fn concat_videos(list_txt: &Path, out_mp4: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-c".to_string(),
        "copy".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args, "stitching stock clips").await
}

/// Replace a video's audio with a new track, stopping at the audio length.
pub async fn replace_audio(video: &Path, audio: &Path, out_mp4: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-i".to_string(),
        audio.display().to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-shortest".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args, "add video to content").await
}

/// Burn an SRT file into the video stream.
pub async fn burn_subtitles(video: &Path, srt: &Path, out_mp4: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-vf".to_string(),
        format!("subtitles={}", srt.display()),
        "-c:a".to_string(),
        "copy".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args, "adding subtitles").await
}

/// Re-encode an arbitrary video container to a streamable mp4.
pub async fn convert_to_mp4(input: &Path, out_mp4: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-crf".to_string(),
        "23".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args, "converting to mp4").await
}
