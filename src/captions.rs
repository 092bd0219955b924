use crate::api::CaptionSegment;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Seconds -> "HH:MM:SS.mmm", the timestamp shape ffmpeg's subtitles filter
/// accepts.
pub fn format_time(seconds: f64) -> String {
    let total_millis = (seconds * 1000.0).round() as u64;
    let millis = total_millis % 1000;
    let whole = total_millis / 1000;
    let h = whole / 3600;
    let m = (whole % 3600) / 60;
    let s = whole % 60;
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, millis)
}

/// Write transcription segments as a numbered SRT file.
pub async fn write_srt(path: &Path, segments: &[CaptionSegment]) -> Result<()> {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_time(segment.start),
            format_time(segment.end),
            segment.text.trim()
        ));
    }
    fs::write(path, out)
        .await
        .with_context(|| format!("Failed to write subtitles: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_format_with_millis() {
        assert_eq!(format_time(0.0), "00:00:00.000");
        assert_eq!(format_time(61.5), "00:01:01.500");
        assert_eq!(format_time(3723.042), "01:02:03.042");
    }

    #[tokio::test]
    async fn srt_blocks_are_numbered() {
        let dir = std::env::temp_dir().join("wellcast-captions-test");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("subs.srt");
        let segments = vec![
            CaptionSegment { start: 0.0, end: 2.5, text: "Take a breath.".into() },
            CaptionSegment { start: 2.5, end: 5.0, text: "And let it go.".into() },
        ];
        write_srt(&path, &segments).await.unwrap();
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.starts_with("1\n00:00:00.000 --> 00:00:02.500\nTake a breath.\n"));
        assert!(written.contains("2\n00:00:02.500 --> 00:00:05.000\nAnd let it go.\n"));
        tokio::fs::remove_file(&path).await.ok();
    }
}
