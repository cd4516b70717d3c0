//! Media probing and frame sampling via ffprobe/ffmpeg subprocesses.

use atelier_protocol::{CoreError, CoreResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(30);

/// What the container probe learned about a file.
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub container_ok: bool,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub frame_count: u32,
    pub fps: f64,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    nb_frames: Option<String>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Probe a media file with `ffprobe -print_format json`. An unreadable or
/// undecodable file yields `container_ok = false`, not an error.
pub async fn probe(path: &Path) -> CoreResult<MediaInfo> {
    let output = tokio::time::timeout(
        PROBE_TIMEOUT,
        Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output(),
    )
    .await
    .map_err(|_| CoreError::timeout("ffprobe"))?
    .map_err(|e| CoreError::internal(format!("ffprobe spawn failed: {e}")))?;

    if !output.status.success() {
        debug!("ffprobe rejected {}", path.display());
        return Ok(MediaInfo::default());
    }

    let parsed: ProbeOutput = match serde_json::from_slice(&output.stdout) {
        Ok(parsed) => parsed,
        Err(_) => return Ok(MediaInfo::default()),
    };

    let Some(video) = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
    else {
        return Ok(MediaInfo::default());
    };

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .unwrap_or(0.0);
    let duration_secs = video
        .duration
        .as_deref()
        .or(parsed.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u32>().ok())
        .unwrap_or_else(|| (duration_secs * fps).round() as u32);

    Ok(MediaInfo {
        container_ok: true,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        duration_secs,
        frame_count,
        fps,
    })
}

fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => rate.parse().ok(),
    }
}

/// Extract up to `count` frames spread across a video into `out_dir` as
/// PNGs. Returns the written paths in order.
pub async fn extract_frames(
    path: &Path,
    duration_secs: f64,
    count: usize,
    out_dir: &Path,
) -> CoreResult<Vec<PathBuf>> {
    let mut frames = Vec::new();
    let span = duration_secs.max(0.1);
    for i in 0..count {
        let at = span * (i as f64 + 0.5) / count as f64;
        let out = out_dir.join(format!("frame_{:03}.png", i + 1));
        let result = tokio::time::timeout(
            EXTRACT_TIMEOUT,
            Command::new("ffmpeg")
                .args(["-ss", &format!("{at:.3}"), "-i"])
                .arg(path)
                .args(["-frames:v", "1", "-vf", "scale=512:512", "-y"])
                .arg(&out)
                .output(),
        )
        .await
        .map_err(|_| CoreError::timeout("ffmpeg frame extraction"))?
        .map_err(|e| CoreError::internal(format!("ffmpeg spawn failed: {e}")))?;

        if result.status.success() && out.exists() {
            frames.push(out);
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("24/1"), Some(24.0));
        assert_eq!(parse_rate("30000/1001").map(|r| r.round()), Some(30.0));
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("1/0"), None);
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        // ffprobe exits non-zero for a missing path; that is a failed
        // container gate, not an error.
        if which_ffprobe() {
            let info = probe(Path::new("/nonexistent/clip.mp4")).await.unwrap();
            assert!(!info.container_ok);
        }
    }

    fn which_ffprobe() -> bool {
        std::process::Command::new("ffprobe")
            .arg("-version")
            .output()
            .is_ok()
    }
}
