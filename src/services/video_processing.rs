// src/services/video_processing.rs
//! Clip joining on top of ffmpeg.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use uuid::Uuid;

use super::{ObjectStore, ServiceError, ServiceResult, Transition, VideoProcessor};

const OUTPUT_FOLDER: &str = "processed_videos";
const TRANSITION_SECONDS: f64 = 1.0;

pub struct FfmpegVideoProcessor {
    storage: Arc<dyn ObjectStore>,
}

impl FfmpegVideoProcessor {
    pub fn new(storage: Arc<dyn ObjectStore>) -> Self {
        Self { storage }
    }

    async fn download_inputs(&self, video_uris: &[String], dir: &Path) -> ServiceResult<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(video_uris.len());
        for (i, uri) in video_uris.iter().enumerate() {
            let bytes = self.storage.download(uri).await?;
            let path = dir.join(format!("input_{}.mp4", i));
            tokio::fs::write(&path, bytes).await?;
            paths.push(path);
        }
        Ok(paths)
    }
}

#[async_trait]
impl VideoProcessor for FfmpegVideoProcessor {
    async fn process_videos(&self, video_uris: &[String], transition: Transition) -> ServiceResult<String> {
        if video_uris.len() < 2 {
            return Err(ServiceError::InvalidRequest("At least two videos are required.".to_string()));
        }

        let workdir = tempfile::tempdir()?;
        let inputs = self.download_inputs(video_uris, workdir.path()).await?;
        let output = workdir.path().join("output.mp4");

        match transition {
            Transition::Concat => concat_videos(&inputs, &output, workdir.path()).await?,
            other => xfade_videos(&inputs[0], &inputs[1], &output, xfade_name(other)).await?,
        }

        let bytes = tokio::fs::read(&output).await?;
        let filename = format!("processed_{}.mp4", Uuid::new_v4());
        let uri = self.storage.store(OUTPUT_FOLDER, &filename, "video/mp4", bytes).await?;
        tracing::info!(inputs = video_uris.len(), transition = ?transition, output = %uri, "Videos processed");
        Ok(uri)
    }
}

fn xfade_name(transition: Transition) -> &'static str {
    match transition {
        Transition::Crossfade | Transition::Concat => "fade",
        Transition::Wipe => "wipeleft",
        Transition::DipToBlack => "fadeblack",
    }
}

/// Concat demuxer with a re-encode, so clips from different sources
/// (generated video, bumper) join cleanly.
async fn concat_videos(inputs: &[PathBuf], output: &Path, workdir: &Path) -> ServiceResult<()> {
    let concat_list = inputs
        .iter()
        .map(|path| format!("file '{}'", path.display()))
        .collect::<Vec<String>>()
        .join("\n");
    let list_path = workdir.join("concat.txt");
    tokio::fs::write(&list_path, concat_list).await?;

    let mut command = Command::new("ffmpeg");
    command
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(&list_path)
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac"])
        .arg("-y")
        .arg(output);

    execute_ffmpeg_command(command).await.map(|_| ())
}

/// Only the first two clips take part in a transition.
async fn xfade_videos(first: &Path, second: &Path, output: &Path, transition: &str) -> ServiceResult<()> {
    let first_duration = probe_duration(first).await?;
    let offset = (first_duration - TRANSITION_SECONDS).max(0.0);
    let filter = format!(
        "[0:v][1:v]xfade=transition={}:duration={}:offset={:.3},format=yuv420p[v]",
        transition, TRANSITION_SECONDS, offset
    );

    let mut command = Command::new("ffmpeg");
    command
        .arg("-i")
        .arg(first)
        .arg("-i")
        .arg(second)
        .arg("-filter_complex")
        .arg(filter)
        .args(["-map", "[v]", "-c:v", "libx264", "-an"])
        .arg("-y")
        .arg(output);

    execute_ffmpeg_command(command).await.map(|_| ())
}

async fn execute_ffmpeg_command(mut command: Command) -> ServiceResult<String> {
    tracing::debug!("Executing FFmpeg: {:?}", command);

    let output = command
        .output()
        .await
        .map_err(|e| ServiceError::Ffmpeg(format!("Failed to execute FFmpeg: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ServiceError::Ffmpeg(stderr.to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

async fn probe_duration(path: &Path) -> ServiceResult<f64> {
    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-show_entries", "format=duration", "-of", "csv=p=0"])
        .arg(path)
        .output()
        .await
        .map_err(|e| ServiceError::Ffmpeg(format!("Failed to execute FFprobe: {}", e)))?;

    if !output.status.success() {
        return Err(ServiceError::Ffmpeg(String::from_utf8_lossy(&output.stderr).to_string()));
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_duration(raw: &str) -> ServiceResult<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ServiceError::Ffmpeg(format!("Unexpected ffprobe duration: {:?}", raw.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::MemoryObjectStore;

    #[tokio::test]
    async fn test_requires_two_videos() {
        let processor = FfmpegVideoProcessor::new(Arc::new(MemoryObjectStore::default()));
        let err = processor
            .process_videos(&["gs://bucket/only.mp4".to_string()], Transition::Concat)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("8.000000\n").unwrap(), 8.0);
        assert!(parse_duration("N/A").is_err());
    }

    #[test]
    fn test_xfade_names() {
        assert_eq!(xfade_name(Transition::Crossfade), "fade");
        assert_eq!(xfade_name(Transition::Wipe), "wipeleft");
        assert_eq!(xfade_name(Transition::DipToBlack), "fadeblack");
    }
}
