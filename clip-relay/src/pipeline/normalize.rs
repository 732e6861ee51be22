//! Normalize stage: make every artifact at least the target duration.
//!
//! Sources at or above the target are copied verbatim. Shorter sources are
//! looped by concatenation (stream copy) and truncated to exactly the target.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{run_to_completion, tokio_command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::Stage;
use crate::{Error, Result};

/// Media tool operations used by the acquire and normalize stages.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Container duration in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Concatenate `inputs` in order (stream copy) into `dest`, cut at `limit`.
    async fn concat_copy(&self, inputs: &[PathBuf], dest: &Path, limit: Duration) -> Result<()>;

    /// Combine a video-only and an audio-only file (stream copy) into `dest`.
    async fn mux_copy(&self, video: &Path, audio: &Path, dest: &Path) -> Result<()>;
}

/// Upper bound on the number of copies a looped source may need.
pub const MAX_REPEATS: usize = 1000;

/// How many back-to-back copies of a `duration_secs` source reach `target`.
pub fn repeat_count(duration_secs: f64, target: Duration) -> Result<usize> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(Error::normalization(format!(
            "invalid source duration: {}",
            duration_secs
        )));
    }
    let repeats = (target.as_secs_f64() / duration_secs).ceil().max(1.0);
    if repeats > MAX_REPEATS as f64 {
        return Err(Error::normalization(format!(
            "source duration {}s would need {} copies, more than {}",
            duration_secs, repeats, MAX_REPEATS
        )));
    }
    Ok(repeats as usize)
}

/// Result of a normalize run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizeOutcome {
    /// Source already long enough; copied verbatim.
    Copied { duration_secs: f64 },
    /// Source looped `repeats` times and truncated.
    Looped { duration_secs: f64, repeats: usize },
}

pub struct Normalizer {
    media: Arc<dyn MediaTool>,
    target: Duration,
}

impl Normalizer {
    pub fn new(media: Arc<dyn MediaTool>, target: Duration) -> Self {
        Self { media, target }
    }

    pub fn target(&self) -> Duration {
        self.target
    }

    pub async fn normalize(&self, input: &Path, dest: &Path) -> Result<NormalizeOutcome> {
        self.normalize_inner(input, dest)
            .await
            .map_err(|e| e.in_stage(Stage::Normalize))
    }

    async fn normalize_inner(&self, input: &Path, dest: &Path) -> Result<NormalizeOutcome> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let duration_secs = self.media.probe_duration(input).await?;
        let repeats = repeat_count(duration_secs, self.target)?;

        if duration_secs >= self.target.as_secs_f64() {
            tokio::fs::copy(input, dest).await?;
            debug!(duration = duration_secs, "Source meets target duration, copied");
            return Ok(NormalizeOutcome::Copied { duration_secs });
        }

        let inputs = vec![input.to_path_buf(); repeats];
        self.media.concat_copy(&inputs, dest, self.target).await?;
        debug!(duration = duration_secs, repeats, "Source looped to target duration");
        Ok(NormalizeOutcome::Looped {
            duration_secs,
            repeats,
        })
    }
}

/// Escape a path for a concat demuxer `file '...'` directive.
fn concat_entry(path: &Path) -> String {
    format!("file '{}'", path.to_string_lossy().replace('\'', "'\\''"))
}

/// Render a concat demuxer list file.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    let mut list = inputs
        .iter()
        .map(|p| concat_entry(p))
        .collect::<Vec<_>>()
        .join("\n");
    list.push('\n');
    list
}

fn parse_duration(stdout: &str) -> Result<f64> {
    let raw = stdout.trim();
    raw.parse::<f64>()
        .map_err(|_| Error::normalization(format!("unreadable duration '{}'", raw)))
}

/// `ffprobe`/`ffmpeg` backed media tool.
pub struct FfmpegTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    shutdown: CancellationToken,
}

impl FfmpegTool {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, shutdown: CancellationToken) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            shutdown,
        }
    }

    fn concat_args(list: &Path, dest: &Path, limit: Duration) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list.to_string_lossy().into_owned(),
            "-t".to_string(),
            format!("{:.3}", limit.as_secs_f64()),
            "-c".to_string(),
            "copy".to_string(),
            dest.to_string_lossy().into_owned(),
        ]
    }

    fn mux_args(video: &Path, audio: &Path, dest: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            video.to_string_lossy().into_owned(),
            "-i".to_string(),
            audio.to_string_lossy().into_owned(),
            "-c".to_string(),
            "copy".to_string(),
            dest.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let mut cmd = tokio_command(&self.ffprobe);
        cmd.args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"])
            .arg(path);

        let output = run_to_completion(cmd, &self.shutdown).await?;
        parse_duration(&output.stdout)
    }

    async fn concat_copy(&self, inputs: &[PathBuf], dest: &Path, limit: Duration) -> Result<()> {
        let first = inputs
            .first()
            .ok_or_else(|| Error::normalization("nothing to concatenate"))?;
        let list_dir = first.parent().unwrap_or_else(|| Path::new("."));
        let list_path = list_dir.join(format!(
            "concat_{}.txt",
            uuid::Uuid::new_v4().simple()
        ));
        tokio::fs::write(&list_path, concat_list(inputs)).await?;

        let mut cmd = tokio_command(&self.ffmpeg);
        cmd.args(Self::concat_args(&list_path, dest, limit));
        let result = run_to_completion(cmd, &self.shutdown).await;

        let _ = tokio::fs::remove_file(&list_path).await;
        result?;
        Ok(())
    }

    async fn mux_copy(&self, video: &Path, audio: &Path, dest: &Path) -> Result<()> {
        let mut cmd = tokio_command(&self.ffmpeg);
        cmd.args(Self::mux_args(video, audio, dest));
        run_to_completion(cmd, &self.shutdown)
            .await
            .map_err(|e| Error::acquisition(format!("remux failed: {}", e)))?;
        Ok(())
    }
}
