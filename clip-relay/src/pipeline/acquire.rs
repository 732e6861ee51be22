//! Acquire stage: fetch the resolved streams into the job workspace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use process_utils::{run_to_completion, tokio_command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::JobWorkspace;
use super::normalize::MediaTool;
use crate::domain::Stage;
use crate::resolver::ResolvedMedia;
use crate::{Error, Result};

/// Byte transport that downloads a URL to a local file.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Multi-connection `aria2c` transport.
pub struct Aria2Transport {
    aria2c: PathBuf,
    connections: u32,
    shutdown: CancellationToken,
}

impl Aria2Transport {
    pub fn new(aria2c: PathBuf, connections: u32, shutdown: CancellationToken) -> Self {
        Self {
            aria2c,
            connections: connections.max(1),
            shutdown,
        }
    }

    fn build_args(&self, url: &str, dest: &Path) -> Result<Vec<String>> {
        let dir = dest
            .parent()
            .ok_or_else(|| Error::acquisition(format!("no parent for {}", dest.display())))?;
        let name = dest
            .file_name()
            .ok_or_else(|| Error::acquisition(format!("no file name in {}", dest.display())))?;

        let connections = self.connections.to_string();
        Ok(vec![
            "-x".to_string(),
            connections.clone(),
            "-s".to_string(),
            connections,
            "-k1M".to_string(),
            "--file-allocation=none".to_string(),
            "--summary-interval=0".to_string(),
            "--console-log-level=warn".to_string(),
            "--allow-overwrite=true".to_string(),
            format!("--dir={}", dir.display()),
            "-o".to_string(),
            name.to_string_lossy().into_owned(),
            url.to_string(),
        ])
    }
}

#[async_trait]
impl Transport for Aria2Transport {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let mut cmd = tokio_command(&self.aria2c);
        cmd.args(self.build_args(url, dest)?);

        run_to_completion(cmd, &self.shutdown)
            .await
            .map_err(|e| Error::acquisition(e.to_string()))?;

        debug!(dest = %dest.display(), "Fetched stream");
        Ok(())
    }
}

/// Downloads one or two legs and remuxes split legs into a single file.
pub struct Acquirer {
    transport: Arc<dyn Transport>,
    media: Arc<dyn MediaTool>,
}

impl Acquirer {
    pub fn new(transport: Arc<dyn Transport>, media: Arc<dyn MediaTool>) -> Self {
        Self { transport, media }
    }

    /// Fetch `resolved` into `workspace` and return the path of the single
    /// playable file.
    pub async fn acquire(&self, resolved: &ResolvedMedia, workspace: &JobWorkspace) -> Result<PathBuf> {
        self.acquire_inner(resolved, workspace)
            .await
            .map_err(|e| e.in_stage(Stage::Acquire))
    }

    async fn acquire_inner(
        &self,
        resolved: &ResolvedMedia,
        workspace: &JobWorkspace,
    ) -> Result<PathBuf> {
        match resolved {
            ResolvedMedia::Combined { url } => {
                let dest = workspace.file("source.mp4");
                self.transport.fetch(url, &dest).await?;
                Ok(dest)
            }
            ResolvedMedia::Split { video, audio } => {
                let video_path = workspace.file("video.mp4");
                let audio_path = workspace.file("audio.m4a");
                futures::try_join!(
                    self.transport.fetch(video, &video_path),
                    self.transport.fetch(audio, &audio_path),
                )?;

                let merged = workspace.file("merged.mp4");
                self.media
                    .mux_copy(&video_path, &audio_path, &merged)
                    .await?;
                Ok(merged)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aria2c_args() {
        let transport = Aria2Transport::new("aria2c".into(), 16, CancellationToken::new());
        let args = transport
            .build_args("https://cdn/v", Path::new("/work/p1/job/video.mp4"))
            .unwrap();

        assert_eq!(&args[..4], &["-x", "16", "-s", "16"]);
        assert!(args.contains(&"--file-allocation=none".to_string()));
        assert!(args.contains(&"--allow-overwrite=true".to_string()));
        assert!(args.contains(&"--dir=/work/p1/job".to_string()));
        let o = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o + 1], "video.mp4");
        assert_eq!(args.last().unwrap(), "https://cdn/v");
    }
}
