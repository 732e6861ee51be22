//! Stream candidate listing and liveness probing.

use std::path::PathBuf;

use async_trait::async_trait;
use process_utils::{run_to_completion, tokio_command};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Error, Result};

/// A downloadable stream descriptor for an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCandidate {
    pub has_video: bool,
    pub has_audio: bool,
    /// Vertical resolution in pixels, when known.
    pub quality: Option<u32>,
    pub url: String,
}

impl StreamCandidate {
    pub fn is_combined(&self) -> bool {
        self.has_video && self.has_audio
    }

    pub fn is_video_only(&self) -> bool {
        self.has_video && !self.has_audio
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }
}

/// Stream resolution provider.
#[async_trait]
pub trait ResolutionProvider: Send + Sync {
    /// List every stream candidate for an item locator.
    async fn list_candidates(&self, locator: &str) -> Result<Vec<StreamCandidate>>;

    /// Whether `url` currently serves content. Errors count as not live.
    async fn probe_live(&self, url: &str) -> bool;
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    url: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    protocol: Option<String>,
}

fn codec_present(codec: Option<&str>) -> bool {
    matches!(codec, Some(c) if c != "none")
}

/// Parse `yt-dlp -J` output into direct-download candidates.
///
/// Manifest-based formats (HLS/DASH) are skipped; only plain HTTP(S) URLs can
/// be fetched by the transport.
pub(crate) fn parse_ytdlp_formats(json: &str) -> Result<Vec<StreamCandidate>> {
    let info: YtDlpInfo = serde_json::from_str(json)?;

    Ok(info
        .formats
        .into_iter()
        .filter_map(|f| {
            let url = f.url?;
            let protocol = f.protocol.as_deref().unwrap_or("https");
            if protocol != "https" && protocol != "http" {
                return None;
            }

            let has_video = codec_present(f.vcodec.as_deref());
            let has_audio = codec_present(f.acodec.as_deref());
            if !has_video && !has_audio {
                return None;
            }

            Some(StreamCandidate {
                has_video,
                has_audio,
                quality: if has_video { f.height } else { None },
                url,
            })
        })
        .collect())
}

/// `yt-dlp` based provider with HTTP `HEAD` liveness probes.
pub struct YtDlpProvider {
    ytdlp: PathBuf,
    client: reqwest::Client,
    shutdown: CancellationToken,
}

impl YtDlpProvider {
    pub fn new(ytdlp: PathBuf, client: reqwest::Client, shutdown: CancellationToken) -> Self {
        Self {
            ytdlp,
            client,
            shutdown,
        }
    }
}

#[async_trait]
impl ResolutionProvider for YtDlpProvider {
    async fn list_candidates(&self, locator: &str) -> Result<Vec<StreamCandidate>> {
        let mut cmd = tokio_command(&self.ytdlp);
        cmd.args(["-J", "--no-warnings", "--no-playlist", locator]);

        let output = run_to_completion(cmd, &self.shutdown)
            .await
            .map_err(|e| Error::Resolution(e.to_string()))?;

        let candidates = parse_ytdlp_formats(&output.stdout)
            .map_err(|e| Error::Resolution(format!("unreadable format listing: {}", e)))?;
        debug!(locator = %locator, count = candidates.len(), "Listed stream candidates");
        Ok(candidates)
    }

    async fn probe_live(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Liveness probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats_classifies_legs() {
        let json = r#"{
            "id": "abc",
            "formats": [
                {"format_id": "139", "url": "https://cdn/a", "vcodec": "none", "acodec": "mp4a.40.5", "protocol": "https"},
                {"format_id": "160", "url": "https://cdn/v", "vcodec": "avc1.4d400c", "acodec": "none", "height": 144, "protocol": "https"},
                {"format_id": "18", "url": "https://cdn/c", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360, "protocol": "https"},
                {"format_id": "sb0", "url": "https://cdn/sb", "vcodec": "none", "acodec": "none", "protocol": "mhtml"},
                {"format_id": "95", "url": "https://cdn/m.m3u8", "vcodec": "avc1", "acodec": "mp4a", "height": 720, "protocol": "m3u8_native"}
            ]
        }"#;

        let candidates = parse_ytdlp_formats(json).unwrap();
        assert_eq!(candidates.len(), 3);

        assert!(candidates[0].is_audio_only());
        assert_eq!(candidates[0].quality, None);
        assert!(candidates[1].is_video_only());
        assert_eq!(candidates[1].quality, Some(144));
        assert!(candidates[2].is_combined());
        assert_eq!(candidates[2].url, "https://cdn/c");
    }

    #[test]
    fn test_parse_without_formats() {
        assert!(parse_ytdlp_formats(r#"{"id":"abc"}"#).unwrap().is_empty());
        assert!(parse_ytdlp_formats("not json").is_err());
    }
}
