//! Tiered racing stream resolution.
//!
//! Tier A races liveness probes over combined candidates up to a quality cap;
//! tier B, tried only when A yields nothing, races video-only × audio-only
//! pairs under a lower cap. The first live result wins and the remaining
//! probes are dropped.

mod provider;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::{Error, Result};

pub use provider::{ResolutionProvider, StreamCandidate, YtDlpProvider};

/// A playable media reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMedia {
    Combined { url: String },
    Split { video: String, audio: String },
}

/// Combined candidates at or below `max_quality`, lowest quality first.
pub fn combined_tier(candidates: &[StreamCandidate], max_quality: u32) -> Vec<&StreamCandidate> {
    let mut tier: Vec<&StreamCandidate> = candidates
        .iter()
        .filter(|c| c.is_combined() && c.quality.is_some_and(|q| q <= max_quality))
        .collect();
    tier.sort_by_key(|c| c.quality);
    tier
}

/// Video-only candidates at or below `max_quality` paired with every
/// audio-only candidate.
pub fn split_tier(
    candidates: &[StreamCandidate],
    max_quality: u32,
) -> Vec<(&StreamCandidate, &StreamCandidate)> {
    let videos = candidates
        .iter()
        .filter(|c| c.is_video_only() && c.quality.is_some_and(|q| q <= max_quality));
    let audios: Vec<&StreamCandidate> = candidates.iter().filter(|c| c.is_audio_only()).collect();

    videos
        .flat_map(|v| audios.iter().map(move |a| (v, *a)))
        .collect()
}

pub struct Resolver {
    provider: Arc<dyn ResolutionProvider>,
    combined_max_quality: u32,
    fallback_max_quality: u32,
    probe_timeout: Duration,
}

impl Resolver {
    pub fn new(provider: Arc<dyn ResolutionProvider>, config: &ResolverConfig) -> Self {
        Self {
            provider,
            combined_max_quality: config.combined_max_quality,
            fallback_max_quality: config.fallback_max_quality,
            probe_timeout: config.probe_timeout(),
        }
    }

    async fn probe(&self, url: &str) -> bool {
        tokio::time::timeout(self.probe_timeout, self.provider.probe_live(url))
            .await
            .unwrap_or(false)
    }

    /// Resolve `locator` to one playable media reference.
    pub async fn resolve(&self, locator: &str) -> Result<ResolvedMedia> {
        let candidates = self
            .provider
            .list_candidates(locator)
            .await
            .map_err(|e| e.in_stage(crate::domain::Stage::Resolve))?;

        if let Some(url) = self.race_combined(&candidates).await {
            return Ok(ResolvedMedia::Combined { url });
        }

        debug!(locator = %locator, "No live combined stream, trying split streams");

        if let Some((video, audio)) = self.race_split(&candidates).await {
            return Ok(ResolvedMedia::Split { video, audio });
        }

        Err(Error::NoStreamFound {
            locator: locator.to_string(),
        })
    }

    async fn race_combined(&self, candidates: &[StreamCandidate]) -> Option<String> {
        let mut probes: FuturesUnordered<_> = combined_tier(candidates, self.combined_max_quality)
            .into_iter()
            .map(|c| async move { self.probe(&c.url).await.then(|| c.url.clone()) })
            .collect();

        while let Some(result) = probes.next().await {
            if result.is_some() {
                return result;
            }
        }
        None
    }

    async fn race_split(&self, candidates: &[StreamCandidate]) -> Option<(String, String)> {
        let mut probes: FuturesUnordered<_> = split_tier(candidates, self.fallback_max_quality)
            .into_iter()
            .map(|(v, a)| async move {
                let (video_live, audio_live) = tokio::join!(self.probe(&v.url), self.probe(&a.url));
                (video_live && audio_live).then(|| (v.url.clone(), a.url.clone()))
            })
            .collect();

        while let Some(result) = probes.next().await {
            if result.is_some() {
                return result;
            }
        }
        None
    }
}
