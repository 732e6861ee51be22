//! Hand-written fakes for the external collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use clip_relay::browser::{SessionProvider, SurfaceFactory};
use clip_relay::config::{PublishConfig, ResolverConfig};
use clip_relay::monitor::{SourceClient, SourceItem};
use clip_relay::pipeline::{
    Acquirer, MediaTool, Normalizer, PipelineStages, PublishSurface, Publisher, Transport,
};
use clip_relay::resolver::{ResolutionProvider, Resolver, StreamCandidate};
use clip_relay::{Error, Result};

pub fn item(id: &str, published_at: DateTime<Utc>) -> SourceItem {
    SourceItem {
        id: id.to_string(),
        title: format!("Title {id}"),
        published_at,
        locator: format!("https://www.youtube.com/watch?v={id}"),
    }
}

/// Source returning whatever listing was last configured per source id.
#[derive(Default)]
pub struct FakeSource {
    listings: Mutex<HashMap<String, std::result::Result<Vec<SourceItem>, String>>>,
}

impl FakeSource {
    pub fn set(&self, source_id: &str, items: Vec<SourceItem>) {
        self.listings.lock().insert(source_id.to_string(), Ok(items));
    }

    pub fn fail(&self, source_id: &str, message: &str) {
        self.listings
            .lock()
            .insert(source_id.to_string(), Err(message.to_string()));
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn list_recent_items(&self, _credential: &str, source_id: &str) -> Result<Vec<SourceItem>> {
        match self.listings.lock().get(source_id) {
            Some(Ok(items)) => Ok(items.clone()),
            Some(Err(message)) => Err(Error::Source(message.clone())),
            None => Ok(Vec::new()),
        }
    }
}

/// How a fake probe of one URL behaves.
#[derive(Debug, Clone, Copy)]
pub enum Probe {
    Live(Duration),
    Dead(Duration),
    Hang,
}

/// Resolution provider with scripted candidates and probe outcomes.
///
/// With no scripted candidates it offers a single live combined stream
/// derived from the locator.
#[derive(Default)]
pub struct ScriptedProvider {
    candidates: Mutex<Option<Vec<StreamCandidate>>>,
    probes: Mutex<HashMap<String, Probe>>,
    probed: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn with_candidates(candidates: Vec<StreamCandidate>) -> Self {
        Self {
            candidates: Mutex::new(Some(candidates)),
            ..Default::default()
        }
    }

    pub fn probe(self, url: &str, probe: Probe) -> Self {
        self.probes.lock().insert(url.to_string(), probe);
        self
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().clone()
    }
}

#[async_trait]
impl ResolutionProvider for ScriptedProvider {
    async fn list_candidates(&self, locator: &str) -> Result<Vec<StreamCandidate>> {
        Ok(self.candidates.lock().clone().unwrap_or_else(|| {
            vec![combined(720, &format!("{locator}/stream"))]
        }))
    }

    async fn probe_live(&self, url: &str) -> bool {
        self.probed.lock().push(url.to_string());
        let probe = self
            .probes
            .lock()
            .get(url)
            .copied()
            .unwrap_or(Probe::Live(Duration::ZERO));
        match probe {
            Probe::Live(delay) => {
                tokio::time::sleep(delay).await;
                true
            }
            Probe::Dead(delay) => {
                tokio::time::sleep(delay).await;
                false
            }
            Probe::Hang => std::future::pending().await,
        }
    }
}

pub fn combined(quality: u32, url: &str) -> StreamCandidate {
    StreamCandidate {
        has_video: true,
        has_audio: true,
        quality: Some(quality),
        url: url.to_string(),
    }
}

pub fn video_only(quality: u32, url: &str) -> StreamCandidate {
    StreamCandidate {
        has_video: true,
        has_audio: false,
        quality: Some(quality),
        url: url.to_string(),
    }
}

pub fn audio_only(url: &str) -> StreamCandidate {
    StreamCandidate {
        has_video: false,
        has_audio: true,
        quality: None,
        url: url.to_string(),
    }
}

/// Transport writing the URL as file content; URLs containing "broken" fail.
#[derive(Default)]
pub struct FakeTransport;

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        if url.contains("broken") {
            return Err(Error::acquisition(format!("transfer of {url} failed")));
        }
        tokio::fs::write(dest, format!("bytes of {url}")).await?;
        Ok(())
    }
}

/// Media tool reporting a fixed duration and concatenating file contents.
pub struct FakeMedia {
    duration_secs: f64,
    pub concat_calls: Mutex<Vec<(usize, Duration)>>,
}

impl FakeMedia {
    pub fn with_duration(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            concat_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MediaTool for FakeMedia {
    async fn probe_duration(&self, _path: &Path) -> Result<f64> {
        Ok(self.duration_secs)
    }

    async fn concat_copy(&self, inputs: &[PathBuf], dest: &Path, limit: Duration) -> Result<()> {
        self.concat_calls.lock().push((inputs.len(), limit));
        let mut joined = Vec::new();
        for input in inputs {
            joined.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(dest, joined).await?;
        Ok(())
    }

    async fn mux_copy(&self, video: &Path, audio: &Path, dest: &Path) -> Result<()> {
        let mut joined = tokio::fs::read(video).await?;
        joined.extend(tokio::fs::read(audio).await?);
        tokio::fs::write(dest, joined).await?;
        Ok(())
    }
}

/// Surface that accepts every file immediately and counts resets.
#[derive(Clone, Default)]
pub struct FakeSurface {
    pub injected: Arc<Mutex<Vec<PathBuf>>>,
    pub resets: Arc<AtomicUsize>,
}

impl FakeSurface {
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublishSurface for FakeSurface {
    async fn inject_file(&mut self, path: &Path) -> Result<()> {
        self.injected.lock().push(path.to_path_buf());
        Ok(())
    }

    async fn is_submittable(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn submit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn is_published(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn reset(&mut self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Session provider failing for tenant ids starting with "flaky".
#[derive(Default)]
pub struct FakeSessions {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn acquire_session(&self, tenant_id: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if tenant_id.starts_with("flaky") {
            return Err(Error::Other("profile failed to start".to_string()));
        }
        Ok(format!("ws://127.0.0.1:9222/devtools/browser/{tenant_id}"))
    }
}

/// Factory handing out [`FakeSurface`]s; panics for "panicky" endpoints.
#[derive(Default)]
pub struct FakeSurfaces {
    pub surface: FakeSurface,
}

#[async_trait]
impl SurfaceFactory for FakeSurfaces {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn PublishSurface>> {
        if endpoint.contains("panicky") {
            panic!("surface crashed for {endpoint}");
        }
        Ok(Box::new(self.surface.clone()))
    }
}

pub fn fast_publish_config() -> PublishConfig {
    PublishConfig {
        poll_interval_ms: 10,
        ready_timeout_ms: 1_000,
        success_timeout_ms: 1_000,
        reset_timeout_ms: 1_000,
        ..PublishConfig::default()
    }
}

/// Pipeline stages wired to fakes, writing under `root`.
pub fn fake_stages(
    root: &Path,
    provider: Arc<dyn ResolutionProvider>,
    media: Arc<dyn MediaTool>,
) -> PipelineStages {
    PipelineStages {
        resolver: Arc::new(Resolver::new(provider, &ResolverConfig::default())),
        acquirer: Arc::new(Acquirer::new(Arc::new(FakeTransport), media.clone())),
        normalizer: Arc::new(Normalizer::new(media, Duration::from_secs(65))),
        publisher: Publisher::new(&fast_publish_config()),
        work_dir: root.join("work"),
        output_dir: root.join("output"),
    }
}
