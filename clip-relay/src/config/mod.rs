//! Application configuration.
//!
//! Settings come from the environment (optionally seeded from a `.env` file)
//! with defaults for everything; tenants come from the line-oriented profiles
//! file parsed in [`tenants`].

pub mod tenants;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use tenants::{SkippedLine, TenantFile, load_tenants_file, parse_tenants};

/// Locations of the external tools the pipeline shells out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub aria2c: PathBuf,
    pub ytdlp: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            aria2c: PathBuf::from("aria2c"),
            ytdlp: PathBuf::from("yt-dlp"),
        }
    }
}

/// Detection loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Target length of one detection cycle in milliseconds.
    pub period_ms: u64,
    /// Number of recent items requested per source per cycle.
    pub page_size: u32,
    /// Base URL of the source query API.
    pub api_base: String,
    /// Per-request timeout for source queries in seconds.
    pub request_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            page_size: 5,
            api_base: "https://www.googleapis.com/youtube/v3".to_string(),
            request_timeout_secs: 15,
        }
    }
}

impl MonitorConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Stream resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Highest quality accepted for combined (video+audio) candidates.
    pub combined_max_quality: u32,
    /// Highest quality accepted for video-only fallback candidates.
    pub fallback_max_quality: u32,
    /// Liveness probe timeout in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            combined_max_quality: 720,
            fallback_max_quality: 360,
            probe_timeout_ms: 10_000,
        }
    }
}

impl ResolverConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Acquire and normalize settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root of per-tenant, per-job scratch directories.
    pub work_dir: PathBuf,
    /// Directory receiving normalized artifacts.
    pub output_dir: PathBuf,
    /// Minimum (and truncation) duration of a normalized artifact in seconds.
    pub target_duration_secs: u64,
    /// Parallel connections used by the transport.
    pub connections: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("temp"),
            output_dir: PathBuf::from("output"),
            target_duration_secs: 65,
            connections: 16,
        }
    }
}

impl PipelineConfig {
    pub fn target_duration(&self) -> Duration {
        Duration::from_secs(self.target_duration_secs)
    }
}

/// Publish surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Page the surface is (re)navigated to before each job.
    pub upload_url: String,
    /// Substring of the location that signals a successful publish.
    pub success_url_fragment: String,
    pub file_input_selector: String,
    pub submit_selector: String,
    pub poll_interval_ms: u64,
    /// How long to wait for the submit control to become usable.
    pub ready_timeout_ms: u64,
    /// How long to wait for the success signal after submitting.
    pub success_timeout_ms: u64,
    /// How long a reset may take before the surface is reported broken.
    pub reset_timeout_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            upload_url: "https://www.tiktok.com/tiktokstudio/upload?from=webapp".to_string(),
            success_url_fragment: "tiktokstudio/content".to_string(),
            file_input_selector: "input[type=\"file\"]".to_string(),
            submit_selector: "button[data-e2e=\"post_video_button\"]".to_string(),
            poll_interval_ms: 500,
            ready_timeout_ms: 30_000,
            success_timeout_ms: 15_000,
            reset_timeout_ms: 15_000,
        }
    }
}

impl PublishConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn success_timeout(&self) -> Duration {
        Duration::from_millis(self.success_timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Number of readiness checks a reset gets within its timeout.
    pub fn reset_polls(&self) -> u64 {
        (self.reset_timeout_ms / self.poll_interval_ms.max(1)).max(1)
    }
}

/// Bounded retry budget for remote session acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for SessionRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            delay_ms: 1000,
        }
    }
}

impl SessionRetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Supervisor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub session_retry: SessionRetryConfig,
    /// How long `stop` waits for a unit before aborting it.
    pub shutdown_timeout_ms: u64,
    /// Log lines kept per tenant.
    pub log_capacity: usize,
    /// Duration samples kept per tenant.
    pub stats_window: usize,
    pub heartbeat_interval_ms: u64,
    /// Capacity of the observer broadcast channel.
    pub event_capacity: usize,
    /// Pause between session acquisitions when starting many tenants.
    pub start_all_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            session_retry: SessionRetryConfig::default(),
            shutdown_timeout_ms: 10_000,
            log_capacity: 1000,
            stats_window: crate::domain::DEFAULT_STATS_WINDOW,
            heartbeat_interval_ms: 1000,
            event_capacity: 1024,
            start_all_delay_ms: 1000,
        }
    }
}

impl SupervisorConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn start_all_delay(&self) -> Duration {
        Duration::from_millis(self.start_all_delay_ms)
    }
}

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 12580,
            enable_cors: true,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub profiles_file: PathBuf,
    pub log_dir: PathBuf,
    /// Base URL of the local session provider API.
    pub session_api_base: String,
    pub tools: ToolPaths,
    pub monitor: MonitorConfig,
    pub resolver: ResolverConfig,
    pub pipeline: PipelineConfig,
    pub publish: PublishConfig,
    pub supervisor: SupervisorConfig,
    pub api: ApiServerConfig,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = key, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env_or_default() -> Self {
        let mut config = Self {
            profiles_file: PathBuf::from("profiles.txt"),
            log_dir: PathBuf::from("logs"),
            session_api_base: "http://127.0.0.1:55550/backend".to_string(),
            ..Self::default()
        };

        if let Some(v) = env_string("PROFILES_FILE") {
            config.profiles_file = v.into();
        }
        if let Some(v) = env_string("LOG_DIR") {
            config.log_dir = v.into();
        }
        if let Some(v) = env_string("GENLOGIN_BASE_URL") {
            config.session_api_base = v.trim_end_matches('/').to_string();
        }

        if let Some(v) = env_string("FFMPEG_PATH") {
            config.tools.ffmpeg = v.into();
        }
        if let Some(v) = env_string("FFPROBE_PATH") {
            config.tools.ffprobe = v.into();
        }
        if let Some(v) = env_string("ARIA2C_PATH") {
            config.tools.aria2c = v.into();
        }
        if let Some(v) = env_string("YTDLP_PATH") {
            config.tools.ytdlp = v.into();
        }

        if let Some(v) = env_parse("DETECTION_PERIOD_MS") {
            config.monitor.period_ms = v;
        }
        if let Some(v) = env_parse("DETECTION_PAGE_SIZE") {
            config.monitor.page_size = v;
        }
        if let Some(v) = env_string("YOUTUBE_API_BASE") {
            config.monitor.api_base = v.trim_end_matches('/').to_string();
        }

        if let Some(v) = env_parse("PROBE_TIMEOUT_MS") {
            config.resolver.probe_timeout_ms = v;
        }

        if let Some(v) = env_string("WORK_DIR") {
            config.pipeline.work_dir = v.into();
        }
        if let Some(v) = env_string("OUTPUT_DIR") {
            config.pipeline.output_dir = v.into();
        }
        if let Some(v) = env_parse("TARGET_DURATION_SECS") {
            config.pipeline.target_duration_secs = v;
        }

        if let Some(v) = env_string("PUBLISH_UPLOAD_URL") {
            config.publish.upload_url = v;
        }
        if let Some(v) = env_string("PUBLISH_SUCCESS_FRAGMENT") {
            config.publish.success_url_fragment = v;
        }

        if let Some(v) = env_parse("SESSION_MAX_ATTEMPTS") {
            config.supervisor.session_retry.max_attempts = v;
        }
        if let Some(v) = env_parse("SESSION_RETRY_DELAY_MS") {
            config.supervisor.session_retry.delay_ms = v;
        }
        if let Some(v) = env_parse::<u64>("HEARTBEAT_INTERVAL_SECS") {
            config.supervisor.heartbeat_interval_ms = v * 1000;
        }
        if let Some(v) = env_parse("LOG_BUFFER_CAPACITY") {
            config.supervisor.log_capacity = v;
        }

        if let Some(v) = env_string("API_BIND_ADDRESS") {
            config.api.bind_address = v;
        }
        if let Some(v) = env_parse("API_PORT") {
            config.api.port = v;
        }

        config
    }
}
