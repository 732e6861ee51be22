//! Publish stage: drive a publish surface to a confirmed publish.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::config::PublishConfig;
use crate::{Error, Result};

/// Interactive publish surface owned by exactly one consumer.
#[async_trait]
pub trait PublishSurface: Send {
    /// Attach a local file to the upload input.
    async fn inject_file(&mut self, path: &Path) -> Result<()>;

    /// Whether the submit control is visible and enabled.
    async fn is_submittable(&mut self) -> Result<bool>;

    async fn submit(&mut self) -> Result<()>;

    /// Whether the surface shows the publish success signal.
    async fn is_published(&mut self) -> Result<bool>;

    /// Return to the upload page, ready for the next file.
    async fn reset(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
enum Condition {
    Submittable,
    Published,
}

/// Polling policy around a [`PublishSurface`].
#[derive(Debug, Clone)]
pub struct Publisher {
    poll_interval: Duration,
    ready_timeout: Duration,
    success_timeout: Duration,
    reset_timeout: Duration,
}

impl Publisher {
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            ready_timeout: config.ready_timeout(),
            success_timeout: config.success_timeout(),
            reset_timeout: config.reset_timeout(),
        }
    }

    /// Inject `file`, wait for the submit control, submit and wait for the
    /// success signal.
    pub async fn publish(&self, surface: &mut dyn PublishSurface, file: &Path) -> Result<()> {
        surface
            .inject_file(file)
            .await
            .map_err(|e| Error::publish(format!("file injection failed: {}", e)))?;

        self.wait_for(surface, Condition::Submittable, self.ready_timeout)
            .await?;

        surface
            .submit()
            .await
            .map_err(|e| Error::publish(format!("submit failed: {}", e)))?;

        self.wait_for(surface, Condition::Published, self.success_timeout)
            .await
    }

    /// Reset the surface, bounded by the reset timeout.
    pub async fn reset(&self, surface: &mut dyn PublishSurface) -> Result<()> {
        match tokio::time::timeout(self.reset_timeout, surface.reset()).await {
            Ok(result) => result,
            Err(_) => Err(Error::publish(format!(
                "surface reset timed out after {:?}",
                self.reset_timeout
            ))),
        }
    }

    async fn wait_for(
        &self,
        surface: &mut dyn PublishSurface,
        condition: Condition,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut last_error: Option<String> = None;

        loop {
            let probe = match condition {
                Condition::Submittable => surface.is_submittable().await,
                Condition::Published => surface.is_published().await,
            };

            match probe {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => {
                    // The page may be mid-navigation; keep polling until the deadline.
                    debug!(condition = ?condition, error = %e, "Surface probe failed");
                    last_error = Some(e.to_string());
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let what = match condition {
                    Condition::Submittable => "submit control did not become available",
                    Condition::Published => "publish was not confirmed",
                };
                let detail = last_error
                    .map(|e| format!(" (last error: {})", e))
                    .unwrap_or_default();
                return Err(Error::publish(format!(
                    "{} within {:?}{}",
                    what, timeout, detail
                )));
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
