//! Per-job scratch directories and artifact naming.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::Result;
use crate::utils::filename::sanitize_component;

/// Isolated scratch directory `<root>/<tenant>/<job_id>` for one job.
///
/// The directory is removed by [`JobWorkspace::remove`], or on drop if the
/// job was abandoned before reaching cleanup.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: PathBuf,
    removed: bool,
}

impl JobWorkspace {
    pub async fn create(root: &Path, tenant_id: &str, job_id: &str) -> Result<Self> {
        let dir = root
            .join(sanitize_component(tenant_id))
            .join(sanitize_component(job_id));
        tokio::fs::create_dir_all(&dir).await?;
        debug!(path = %dir.display(), "Created job workspace");
        Ok(Self {
            dir,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path of a file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub async fn remove(mut self) {
        self.removed = true;
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.dir.display(), error = %e, "Failed to remove job workspace");
            }
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}

/// Unique artifact path `<output_dir>/<tenant>_<item>_<unix-millis>.mp4`.
pub fn artifact_path(output_dir: &Path, tenant_id: &str, item_id: &str) -> PathBuf {
    output_dir.join(format!(
        "{}_{}_{}.mp4",
        sanitize_component(tenant_id),
        sanitize_component(item_id),
        Utc::now().timestamp_millis()
    ))
}
