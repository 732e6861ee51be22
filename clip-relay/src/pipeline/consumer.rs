//! Per-tenant job consumer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    Acquirer, JobReceiver, JobWorkspace, NormalizeOutcome, Normalizer, PublishSurface, Publisher,
    artifact_path,
};
use crate::Error;
use crate::domain::{Job, Stage, StageTimings};
use crate::resolver::{ResolvedMedia, Resolver};
use crate::scheduler::{EventSink, UnitEvent};

/// Shared, stateless pipeline stages.
#[derive(Clone)]
pub struct PipelineStages {
    pub resolver: Arc<Resolver>,
    pub acquirer: Arc<Acquirer>,
    pub normalizer: Arc<Normalizer>,
    pub publisher: Publisher,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Outcome of one job.
#[derive(Debug)]
pub enum JobOutcome {
    Completed {
        output: PathBuf,
        timings: StageTimings,
        total: Duration,
    },
    Failed {
        stage: Stage,
        error: Error,
    },
}

/// Drains one tenant's job queue sequentially.
///
/// Owns the tenant's publish surface for its whole life; nothing else may
/// drive it.
pub struct Consumer {
    stages: PipelineStages,
    jobs: JobReceiver,
    surface: Box<dyn PublishSurface>,
    events: EventSink,
}

impl Consumer {
    pub fn new(
        stages: PipelineStages,
        jobs: JobReceiver,
        surface: Box<dyn PublishSurface>,
        events: EventSink,
    ) -> Self {
        Self {
            stages,
            jobs,
            surface,
            events,
        }
    }

    /// Process jobs until cancelled or until the queue closes.
    ///
    /// A job in flight when cancellation fires is dropped; its child
    /// processes are killed and its workspace removed.
    pub async fn run(mut self, cancel_token: CancellationToken) {
        loop {
            let job = tokio::select! {
                _ = cancel_token.cancelled() => break,
                job = self.jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = self.process(job) => {}
            }
        }

        debug!(tenant = %self.events.tenant_id(), "Consumer stopped");
    }

    /// Run one job through every stage, report the outcome and reset the
    /// surface.
    pub async fn process(&mut self, job: Job) -> JobOutcome {
        self.events.info(format!(
            "Processing \"{}\" ({}), {} job(s) waiting",
            job.title,
            job.item_id,
            self.jobs.depth()
        ));

        let started = Instant::now();
        let mut timings = StageTimings::default();
        let result = self.run_stages(&job, &mut timings).await;

        if let Err(e) = self.stages.publisher.reset(self.surface.as_mut()).await {
            self.events.warn(format!("Publish surface reset failed: {}", e));
        }

        match result {
            Ok(output) => {
                let total = started.elapsed();
                self.events.info(format!(
                    "Published \"{}\" in {:.1}s ({})",
                    job.title,
                    total.as_secs_f64(),
                    timings
                ));
                self.events.emit(UnitEvent::JobCompleted {
                    item_id: job.item_id.clone(),
                    title: job.title.clone(),
                    timings,
                    total,
                    output: output.clone(),
                });
                JobOutcome::Completed {
                    output,
                    timings,
                    total,
                }
            }
            Err((stage, error)) => {
                self.events.error(format!(
                    "Job for \"{}\" ({}) failed at {}: {}",
                    job.title, job.item_id, stage, error
                ));
                self.events.emit(UnitEvent::JobFailed {
                    item_id: job.item_id.clone(),
                    stage,
                    reason: error.to_string(),
                });
                JobOutcome::Failed { stage, error }
            }
        }
    }

    async fn run_stages(
        &mut self,
        job: &Job,
        timings: &mut StageTimings,
    ) -> Result<PathBuf, (Stage, Error)> {
        let stage_start = Instant::now();
        let resolved = self
            .stages
            .resolver
            .resolve(&job.locator)
            .await
            .map_err(|e| (Stage::Resolve, e))?;
        timings.record(Stage::Resolve, stage_start.elapsed());
        debug!(
            tenant = %self.events.tenant_id(),
            split = matches!(resolved, ResolvedMedia::Split { .. }),
            "Resolved stream"
        );

        let workspace =
            JobWorkspace::create(&self.stages.work_dir, self.events.tenant_id(), &job.id)
                .await
                .map_err(|e| (Stage::Acquire, e.in_stage(Stage::Acquire)))?;

        let result = self.run_file_stages(job, &resolved, &workspace, timings).await;
        workspace.remove().await;
        result
    }

    async fn run_file_stages(
        &mut self,
        job: &Job,
        resolved: &ResolvedMedia,
        workspace: &JobWorkspace,
        timings: &mut StageTimings,
    ) -> Result<PathBuf, (Stage, Error)> {
        let stage_start = Instant::now();
        let source = self
            .stages
            .acquirer
            .acquire(resolved, workspace)
            .await
            .map_err(|e| (Stage::Acquire, e))?;
        timings.record(Stage::Acquire, stage_start.elapsed());

        let stage_start = Instant::now();
        let output = artifact_path(
            &self.stages.output_dir,
            self.events.tenant_id(),
            &job.item_id,
        );
        let outcome = self
            .stages
            .normalizer
            .normalize(&source, &output)
            .await
            .map_err(|e| (Stage::Normalize, e))?;
        timings.record(Stage::Normalize, stage_start.elapsed());
        if let NormalizeOutcome::Looped {
            duration_secs,
            repeats,
        } = outcome
        {
            self.events.info(format!(
                "Source is {:.1}s, looped {}x to {}s",
                duration_secs,
                repeats,
                self.stages.normalizer.target().as_secs()
            ));
        }

        let stage_start = Instant::now();
        self.stages
            .publisher
            .publish(self.surface.as_mut(), &output)
            .await
            .map_err(|e| (Stage::Publish, e.in_stage(Stage::Publish)))?;
        timings.record(Stage::Publish, stage_start.elapsed());

        Ok(output)
    }
}
