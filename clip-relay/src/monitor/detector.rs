//! Per-tenant detection loop.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{MonitorState, SourceClient};
use crate::domain::{Job, Tenant};
use crate::pipeline::JobSender;
use crate::scheduler::{EventSink, UnitEvent};

/// Polls every source of one tenant and enqueues newly published items.
pub struct DetectionLoop {
    tenant: Arc<Tenant>,
    source: Arc<dyn SourceClient>,
    state: MonitorState,
    period: Duration,
    jobs: JobSender,
    events: EventSink,
}

impl DetectionLoop {
    pub fn new(
        tenant: Arc<Tenant>,
        source: Arc<dyn SourceClient>,
        state: MonitorState,
        period: Duration,
        jobs: JobSender,
        events: EventSink,
    ) -> Self {
        Self {
            tenant,
            source,
            state,
            period,
            jobs,
            events,
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Run one detection cycle and return the number of jobs enqueued.
    ///
    /// All sources are queried concurrently; results are applied in source
    /// order, then item order. A failed query counts as an empty listing.
    pub async fn run_cycle(&mut self) -> usize {
        let credential = self.tenant.credential.as_str();
        let queries = self
            .tenant
            .sources
            .iter()
            .map(|source_id| self.source.list_recent_items(credential, source_id));
        let results = join_all(queries).await;

        let mut enqueued = 0;
        for (source_id, result) in self.tenant.sources.iter().zip(results) {
            let items = match result {
                Ok(items) => items,
                Err(e) => {
                    self.events
                        .warn(format!("Source {} query failed: {}", source_id, e));
                    continue;
                }
            };

            debug!(
                tenant = %self.tenant.id,
                source = %source_id,
                count = items.len(),
                "Listed recent items"
            );

            for item in items {
                if !self.state.accept(&item) {
                    continue;
                }

                self.events.info(format!(
                    "New item detected on {}: \"{}\" ({})",
                    source_id, item.title, item.id
                ));
                self.events.emit(UnitEvent::ItemDiscovered {
                    item_id: item.id.clone(),
                    title: item.title.clone(),
                    source_id: source_id.clone(),
                });

                let job = Job::new(item.id, item.title, item.locator, source_id.clone());
                match self.jobs.send(job) {
                    Ok(()) => enqueued += 1,
                    Err(e) => self.events.error(format!("Failed to enqueue job: {}", e)),
                }
            }
        }

        enqueued
    }

    /// Run cycles until cancelled, pacing each to the configured period.
    pub async fn run(mut self, cancel_token: CancellationToken) {
        self.events.info(format!(
            "Detection started for {} source(s), accepting items published after {}",
            self.tenant.sources.len(),
            self.state.cutoff().to_rfc3339()
        ));

        loop {
            let started = Instant::now();

            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = self.run_cycle() => {}
            }

            let pause = self.period.saturating_sub(started.elapsed());
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        debug!(tenant = %self.tenant.id, "Detection loop stopped");
    }
}
