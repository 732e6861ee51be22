//! A running tenant unit: detection loop, consumer and heartbeat.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{Collaborators, EventSink, UnitEvent};
use crate::domain::Tenant;
use crate::monitor::{DetectionLoop, MonitorState};
use crate::pipeline::{Consumer, JobSender, job_queue};
use crate::{Error, Result};

/// Everything a unit needs for one run.
pub struct UnitContext {
    pub tenant: Arc<Tenant>,
    pub session_endpoint: String,
    pub collaborators: Collaborators,
    pub detection_period: Duration,
    pub heartbeat_interval: Duration,
    pub events: EventSink,
}

fn validate(tenant: &Tenant) -> Result<()> {
    if tenant.credential.trim().is_empty() {
        return Err(Error::config(format!("tenant {} has no API key", tenant.id)));
    }
    if tenant.sources.is_empty() {
        return Err(Error::config(format!(
            "tenant {} has no sources to monitor",
            tenant.id
        )));
    }
    Ok(())
}

async fn heartbeat(
    events: EventSink,
    jobs: JobSender,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                events.emit(UnitEvent::Heartbeat {
                    at: Utc::now(),
                    queue_depth: jobs.depth(),
                });
            }
        }
    }
}

/// Run a tenant unit until `cancel_token` fires.
///
/// Returns an error only when the unit cannot start (invalid tenant, publish
/// surface unavailable). Job and detection failures never end the unit.
pub async fn run_unit(ctx: UnitContext, cancel_token: CancellationToken) -> Result<()> {
    let UnitContext {
        tenant,
        session_endpoint,
        collaborators,
        detection_period,
        heartbeat_interval,
        events,
    } = ctx;

    validate(&tenant)?;

    events.info(format!(
        "Starting unit: API key {}, {} source(s): {}",
        tenant.masked_credential(),
        tenant.sources.len(),
        tenant.sources.join(", ")
    ));

    let surface = tokio::select! {
        _ = cancel_token.cancelled() => return Ok(()),
        surface = collaborators.surfaces.open(&session_endpoint) => surface?,
    };
    events.info("Publish surface ready");

    let (jobs_tx, jobs_rx) = job_queue();

    let detection = DetectionLoop::new(
        tenant.clone(),
        collaborators.source.clone(),
        MonitorState::new(Utc::now()),
        detection_period,
        jobs_tx.clone(),
        events.clone(),
    );
    let consumer = Consumer::new(collaborators.stages.clone(), jobs_rx, surface, events.clone());

    tokio::join!(
        detection.run(cancel_token.clone()),
        consumer.run(cancel_token.clone()),
        heartbeat(events.clone(), jobs_tx, heartbeat_interval, cancel_token.clone()),
    );

    events.info("Unit stopped");
    Ok(())
}
