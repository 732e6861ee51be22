//! Typed events flowing from tenant units to the supervisor and from the
//! supervisor to external observers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::domain::{Stage, StageTimings, Stats, TenantStatus};

/// Severity of a tenant log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Event emitted by an activity inside a tenant unit.
#[derive(Debug, Clone)]
pub enum UnitEvent {
    Log {
        level: LogLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },
    ItemDiscovered {
        item_id: String,
        title: String,
        source_id: String,
    },
    JobCompleted {
        item_id: String,
        title: String,
        timings: StageTimings,
        total: Duration,
        output: PathBuf,
    },
    JobFailed {
        item_id: String,
        stage: Stage,
        reason: String,
    },
    Heartbeat {
        at: DateTime<Utc>,
        queue_depth: usize,
    },
}

/// A [`UnitEvent`] tagged with the unit that produced it.
#[derive(Debug, Clone)]
pub struct UnitEnvelope {
    pub tenant_id: Arc<str>,
    /// Distinguishes successive runs of the same tenant so that late events
    /// from a stopped run are ignored.
    pub run_id: u64,
    pub event: UnitEvent,
}

/// Handle used by unit activities to report logs and events.
///
/// Every log line goes to `tracing` with a `tenant` field and is also
/// forwarded to the supervisor as a typed event. Sending never blocks and
/// never fails the caller; events are dropped once the supervisor is gone.
#[derive(Debug, Clone)]
pub struct EventSink {
    tenant_id: Arc<str>,
    run_id: u64,
    tx: mpsc::UnboundedSender<UnitEnvelope>,
}

impl EventSink {
    pub fn new(
        tenant_id: impl Into<Arc<str>>,
        run_id: u64,
        tx: mpsc::UnboundedSender<UnitEnvelope>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            run_id,
            tx,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn emit(&self, event: UnitEvent) {
        let _ = self.tx.send(UnitEnvelope {
            tenant_id: self.tenant_id.clone(),
            run_id: self.run_id,
            event,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(tenant = %self.tenant_id, "{}", message);
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(tenant = %self.tenant_id, "{}", message);
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(tenant = %self.tenant_id, "{}", message);
        self.log(LogLevel::Error, message);
    }

    fn log(&self, level: LogLevel, message: String) {
        self.emit(UnitEvent::Log {
            level,
            message,
            timestamp: Utc::now(),
        });
    }
}

/// Event broadcast by the supervisor to observers (API event stream).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEvent {
    LogLine {
        tenant_id: String,
        level: LogLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },
    StatsSnapshot {
        tenant_id: String,
        stats: Stats,
    },
    Lifecycle {
        tenant_id: String,
        status: TenantStatus,
        timestamp: DateTime<Utc>,
    },
}
