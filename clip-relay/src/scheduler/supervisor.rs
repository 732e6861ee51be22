//! Supervisor actor owning every tenant's lifecycle.
//!
//! The tenant table lives inside a single actor task; all mutations arrive as
//! commands on its mailbox and all reads get snapshot copies. Unit activities
//! report through [`UnitEnvelope`]s on a separate channel.
//!
//! Per tenant: `stopped → starting → running → {stopped | error}`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::log_buffer::{LogBuffer, LogEntry};
use super::unit::{UnitContext, run_unit};
use super::{EventSink, LogLevel, SupervisorEvent, UnitEnvelope, UnitEvent};
use crate::browser::{SessionProvider, SurfaceFactory, acquire_with_retry};
use crate::config::{SupervisorConfig, TenantFile};
use crate::domain::{Stats, Tenant, TenantStatus};
use crate::monitor::SourceClient;
use crate::pipeline::PipelineStages;
use crate::{Error, Result};

/// External collaborators shared by every unit.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SourceClient>,
    pub sessions: Arc<dyn SessionProvider>,
    pub surfaces: Arc<dyn SurfaceFactory>,
    pub stages: PipelineStages,
}

/// Read-only view of one tenant.
#[derive(Debug, Clone, Serialize)]
pub struct TenantSnapshot {
    pub id: String,
    pub sources: Vec<String>,
    pub masked_credential: String,
    pub status: TenantStatus,
    pub stats: Stats,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<i64>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub queue_depth: usize,
    pub items_discovered: u64,
    pub session_endpoint: Option<String>,
    /// `false` once the tenant was dropped from configuration while its unit
    /// was still active.
    pub configured: bool,
}

/// Totals across every tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    pub total_tenants: usize,
    pub running_count: usize,
    pub total_count: u64,
    pub failed_count: u64,
    pub completed_today: u64,
    /// Mean over every tenant's windowed samples, in seconds.
    pub global_average_duration_secs: f64,
}

/// Result of replacing the tenant table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped_lines: usize,
    /// Tenants dropped from configuration but kept until their unit stops.
    pub retired: Vec<String>,
    /// Ids that appeared more than once; only the first occurrence is kept.
    pub duplicates: Vec<String>,
}

/// Per-tenant outcome of a bulk start.
#[derive(Debug, Clone, Serialize)]
pub struct StartResult {
    pub tenant_id: String,
    pub started: bool,
    pub error: Option<String>,
}

/// Per-tenant outcome of opening a standalone session.
#[derive(Debug, Clone, Serialize)]
pub struct OpenResult {
    pub tenant_id: String,
    pub endpoint: Option<String>,
    pub error: Option<String>,
}

/// What a unit task ended with.
#[derive(Debug)]
enum UnitExit {
    Finished,
    Failed(String),
    Panicked(String),
    Aborted,
}

impl UnitExit {
    fn from_join(result: std::result::Result<Result<()>, JoinError>) -> Self {
        match result {
            Ok(Ok(())) => UnitExit::Finished,
            Ok(Err(e)) => UnitExit::Failed(e.to_string()),
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                UnitExit::Panicked(message)
            }
            Err(_) => UnitExit::Aborted,
        }
    }
}

/// Handles needed to wait for (or force) a unit's termination.
pub struct StopTicket {
    tenant_id: String,
    unit: Option<(JoinHandle<()>, AbortHandle)>,
}

enum Command {
    LoadTenants {
        tenants: Vec<Tenant>,
        reply: oneshot::Sender<LoadReport>,
    },
    Start {
        tenant_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    OpenSession {
        tenant_id: String,
        reply: oneshot::Sender<Result<String>>,
    },
    Stop {
        tenant_id: String,
        reply: oneshot::Sender<Result<StopTicket>>,
    },
    ListTenants {
        reply: oneshot::Sender<Vec<TenantSnapshot>>,
    },
    GetLogs {
        tenant_id: String,
        reply: oneshot::Sender<Result<Vec<LogEntry>>>,
    },
    GetStats {
        tenant_id: String,
        reply: oneshot::Sender<Result<Stats>>,
    },
    Aggregate {
        reply: oneshot::Sender<AggregateStats>,
    },
    SessionAcquired {
        tenant_id: String,
        run_id: u64,
        result: Result<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    UnitExited {
        tenant_id: String,
        run_id: u64,
        exit: UnitExit,
    },
}

/// Live state of an active run.
struct TenantRuntime {
    tenant: Arc<Tenant>,
    run_id: u64,
    cancel: CancellationToken,
    unit: Option<(JoinHandle<()>, AbortHandle)>,
    started_at: DateTime<Utc>,
    last_heartbeat: Option<DateTime<Utc>>,
    queue_depth: usize,
    items_discovered: u64,
    session_endpoint: Option<String>,
}

/// A tenant known to the supervisor.
///
/// Logs and stats outlive individual runs so that failures stay inspectable.
struct TenantEntry {
    tenant: Arc<Tenant>,
    status: TenantStatus,
    runtime: Option<TenantRuntime>,
    logs: LogBuffer,
    stats: Stats,
    configured: bool,
}

impl TenantEntry {
    fn new(tenant: Tenant, config: &SupervisorConfig) -> Self {
        Self {
            tenant: Arc::new(tenant),
            status: TenantStatus::Stopped,
            runtime: None,
            logs: LogBuffer::new(config.log_capacity),
            stats: Stats::with_window(config.stats_window),
            configured: true,
        }
    }

    fn snapshot(&self) -> TenantSnapshot {
        let runtime = self.runtime.as_ref();
        let tenant = runtime.map(|r| &r.tenant).unwrap_or(&self.tenant);
        TenantSnapshot {
            id: tenant.id.clone(),
            sources: tenant.sources.clone(),
            masked_credential: tenant.masked_credential(),
            status: self.status,
            stats: self.stats.clone(),
            started_at: runtime.map(|r| r.started_at),
            uptime_secs: runtime.map(|r| (Utc::now() - r.started_at).num_seconds()),
            last_heartbeat: runtime.and_then(|r| r.last_heartbeat),
            queue_depth: runtime.map(|r| r.queue_depth).unwrap_or(0),
            items_discovered: runtime.map(|r| r.items_discovered).unwrap_or(0),
            session_endpoint: runtime.and_then(|r| r.session_endpoint.clone()),
            configured: self.configured,
        }
    }
}

/// The supervisor actor.
pub struct Supervisor {
    config: SupervisorConfig,
    detection_period: Duration,
    collaborators: Collaborators,
    entries: Vec<TenantEntry>,
    next_run_id: u64,
    commands: mpsc::UnboundedSender<Command>,
    units: mpsc::UnboundedSender<UnitEnvelope>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    /// Spawn the supervisor actor and return a handle to it.
    ///
    /// The actor stops (cancelling every unit) when `cancel_token` fires.
    pub fn spawn(
        config: SupervisorConfig,
        detection_period: Duration,
        collaborators: Collaborators,
        cancel_token: CancellationToken,
    ) -> SupervisorHandle {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (units, unit_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let handle = SupervisorHandle {
            commands: commands.clone(),
            events: events.clone(),
            shutdown_timeout: config.shutdown_timeout(),
            start_all_delay: config.start_all_delay(),
        };

        let supervisor = Self {
            config,
            detection_period,
            collaborators,
            entries: Vec::new(),
            next_run_id: 1,
            commands,
            units,
            events,
        };
        tokio::spawn(supervisor.run(command_rx, unit_rx, cancel_token));

        handle
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut unit_rx: mpsc::UnboundedReceiver<UnitEnvelope>,
        cancel_token: CancellationToken,
    ) {
        info!("Supervisor started");

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                Some(command) = command_rx.recv() => self.handle_command(command),
                Some(envelope) = unit_rx.recv() => self.handle_unit_event(envelope),
            }
        }

        for entry in &mut self.entries {
            if let Some(runtime) = entry.runtime.take() {
                runtime.cancel.cancel();
            }
        }
        info!("Supervisor stopped");
    }

    fn entry_mut(&mut self, tenant_id: &str) -> Option<&mut TenantEntry> {
        self.entries.iter_mut().find(|e| e.tenant.id == tenant_id)
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::LoadTenants { tenants, reply } => {
                let _ = reply.send(self.load_tenants(tenants));
            }
            Command::Start { tenant_id, reply } => self.start(tenant_id, reply),
            Command::OpenSession { tenant_id, reply } => self.open_session(tenant_id, reply),
            Command::Stop { tenant_id, reply } => {
                let _ = reply.send(self.stop(&tenant_id));
            }
            Command::ListTenants { reply } => {
                let _ = reply.send(self.entries.iter().map(TenantEntry::snapshot).collect());
            }
            Command::GetLogs { tenant_id, reply } => {
                let result = self
                    .entry_mut(&tenant_id)
                    .map(|e| e.logs.snapshot())
                    .ok_or_else(|| Error::not_found("tenant", &tenant_id));
                let _ = reply.send(result);
            }
            Command::GetStats { tenant_id, reply } => {
                let result = self
                    .entry_mut(&tenant_id)
                    .map(|e| e.stats.clone())
                    .ok_or_else(|| Error::not_found("tenant", &tenant_id));
                let _ = reply.send(result);
            }
            Command::Aggregate { reply } => {
                let _ = reply.send(self.aggregate());
            }
            Command::SessionAcquired {
                tenant_id,
                run_id,
                result,
                reply,
            } => {
                let _ = reply.send(self.session_acquired(&tenant_id, run_id, result));
            }
            Command::UnitExited {
                tenant_id,
                run_id,
                exit,
            } => self.unit_exited(&tenant_id, run_id, exit),
        }
    }

    fn load_tenants(&mut self, tenants: Vec<Tenant>) -> LoadReport {
        let mut previous = std::mem::take(&mut self.entries);
        let mut report = LoadReport::default();

        for tenant in tenants {
            if self.entries.iter().any(|e| e.tenant.id == tenant.id) {
                warn!(tenant = %tenant.id, "Duplicate tenant id in configuration, ignoring");
                report.duplicates.push(tenant.id);
                continue;
            }
            report.loaded += 1;
            let entry = match previous.iter().position(|e| e.tenant.id == tenant.id) {
                Some(idx) => {
                    let mut entry = previous.swap_remove(idx);
                    entry.tenant = Arc::new(tenant);
                    entry.configured = true;
                    entry
                }
                None => TenantEntry::new(tenant, &self.config),
            };
            self.entries.push(entry);
        }

        for mut entry in previous {
            if entry.runtime.is_some() {
                warn!(tenant = %entry.tenant.id, "Tenant removed from configuration while active");
                entry.configured = false;
                report.retired.push(entry.tenant.id.clone());
                self.entries.push(entry);
            }
        }

        info!(
            loaded = report.loaded,
            retired = report.retired.len(),
            duplicates = report.duplicates.len(),
            "Tenant table replaced"
        );
        report
    }

    fn start(&mut self, tenant_id: String, reply: oneshot::Sender<Result<()>>) {
        let run_id = self.next_run_id;
        let retry = self.config.session_retry.clone();
        let sessions = self.collaborators.sessions.clone();
        let commands = self.commands.clone();

        let Some(entry) = self.entries.iter_mut().find(|e| e.tenant.id == tenant_id) else {
            let _ = reply.send(Err(Error::not_found("tenant", &tenant_id)));
            return;
        };

        if entry.status.is_active() {
            let _ = reply.send(Err(Error::AlreadyRunning(tenant_id)));
            return;
        }
        if !entry.configured {
            let _ = reply.send(Err(Error::not_found("tenant", &tenant_id)));
            return;
        }

        self.next_run_id += 1;
        let cancel = CancellationToken::new();
        entry.runtime = Some(TenantRuntime {
            tenant: entry.tenant.clone(),
            run_id,
            cancel: cancel.clone(),
            unit: None,
            started_at: Utc::now(),
            last_heartbeat: None,
            queue_depth: 0,
            items_discovered: 0,
            session_endpoint: None,
        });

        Self::set_status(&self.events, entry, TenantStatus::Starting);
        Self::record_log(
            &self.events,
            entry,
            LogLevel::Info,
            "Acquiring remote session".to_string(),
        );

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(Error::Other("start cancelled".to_string())),
                result = acquire_with_retry(
                    sessions.as_ref(),
                    &tenant_id,
                    retry.max_attempts,
                    retry.delay(),
                ) => result,
            };
            let _ = commands.send(Command::SessionAcquired {
                tenant_id,
                run_id,
                result,
                reply,
            });
        });
    }

    /// Acquire a session for a tenant without starting its unit.
    fn open_session(&mut self, tenant_id: String, reply: oneshot::Sender<Result<String>>) {
        let retry = self.config.session_retry.clone();
        let sessions = self.collaborators.sessions.clone();

        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.tenant.id == tenant_id && e.configured)
        else {
            let _ = reply.send(Err(Error::not_found("tenant", &tenant_id)));
            return;
        };

        Self::record_log(
            &self.events,
            entry,
            LogLevel::Info,
            "Opening remote session".to_string(),
        );

        tokio::spawn(async move {
            let result = acquire_with_retry(
                sessions.as_ref(),
                &tenant_id,
                retry.max_attempts,
                retry.delay(),
            )
            .await;
            match &result {
                Ok(endpoint) => info!(tenant = %tenant_id, endpoint = %endpoint, "Session opened"),
                Err(e) => warn!(tenant = %tenant_id, error = %e, "Could not open session"),
            }
            let _ = reply.send(result);
        });
    }

    fn session_acquired(&mut self, tenant_id: &str, run_id: u64, result: Result<String>) -> Result<()> {
        let events = self.events.clone();
        let units = self.units.clone();
        let commands = self.commands.clone();
        let collaborators = self.collaborators.clone();
        let detection_period = self.detection_period;
        let heartbeat_interval = self.config.heartbeat_interval();

        let Some(entry) = self.entries.iter_mut().find(|e| e.tenant.id == tenant_id) else {
            return Err(Error::Other(format!("start of {} was cancelled", tenant_id)));
        };
        let current = entry.runtime.as_ref().is_some_and(|r| r.run_id == run_id);
        if !current {
            return Err(Error::Other(format!("start of {} was cancelled", tenant_id)));
        }

        let endpoint = match result {
            Ok(endpoint) => endpoint,
            Err(e) => {
                entry.runtime = None;
                Self::record_log(
                    &events,
                    entry,
                    LogLevel::Error,
                    format!("Could not open remote session: {}", e),
                );
                Self::set_status(&events, entry, TenantStatus::Stopped);
                let configured = entry.configured;
                if !configured {
                    self.entries.retain(|e| e.tenant.id != tenant_id);
                }
                return Err(e);
            }
        };

        let Some(runtime) = entry.runtime.as_mut() else {
            return Err(Error::Other(format!("start of {} was cancelled", tenant_id)));
        };
        runtime.session_endpoint = Some(endpoint.clone());

        let context = UnitContext {
            tenant: runtime.tenant.clone(),
            session_endpoint: endpoint,
            collaborators,
            detection_period,
            heartbeat_interval,
            events: EventSink::new(tenant_id, run_id, units),
        };

        let inner = tokio::spawn(run_unit(context, runtime.cancel.clone()));
        let abort = inner.abort_handle();
        let watched_id = tenant_id.to_string();
        let watcher = tokio::spawn(async move {
            let exit = UnitExit::from_join(inner.await);
            let _ = commands.send(Command::UnitExited {
                tenant_id: watched_id,
                run_id,
                exit,
            });
        });
        runtime.unit = Some((watcher, abort));

        Self::record_log(&events, entry, LogLevel::Info, "Session ready, unit running".to_string());
        Self::set_status(&events, entry, TenantStatus::Running);
        Ok(())
    }

    fn stop(&mut self, tenant_id: &str) -> Result<StopTicket> {
        let events = self.events.clone();
        let Some(entry) = self.entry_mut(tenant_id) else {
            return Err(Error::not_found("tenant", tenant_id));
        };
        let Some(runtime) = entry.runtime.take() else {
            return Err(Error::not_found("running tenant", tenant_id));
        };

        runtime.cancel.cancel();
        Self::record_log(&events, entry, LogLevel::Info, "Stopped".to_string());
        Self::set_status(&events, entry, TenantStatus::Stopped);

        if !entry.configured {
            self.entries.retain(|e| e.tenant.id != tenant_id);
        }

        Ok(StopTicket {
            tenant_id: tenant_id.to_string(),
            unit: runtime.unit,
        })
    }

    fn unit_exited(&mut self, tenant_id: &str, run_id: u64, exit: UnitExit) {
        let events = self.events.clone();
        let Some(entry) = self.entry_mut(tenant_id) else {
            return;
        };
        if !entry.runtime.as_ref().is_some_and(|r| r.run_id == run_id) {
            debug!(tenant = %tenant_id, run_id, "Ignoring exit of a stopped run");
            return;
        }
        entry.runtime = None;

        let (level, message, status) = match exit {
            UnitExit::Finished => (LogLevel::Info, "Unit finished".to_string(), TenantStatus::Stopped),
            UnitExit::Failed(reason) => (
                LogLevel::Error,
                format!("Unit failed: {}", reason),
                TenantStatus::Error,
            ),
            UnitExit::Panicked(reason) => (
                LogLevel::Error,
                format!("Unit crashed: {}", reason),
                TenantStatus::Error,
            ),
            UnitExit::Aborted => (LogLevel::Warn, "Unit aborted".to_string(), TenantStatus::Error),
        };
        Self::record_log(&events, entry, level, message);
        Self::set_status(&events, entry, status);

        if !entry.configured {
            self.entries.retain(|e| e.tenant.id != tenant_id);
        }
    }

    fn handle_unit_event(&mut self, envelope: UnitEnvelope) {
        let events = self.events.clone();
        let run_id = envelope.run_id;
        let Some(entry) = self.entry_mut(&envelope.tenant_id) else {
            return;
        };
        let Some(runtime) = entry.runtime.as_mut().filter(|r| r.run_id == run_id) else {
            return;
        };

        match envelope.event {
            UnitEvent::Log {
                level,
                message,
                timestamp,
            } => {
                let line = LogEntry {
                    timestamp,
                    level,
                    message,
                };
                let _ = events.send(SupervisorEvent::LogLine {
                    tenant_id: entry.tenant.id.clone(),
                    level: line.level,
                    message: line.message.clone(),
                    timestamp: line.timestamp,
                });
                entry.logs.push(line);
            }
            UnitEvent::ItemDiscovered { .. } => {
                runtime.items_discovered += 1;
            }
            UnitEvent::JobCompleted { total, .. } => {
                entry.stats.record_completion(total);
                Self::broadcast_stats(&events, entry);
            }
            UnitEvent::JobFailed { .. } => {
                entry.stats.record_failure();
                Self::broadcast_stats(&events, entry);
            }
            UnitEvent::Heartbeat { at, queue_depth } => {
                runtime.last_heartbeat = Some(at);
                runtime.queue_depth = queue_depth;
            }
        }
    }

    fn aggregate(&self) -> AggregateStats {
        let mut aggregate = AggregateStats {
            total_tenants: self.entries.iter().filter(|e| e.configured).count(),
            ..Default::default()
        };
        let mut sample_sum = 0.0;
        let mut sample_count = 0usize;

        for entry in &self.entries {
            if entry.status == TenantStatus::Running {
                aggregate.running_count += 1;
            }
            aggregate.total_count += entry.stats.total_count;
            aggregate.failed_count += entry.stats.failed_count;
            aggregate.completed_today += entry.stats.completed_today;
            sample_sum += entry.stats.samples.iter().sum::<f64>();
            sample_count += entry.stats.sample_count();
        }

        if sample_count > 0 {
            aggregate.global_average_duration_secs = sample_sum / sample_count as f64;
        }
        aggregate
    }

    fn set_status(
        events: &broadcast::Sender<SupervisorEvent>,
        entry: &mut TenantEntry,
        status: TenantStatus,
    ) {
        entry.status = status;
        info!(tenant = %entry.tenant.id, status = %status, "Tenant status changed");
        let _ = events.send(SupervisorEvent::Lifecycle {
            tenant_id: entry.tenant.id.clone(),
            status,
            timestamp: Utc::now(),
        });
    }

    /// Log a supervisor-side line for a tenant.
    fn record_log(
        events: &broadcast::Sender<SupervisorEvent>,
        entry: &mut TenantEntry,
        level: LogLevel,
        message: String,
    ) {
        match level {
            LogLevel::Info => info!(tenant = %entry.tenant.id, "{}", message),
            LogLevel::Warn => warn!(tenant = %entry.tenant.id, "{}", message),
            LogLevel::Error => error!(tenant = %entry.tenant.id, "{}", message),
        }
        let line = LogEntry {
            timestamp: Utc::now(),
            level,
            message,
        };
        let _ = events.send(SupervisorEvent::LogLine {
            tenant_id: entry.tenant.id.clone(),
            level,
            message: line.message.clone(),
            timestamp: line.timestamp,
        });
        entry.logs.push(line);
    }

    fn broadcast_stats(events: &broadcast::Sender<SupervisorEvent>, entry: &TenantEntry) {
        let _ = events.send(SupervisorEvent::StatsSnapshot {
            tenant_id: entry.tenant.id.clone(),
            stats: entry.stats.clone(),
        });
    }
}

/// Cloneable handle to the supervisor actor.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SupervisorEvent>,
    shutdown_timeout: Duration,
    start_all_delay: Duration,
}

impl SupervisorHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| Error::SupervisorUnavailable)?;
        rx.await.map_err(|_| Error::SupervisorUnavailable)
    }

    /// Replace the tenant table.
    pub async fn load_tenants(&self, tenants: Vec<Tenant>) -> Result<LoadReport> {
        self.request(|reply| Command::LoadTenants { tenants, reply })
            .await
    }

    /// Replace the tenant table from a parsed profiles file.
    pub async fn load_tenant_file(&self, file: TenantFile) -> Result<LoadReport> {
        let skipped_lines = file.skipped.len();
        let mut report = self.load_tenants(file.tenants).await?;
        report.skipped_lines = skipped_lines;
        Ok(report)
    }

    /// Start a tenant and wait until its session is acquired and its unit
    /// is running.
    pub async fn start(&self, tenant_id: &str) -> Result<()> {
        let tenant_id = tenant_id.to_string();
        self.request(|reply| Command::Start { tenant_id, reply })
            .await?
    }

    /// Open a remote session for a tenant without starting its unit.
    /// Returns the session endpoint.
    pub async fn open_session(&self, tenant_id: &str) -> Result<String> {
        let tenant_id = tenant_id.to_string();
        self.request(|reply| Command::OpenSession { tenant_id, reply })
            .await?
    }

    /// Open sessions for several tenants concurrently.
    pub async fn open_sessions(&self, tenant_ids: &[String]) -> Vec<OpenResult> {
        let outcomes =
            futures::future::join_all(tenant_ids.iter().map(|id| self.open_session(id))).await;
        tenant_ids
            .iter()
            .zip(outcomes)
            .map(|(tenant_id, outcome)| match outcome {
                Ok(endpoint) => OpenResult {
                    tenant_id: tenant_id.clone(),
                    endpoint: Some(endpoint),
                    error: None,
                },
                Err(e) => OpenResult {
                    tenant_id: tenant_id.clone(),
                    endpoint: None,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }

    /// Stop a tenant and wait for its unit to terminate, aborting it after
    /// the shutdown timeout.
    pub async fn stop(&self, tenant_id: &str) -> Result<()> {
        let tenant_id = tenant_id.to_string();
        let ticket = self
            .request(|reply| Command::Stop { tenant_id, reply })
            .await??;
        self.await_termination(ticket).await;
        Ok(())
    }

    async fn await_termination(&self, ticket: StopTicket) {
        let Some((mut watcher, abort)) = ticket.unit else {
            return;
        };

        if tokio::time::timeout(self.shutdown_timeout, &mut watcher)
            .await
            .is_err()
        {
            warn!(
                tenant = %ticket.tenant_id,
                timeout = ?self.shutdown_timeout,
                "Unit did not stop in time, aborting"
            );
            abort.abort();
            let _ = watcher.await;
        }
    }

    /// Stop every active tenant concurrently. Returns how many were stopped.
    pub async fn stop_all(&self) -> Result<usize> {
        let active: Vec<String> = self
            .list_tenants()
            .await?
            .into_iter()
            .filter(|t| t.status.is_active())
            .map(|t| t.id)
            .collect();

        let results = futures::future::join_all(active.iter().map(|id| self.stop(id))).await;
        Ok(results.into_iter().filter(|r| r.is_ok()).count())
    }

    /// Start every configured, inactive tenant one after another.
    pub async fn start_all(&self) -> Result<Vec<StartResult>> {
        let candidates: Vec<String> = self
            .list_tenants()
            .await?
            .into_iter()
            .filter(|t| t.configured && !t.status.is_active())
            .map(|t| t.id)
            .collect();

        let mut results = Vec::with_capacity(candidates.len());
        for (idx, tenant_id) in candidates.into_iter().enumerate() {
            if idx > 0 {
                tokio::time::sleep(self.start_all_delay).await;
            }
            let outcome = self.start(&tenant_id).await;
            results.push(StartResult {
                tenant_id,
                started: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            });
        }
        Ok(results)
    }

    pub async fn list_tenants(&self) -> Result<Vec<TenantSnapshot>> {
        self.request(|reply| Command::ListTenants { reply }).await
    }

    pub async fn get_logs(&self, tenant_id: &str) -> Result<Vec<LogEntry>> {
        let tenant_id = tenant_id.to_string();
        self.request(|reply| Command::GetLogs { tenant_id, reply })
            .await?
    }

    pub async fn get_stats(&self, tenant_id: &str) -> Result<Stats> {
        let tenant_id = tenant_id.to_string();
        self.request(|reply| Command::GetStats { tenant_id, reply })
            .await?
    }

    pub async fn aggregate_stats(&self) -> Result<AggregateStats> {
        self.request(|reply| Command::Aggregate { reply }).await
    }

    /// Subscribe to log, stats and lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }
}
