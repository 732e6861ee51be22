//! Tenant supervision.
//!
//! - `Supervisor`: actor owning the tenant table and lifecycle
//! - `SupervisorHandle`: cloneable request/reply front end
//! - Tenant units running detection, consumer and heartbeat
//! - Typed unit events, log ring buffers and aggregated stats

mod events;
mod log_buffer;
mod supervisor;
mod unit;

pub use events::{EventSink, LogLevel, SupervisorEvent, UnitEnvelope, UnitEvent};
pub use log_buffer::{LogBuffer, LogEntry};
pub use supervisor::{
    AggregateStats, Collaborators, LoadReport, OpenResult, StartResult, Supervisor,
    SupervisorHandle, TenantSnapshot,
};
pub use unit::{UnitContext, run_unit};
