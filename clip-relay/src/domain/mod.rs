//! Domain types shared by the monitor, pipeline and scheduler layers.

mod job;
mod stats;
mod tenant;

pub use job::{Job, Stage, StageTimings};
pub use stats::{DEFAULT_STATS_WINDOW, Stats};
pub use tenant::{Tenant, TenantStatus};
