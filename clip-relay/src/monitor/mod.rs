//! Source monitoring.
//!
//! - Querying content sources for recent items
//! - Per-tenant cutoff and seen-set deduplication
//! - The paced detection loop feeding the job queue

mod detector;
mod source;
mod state;

pub use detector::DetectionLoop;
pub use source::{SourceClient, SourceItem, YoutubeSource, watch_locator};
pub use state::MonitorState;
