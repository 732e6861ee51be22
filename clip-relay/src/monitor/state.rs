//! Per-tenant detection state: the publish cutoff and the items already seen.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::SourceItem;

/// Deduplication state of one tenant's detection loop.
///
/// Only items published after the cutoff are eligible, and each item id is
/// accepted at most once for the lifetime of the state.
#[derive(Debug, Clone)]
pub struct MonitorState {
    cutoff: DateTime<Utc>,
    seen: HashSet<String>,
}

impl MonitorState {
    pub fn new(cutoff: DateTime<Utc>) -> Self {
        Self {
            cutoff,
            seen: HashSet::new(),
        }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// Returns `true` (and remembers the item) if it should be enqueued.
    pub fn accept(&mut self, item: &SourceItem) -> bool {
        item.published_at > self.cutoff && self.seen.insert(item.id.clone())
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
