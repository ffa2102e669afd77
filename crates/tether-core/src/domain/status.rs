//! Status views (serializable snapshots for logs and the CLI).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TargetId;

/// Per active object counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStats {
    /// Operations accepted into the mailbox.
    pub dispatched: u64,
    /// Operations that ran to completion (including the ones that panicked).
    pub completed: u64,
    pub panicked: u64,
}

impl TargetStats {
    /// Accepted but not yet finished.
    pub fn pending(&self) -> u64 {
        self.dispatched.saturating_sub(self.completed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStatus {
    pub id: TargetId,
    pub name: String,
    pub spawned_at: DateTime<Utc>,
    pub stats: TargetStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostStatus {
    /// Sorted by id, i.e. by spawn time.
    pub targets: Vec<TargetStatus>,
    /// Targets retired over the host's lifetime.
    pub retired: usize,
}

impl HostStatus {
    pub fn live(&self) -> usize {
        self.targets.len()
    }
}
