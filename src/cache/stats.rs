//! Cache Statistics Module
//!
//! Snapshot of the cache table's occupancy.

use serde::Serialize;

// == Cache Stats ==
/// Row counts of a cache table at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Rows physically present, expired or not
    pub total_entries: usize,
    /// Rows present but already expired (awaiting cull)
    pub expired_entries: usize,
    /// Configured soft cap on rows
    pub max_entries: usize,
}

impl CacheStats {
    /// Rows a `get` would still return.
    pub fn live_entries(&self) -> usize {
        self.total_entries.saturating_sub(self.expired_entries)
    }

    /// Fraction of the cap in use, counting expired rows.
    pub fn fill_ratio(&self) -> f64 {
        if self.max_entries == 0 {
            0.0
        } else {
            self.total_entries as f64 / self.max_entries as f64
        }
    }
}
