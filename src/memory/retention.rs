//! Retention policy
//!
//! A pure filter over memory entries. For a fixed `now` it is idempotent:
//! anything it keeps, it keeps again.

use crate::memory::types::{MemoryEntry, MemoryLayer};
use chrono::{DateTime, Duration, Utc};

/// Episodic entries above this importance outlive the retention window
pub const EPISODIC_KEEP_IMPORTANCE: f64 = 0.7;

/// Semantic entries accessed more often than this are kept
pub const SEMANTIC_KEEP_ACCESS_COUNT: u64 = 5;

/// Semantic entries above this importance are kept
pub const SEMANTIC_KEEP_IMPORTANCE: f64 = 0.6;

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    window: Duration,
}

impl RetentionPolicy {
    pub fn new(retention_days: i64) -> Self {
        Self {
            window: Duration::days(retention_days.max(0)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether `entry` survives a sweep at `now`
    ///
    /// Procedural entries are never evicted.
    pub fn keep(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> bool {
        match entry.layer {
            MemoryLayer::Episodic => {
                entry.created_at > now - self.window || entry.importance > EPISODIC_KEEP_IMPORTANCE
            }
            MemoryLayer::Semantic => {
                entry.access_count > SEMANTIC_KEEP_ACCESS_COUNT
                    || entry.importance > SEMANTIC_KEEP_IMPORTANCE
            }
            MemoryLayer::Procedural => true,
        }
    }

    /// Entries surviving a sweep at `now`, order preserved
    pub fn evict_at(&self, entries: &[MemoryEntry], now: DateTime<Utc>) -> Vec<MemoryEntry> {
        entries
            .iter()
            .filter(|e| self.keep(e, now))
            .cloned()
            .collect()
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(90)
    }
}
