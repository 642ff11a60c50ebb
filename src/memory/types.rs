//! Core data types for the memory store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Metadata key holding a procedural entry's performance score
pub const PERFORMANCE_KEY: &str = "performance";

/// Memory layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLayer {
    /// One entry per completed top-level task
    Episodic,
    /// Knowledge
    Semantic,
    /// Workflows and strategies
    Procedural,
}

/// One stored memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub layer: MemoryLayer,
    pub content: serde_json::Value,
    /// Within [0, 1]
    pub importance: f64,
    pub access_count: u64,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MemoryEntry {
    pub fn new<I, S>(layer: MemoryLayer, content: serde_json::Value, importance: f64, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            layer,
            content,
            importance: crate::types::decision::clamp_unit(importance),
            access_count: 0,
            tags: tags.into_iter().map(Into::into).collect(),
            created_at: now,
            last_accessed: now,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Performance score of a procedural entry
    pub fn performance(&self) -> Option<f64> {
        self.metadata.get(PERFORMANCE_KEY).and_then(|v| v.as_f64())
    }

    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed = now;
    }
}

/// Running success counts for one capability or capability set
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub total: u64,
    pub successful: u64,
    pub partial: u64,
    pub failed: u64,
}

impl PerformanceRecord {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64
        }
    }
}

/// Per-capability and per-capability-set success index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceHistory {
    pub by_capability: HashMap<String, PerformanceRecord>,
    /// Keyed by `CapabilitySet::key`
    pub by_set: HashMap<String, PerformanceRecord>,
}

impl PerformanceHistory {
    pub fn capability(&self, name: &str) -> Option<&PerformanceRecord> {
        self.by_capability.get(name)
    }

    pub fn set(&self, key: &str) -> Option<&PerformanceRecord> {
        self.by_set.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.by_capability.is_empty() && self.by_set.is_empty()
    }
}

/// Memory store sizes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub episodic_size: usize,
    pub semantic_size: usize,
    pub procedural_size: usize,
    pub tasks_tracked: usize,
    pub capabilities_tracked: usize,
    pub strategies_tracked: usize,
}
