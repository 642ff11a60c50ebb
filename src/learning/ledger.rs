//! Strategy ledger: moving-average score per capability set
//!
//! score = α·reward + (1 − α)·previous, initialized to the first reward.

use crate::errors::{Result, SymphonyError};
use crate::types::CapabilitySet;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub capabilities: CapabilitySet,
    pub score: f64,
    pub samples: u64,
    pub updated_at: DateTime<Utc>,
}

/// Shared ledger, one lock for all records
#[derive(Debug, Default)]
pub struct StrategyLedger {
    records: RwLock<HashMap<String, StrategyRecord>>,
}

impl StrategyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `reward` into the score of `capabilities`; returns the new score
    pub fn update(&self, capabilities: &CapabilitySet, reward: f64, alpha: f64) -> Result<f64> {
        if !reward.is_finite() {
            return Err(SymphonyError::LearningUpdate {
                mechanism: "moving_average".to_string(),
                reason: format!("reward {} is not finite", reward),
            });
        }
        if capabilities.is_empty() {
            return Err(SymphonyError::LearningUpdate {
                mechanism: "moving_average".to_string(),
                reason: "empty capability set".to_string(),
            });
        }

        let mut records = self.records.write();
        let record = records
            .entry(capabilities.key())
            .and_modify(|r| {
                r.score = alpha * reward + (1.0 - alpha) * r.score;
                r.samples += 1;
                r.updated_at = Utc::now();
            })
            .or_insert_with(|| StrategyRecord {
                capabilities: capabilities.clone(),
                score: reward,
                samples: 1,
                updated_at: Utc::now(),
            });
        Ok(record.score)
    }

    pub fn get(&self, capabilities: &CapabilitySet) -> Option<StrategyRecord> {
        self.records.read().get(&capabilities.key()).cloned()
    }

    pub fn score(&self, capabilities: &CapabilitySet) -> Option<f64> {
        self.records.read().get(&capabilities.key()).map(|r| r.score)
    }

    /// All records, best score first
    pub fn snapshot(&self) -> Vec<StrategyRecord> {
        let mut records: Vec<StrategyRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.capabilities.cmp(&b.capabilities))
        });
        records
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
