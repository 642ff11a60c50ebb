//! A/B comparison of strategies per task class
//!
//! The first strategy observed for a class becomes its control. Winners
//! are reported only; promotion is left to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbThresholds {
    pub min_control_samples: usize,
    pub min_variant_samples: usize,
    /// Required relative lead over the control mean, e.g. 0.10
    pub improvement: f64,
}

impl Default for AbThresholds {
    fn default() -> Self {
        Self {
            min_control_samples: 5,
            min_variant_samples: 3,
            improvement: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbExperiment {
    pub task_class: String,
    pub control_strategy: String,
    pub control: Vec<f64>,
    pub variants: BTreeMap<String, Vec<f64>>,
    pub created_at: DateTime<Utc>,
}

impl AbExperiment {
    fn new(task_class: &str, control_strategy: &str) -> Self {
        Self {
            task_class: task_class.to_string(),
            control_strategy: control_strategy.to_string(),
            control: Vec::new(),
            variants: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    fn record(&mut self, strategy: &str, reward: f64) {
        if strategy == self.control_strategy {
            self.control.push(reward);
        } else {
            self.variants.entry(strategy.to_string()).or_default().push(reward);
        }
    }

    /// Variants beating the control, best mean first
    pub fn winners(&self, thresholds: &AbThresholds) -> Vec<AbWinner> {
        if self.control.len() < thresholds.min_control_samples {
            return Vec::new();
        }
        let control_mean = mean(&self.control);

        let mut winners: Vec<AbWinner> = self
            .variants
            .iter()
            .filter(|(_, samples)| samples.len() >= thresholds.min_variant_samples)
            .filter_map(|(strategy, samples)| {
                let variant_mean = mean(samples);
                (variant_mean > control_mean * (1.0 + thresholds.improvement)).then(|| AbWinner {
                    task_class: self.task_class.clone(),
                    strategy: strategy.clone(),
                    variant_mean,
                    control_mean,
                    improvement: variant_mean - control_mean,
                    samples: samples.len(),
                })
            })
            .collect();

        winners.sort_by(|a, b| b.variant_mean.total_cmp(&a.variant_mean));
        winners
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbWinner {
    pub task_class: String,
    pub strategy: String,
    pub variant_mean: f64,
    pub control_mean: f64,
    pub improvement: f64,
    pub samples: usize,
}

/// Experiments keyed by task class
#[derive(Debug, Clone, Default)]
pub struct AbTestRegistry {
    experiments: HashMap<String, AbExperiment>,
    thresholds: AbThresholds,
}

impl AbTestRegistry {
    pub fn new(thresholds: AbThresholds) -> Self {
        Self {
            experiments: HashMap::new(),
            thresholds,
        }
    }

    /// Add one sample; returns the best winner of the class, if any
    pub fn record(&mut self, task_class: &str, strategy: &str, reward: f64) -> Option<AbWinner> {
        let experiment = self
            .experiments
            .entry(task_class.to_string())
            .or_insert_with(|| AbExperiment::new(task_class, strategy));
        experiment.record(strategy, reward);
        experiment.winners(&self.thresholds).into_iter().next()
    }

    pub fn experiment(&self, task_class: &str) -> Option<&AbExperiment> {
        self.experiments.get(task_class)
    }

    /// Current winners across all classes
    pub fn winners(&self) -> Vec<AbWinner> {
        let mut classes: Vec<&String> = self.experiments.keys().collect();
        classes.sort();
        classes
            .into_iter()
            .filter_map(|c| self.experiments.get(c))
            .flat_map(|e| e.winners(&self.thresholds))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_declared_winner() {
        let mut registry = AbTestRegistry::new(AbThresholds::default());
        for _ in 0..5 {
            registry.record("coding", "code", 0.5);
        }
        let mut winner = None;
        for _ in 0..4 {
            winner = registry.record("coding", "code+security", 0.7);
        }

        let winner = winner.unwrap();
        assert_eq!(winner.strategy, "code+security");
        assert!((winner.control_mean - 0.5).abs() < 1e-9);
        assert_eq!(winner.samples, 4);
    }

    #[test]
    fn test_needs_enough_control_samples() {
        let mut registry = AbTestRegistry::new(AbThresholds::default());
        for _ in 0..4 {
            registry.record("research", "research", 0.5);
        }
        for _ in 0..5 {
            assert!(registry.record("research", "analysis", 0.9).is_none());
        }
    }

    #[test]
    fn test_needs_enough_variant_samples() {
        let mut registry = AbTestRegistry::new(AbThresholds::default());
        for _ in 0..5 {
            registry.record("general", "research", 0.5);
        }
        registry.record("general", "creative", 0.9);
        assert!(registry.record("general", "creative", 0.9).is_none());
        assert!(registry.record("general", "creative", 0.9).is_some());
    }

    #[test]
    fn test_margin_is_strict() {
        let mut registry = AbTestRegistry::new(AbThresholds::default());
        for _ in 0..5 {
            registry.record("creative", "creative", 0.5);
        }
        for _ in 0..3 {
            registry.record("creative", "research", 0.54);
        }
        assert!(registry.winners().is_empty());
    }

    #[test]
    fn test_control_is_first_strategy() {
        let mut registry = AbTestRegistry::new(AbThresholds::default());
        registry.record("coding", "code", 0.4);
        registry.record("coding", "research", 0.6);
        registry.record("coding", "code", 0.5);

        let experiment = registry.experiment("coding").unwrap();
        assert_eq!(experiment.control_strategy, "code");
        assert_eq!(experiment.control.len(), 2);
        assert_eq!(experiment.variants["research"].len(), 1);
    }
}
