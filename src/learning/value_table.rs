//! Tabular value learning over a fixed action catalogue
//!
//! Q(s,a) ← Q(s,a) + lr·(r + γ·max_a' Q(s,a') − Q(s,a)), where the max runs
//! over the catalogue actions and the next state is the current state.
//! Action keys are order-insensitive.

use crate::catalogue::CapabilityCatalogue;
use crate::errors::{Result, SymphonyError};
use crate::types::CapabilitySet;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;

#[derive(Debug)]
pub struct ValueTable {
    values: RwLock<HashMap<(String, String), f64>>,
    learning_rate: f64,
    discount_factor: f64,
    epsilon: f64,
}

impl ValueTable {
    pub fn new(learning_rate: f64, discount_factor: f64, epsilon: f64) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            learning_rate,
            discount_factor,
            epsilon,
        }
    }

    /// Value of a cell; unseen cells are 0
    pub fn value(&self, state: &str, action: &CapabilitySet) -> f64 {
        self.values
            .read()
            .get(&(state.to_string(), action.sorted_key()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Apply one temporal-difference update; returns (old, new)
    pub fn update(
        &self,
        state: &str,
        action: &CapabilitySet,
        reward: f64,
        catalogue: &[CapabilitySet],
    ) -> Result<(f64, f64)> {
        if !reward.is_finite() {
            return Err(SymphonyError::LearningUpdate {
                mechanism: "value_learning".to_string(),
                reason: format!("reward {} is not finite", reward),
            });
        }

        let mut values = self.values.write();
        let key = (state.to_string(), action.sorted_key());
        let current = values.get(&key).copied().unwrap_or(0.0);

        let max_next = catalogue
            .iter()
            .map(|a| {
                values
                    .get(&(state.to_string(), a.sorted_key()))
                    .copied()
                    .unwrap_or(0.0)
            })
            .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))))
            .unwrap_or(0.0);

        let updated = current
            + self.learning_rate * (reward + self.discount_factor * max_next - current);
        values.insert(key, updated);
        Ok((current, updated))
    }

    /// Highest-valued catalogue action; ties go to the earlier entry
    pub fn best_action<'a>(&self, state: &str, catalogue: &'a [CapabilitySet]) -> Option<&'a CapabilitySet> {
        let mut best: Option<(&CapabilitySet, f64)> = None;
        for action in catalogue {
            let value = self.value(state, action);
            if best.map_or(true, |(_, b)| value > b) {
                best = Some((action, value));
            }
        }
        best.map(|(action, _)| action)
    }

    /// ε-greedy: a uniformly random catalogue action with probability ε,
    /// else the best one
    pub fn select<'a, R: Rng + ?Sized>(
        &self,
        state: &str,
        catalogue: &'a CapabilityCatalogue,
        rng: &mut R,
    ) -> &'a CapabilitySet {
        if rng.gen::<f64>() < self.epsilon {
            catalogue.random_action(rng)
        } else {
            self.best_action(state, catalogue.actions())
                .unwrap_or_else(|| catalogue.default_set())
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}
