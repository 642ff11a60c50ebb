//! Evolutionary strategy search
//!
//! Each cycle: keep the top half by fitness, pair consecutive survivors
//! (wrapping around) into children whose capability set is the ordered
//! union of both parents truncated to the size cap, then mutate children.
//! Observations arriving between cycles are folded in first, so members
//! carry the most recent decision confidence as fitness.

use crate::catalogue::CapabilityCatalogue;
use crate::types::CapabilitySet;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationMember {
    pub capabilities: CapabilitySet,
    pub fitness: f64,
}

/// Outcome of one evolutionary cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub strategy_name: String,
    pub generation: u64,
    /// Fitness of the last member of the new population
    pub performance_before: f64,
    /// Fitness of the best member of the new population
    pub performance_after: f64,
    /// May be negative; recorded either way
    pub improvement: f64,
    pub best_capabilities: CapabilitySet,
    pub population_size: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StrategyPopulation {
    members: Vec<PopulationMember>,
    pending: Vec<PopulationMember>,
    generation: u64,
    cap: usize,
    max_strategy_size: usize,
    mutation_rate: f64,
}

impl StrategyPopulation {
    pub fn new(cap: usize, max_strategy_size: usize, mutation_rate: f64) -> Self {
        Self {
            members: Vec::new(),
            pending: Vec::new(),
            generation: 0,
            cap: cap.max(2),
            max_strategy_size: max_strategy_size.max(1),
            mutation_rate,
        }
    }

    /// Queue an observed strategy for the next cycle
    pub fn observe(&mut self, capabilities: CapabilitySet, fitness: f64) {
        if capabilities.is_empty() || !fitness.is_finite() {
            return;
        }
        self.pending.push(PopulationMember {
            capabilities,
            fitness,
        });
    }

    /// Run one generation
    ///
    /// The first cycle on an empty population only seeds it and returns None.
    pub fn cycle<R: Rng + ?Sized>(
        &mut self,
        catalogue: &CapabilityCatalogue,
        rng: &mut R,
    ) -> Option<OptimizationResult> {
        self.generation += 1;

        let seeding = self.members.is_empty();
        let pending = std::mem::take(&mut self.pending);
        self.merge(pending);
        if seeding || self.members.is_empty() {
            return None;
        }

        self.members
            .sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
        let keep = (self.members.len() / 2).max(1);
        let survivors: Vec<PopulationMember> = self.members[..keep].to_vec();

        let mut offspring = Vec::with_capacity(keep);
        for (i, first) in survivors.iter().enumerate() {
            let second = &survivors[(i + 1) % keep];
            let mut child = PopulationMember {
                capabilities: first
                    .capabilities
                    .union_truncated(&second.capabilities, self.max_strategy_size),
                fitness: (first.fitness + second.fitness) / 2.0,
            };
            self.mutate(&mut child.capabilities, catalogue, rng);
            offspring.push(child);
        }

        self.members = survivors;
        self.members.extend(offspring);

        let best = self.members.first()?.clone();
        let last_fitness = self.members.last()?.fitness;
        let result = OptimizationResult {
            strategy_name: format!("evolved_gen_{}", self.generation),
            generation: self.generation,
            performance_before: last_fitness,
            performance_after: best.fitness,
            improvement: best.fitness - last_fitness,
            best_capabilities: best.capabilities,
            population_size: self.members.len(),
            timestamp: Utc::now(),
        };

        self.enforce_cap();
        Some(result)
    }

    fn mutate<R: Rng + ?Sized>(
        &self,
        capabilities: &mut CapabilitySet,
        catalogue: &CapabilityCatalogue,
        rng: &mut R,
    ) {
        if rng.gen::<f64>() >= self.mutation_rate {
            return;
        }

        if rng.gen::<f64>() < 0.5 && capabilities.len() < self.max_strategy_size {
            if let Some(choice) = catalogue.random_capability_outside(capabilities, rng) {
                capabilities.push(choice);
            }
        } else if capabilities.len() > 1 {
            capabilities.pop();
        }
    }

    /// Fold observations in: known strategies take the latest fitness
    fn merge(&mut self, observed: Vec<PopulationMember>) {
        for member in observed {
            match self
                .members
                .iter_mut()
                .find(|m| m.capabilities == member.capabilities)
            {
                Some(existing) => existing.fitness = member.fitness,
                None => self.members.push(member),
            }
        }
        self.enforce_cap();
    }

    fn enforce_cap(&mut self) {
        if self.members.len() > self.cap {
            self.members
                .sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
            self.members.truncate(self.cap);
        }
    }

    pub fn members(&self) -> &[PopulationMember] {
        &self.members
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Observations waiting for the next cycle
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
