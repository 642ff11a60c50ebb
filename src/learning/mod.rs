//! Learning from outcomes
//!
//! - Strategy ledger: moving-average score per capability set
//! - Value table: tabular value learning with ε-greedy selection
//! - Strategy population: evolutionary search over capability sets
//! - A/B registry: control/variant comparison per task class

pub mod ab_test;
pub mod engine;
pub mod evolution;
pub mod ledger;
pub mod value_table;

pub use ab_test::{AbExperiment, AbTestRegistry, AbThresholds, AbWinner};
pub use engine::{LearningEngine, LearningMetrics, LearningReport};
pub use evolution::{OptimizationResult, PopulationMember, StrategyPopulation};
pub use ledger::{StrategyLedger, StrategyRecord};
pub use value_table::ValueTable;
