//! Capability selection
//!
//! Picks the capability set for a subtask from learned strategy scores and
//! memory performance history, recording a decision for every choice.

pub mod selector;

pub use selector::{CapabilitySelector, Candidate, PRE_ASSIGNED_CONFIDENCE, FALLBACK_CONFIDENCE};
