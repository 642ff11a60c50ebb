//! Capability catalogue
//!
//! The bounded list of known capability names and the fixed action space
//! used by value learning. Declared at startup from configuration, never
//! discovered from runtime data.

use crate::config::CatalogueConfig;
use crate::errors::{Result, SymphonyError};
use crate::types::CapabilitySet;
use rand::seq::SliceRandom;
use rand::Rng;

/// Versioned capability catalogue
#[derive(Debug, Clone)]
pub struct CapabilityCatalogue {
    version: u32,
    capabilities: Vec<String>,
    actions: Vec<CapabilitySet>,
    default_set: CapabilitySet,
}

impl CapabilityCatalogue {
    /// Build from configuration, rejecting actions outside the catalogue
    pub fn from_config(config: &CatalogueConfig) -> Result<Self> {
        let capabilities: Vec<String> = CapabilitySet::new(&config.capabilities).names().to_vec();
        if capabilities.is_empty() {
            return Err(SymphonyError::ConfigError(
                "catalogue must declare at least one capability".to_string(),
            ));
        }

        let mut actions: Vec<CapabilitySet> = Vec::new();
        for raw in &config.actions {
            let action = CapabilitySet::new(raw);
            if action.is_empty() {
                return Err(SymphonyError::ConfigError("empty catalogue action".to_string()));
            }
            if let Some(unknown) = action.iter().find(|c| !capabilities.contains(c)) {
                return Err(SymphonyError::ConfigError(format!(
                    "action references unknown capability '{}'",
                    unknown
                )));
            }
            if !actions.contains(&action) {
                actions.push(action);
            }
        }
        if actions.is_empty() {
            return Err(SymphonyError::ConfigError(
                "catalogue must declare at least one action".to_string(),
            ));
        }

        let default_set = CapabilitySet::single(&config.default_capability);
        if !default_set.iter().all(|c| capabilities.contains(c)) {
            return Err(SymphonyError::ConfigError(format!(
                "default_capability '{}' is not in the catalogue",
                config.default_capability
            )));
        }

        Ok(Self {
            version: config.version,
            capabilities,
            actions,
            default_set,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Fixed action space, in declaration order
    pub fn actions(&self) -> &[CapabilitySet] {
        &self.actions
    }

    /// Fallback single-capability set
    pub fn default_set(&self) -> &CapabilitySet {
        &self.default_set
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Capabilities mentioned in free text, in catalogue order
    ///
    /// Underscored names also match their spaced form ("human interface").
    pub fn find_mentions(&self, text: &str) -> Vec<&str> {
        let lower = text.to_lowercase();
        self.capabilities
            .iter()
            .filter(|c| lower.contains(c.as_str()) || lower.contains(&c.replace('_', " ")))
            .map(|c| c.as_str())
            .collect()
    }

    /// Uniformly random capability not already in `set`
    pub fn random_capability_outside<R: Rng + ?Sized>(
        &self,
        set: &CapabilitySet,
        rng: &mut R,
    ) -> Option<&str> {
        let candidates: Vec<&String> = self
            .capabilities
            .iter()
            .filter(|c| !set.contains(c))
            .collect();
        candidates.choose(rng).map(|c| c.as_str())
    }

    /// Uniformly random catalogue action
    pub fn random_action<R: Rng + ?Sized>(&self, rng: &mut R) -> &CapabilitySet {
        self.actions.choose(rng).unwrap_or(&self.default_set)
    }
}

impl Default for CapabilityCatalogue {
    fn default() -> Self {
        let config = CatalogueConfig::default();
        let caps = config.capabilities.clone();
        Self {
            version: config.version,
            actions: config.actions.iter().map(CapabilitySet::new).collect(),
            default_set: CapabilitySet::single(&config.default_capability),
            capabilities: caps,
        }
    }
}
