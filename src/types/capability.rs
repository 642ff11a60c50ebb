//! Capability sets
//!
//! A capability set is the ordered, deduplicated list of capability names
//! chosen to handle one subtask. It doubles as the strategy key for the
//! learning ledgers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used when a capability set is rendered as a ledger key
const KEY_SEPARATOR: &str = "+";

/// Ordered, deduplicated set of capability names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct CapabilitySet(Vec<String>);

impl CapabilitySet {
    /// Build a set, keeping first occurrences and dropping blanks
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self(Vec::new());
        for name in names {
            set.push(name.as_ref());
        }
        set
    }

    /// Single-capability set
    pub fn single(name: &str) -> Self {
        Self::new([name])
    }

    /// Append a capability if it is not already present
    ///
    /// Returns true when the set grew.
    pub fn push(&mut self, name: &str) -> bool {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() || self.contains(&normalized) {
            return false;
        }
        self.0.push(normalized);
        true
    }

    /// Remove the last capability
    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    /// Union preserving order (self first), truncated to `max_size`
    pub fn union_truncated(&self, other: &CapabilitySet, max_size: usize) -> CapabilitySet {
        let mut child = self.clone();
        for name in other.iter() {
            child.push(name);
        }
        child.0.truncate(max_size);
        child
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|c| c == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Ledger key, e.g. `research+analysis`
    pub fn key(&self) -> String {
        self.0.join(KEY_SEPARATOR)
    }

    /// Order-insensitive key used to bucket A/B strategies
    pub fn sorted_key(&self) -> String {
        let mut names = self.0.clone();
        names.sort();
        names.join(KEY_SEPARATOR)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl<S: AsRef<str>> FromIterator<S> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_and_order() {
        let set = CapabilitySet::new(["Research", "analysis", "research", " "]);
        assert_eq!(set.names(), &["research".to_string(), "analysis".to_string()]);
        assert_eq!(set.key(), "research+analysis");
    }

    #[test]
    fn test_union_truncated() {
        let a = CapabilitySet::new(["code", "security"]);
        let b = CapabilitySet::new(["security", "analysis", "research"]);
        let child = a.union_truncated(&b, 3);
        assert_eq!(child.key(), "code+security+analysis");
    }

    #[test]
    fn test_sorted_key_is_order_insensitive() {
        let a = CapabilitySet::new(["code", "analysis"]);
        let b = CapabilitySet::new(["analysis", "code"]);
        assert_ne!(a.key(), b.key());
        assert_eq!(a.sorted_key(), b.sorted_key());
    }
}
