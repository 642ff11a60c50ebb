//! Coarse task classification used to bucket learning state

use crate::types::Task;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse categorical label derived from a task description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskClass {
    Coding,
    Research,
    Creative,
    General,
}

impl TaskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskClass::Coding => "coding",
            TaskClass::Research => "research",
            TaskClass::Creative => "creative",
            TaskClass::General => "general",
        }
    }
}

impl fmt::Display for TaskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const CODING_KEYWORDS: &[&str] = &["code", "program", "develop"];
const RESEARCH_KEYWORDS: &[&str] = &["research", "analyze", "find"];
const CREATIVE_KEYWORDS: &[&str] = &["create", "design", "write"];

/// Classify by keyword, first matching group wins
pub fn classify(description: &str) -> TaskClass {
    let lower = description.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if mentions(CODING_KEYWORDS) {
        TaskClass::Coding
    } else if mentions(RESEARCH_KEYWORDS) {
        TaskClass::Research
    } else if mentions(CREATIVE_KEYWORDS) {
        TaskClass::Creative
    } else {
        TaskClass::General
    }
}

/// Value-learning state key: `{class}_{priority}`
pub fn state_key(task: &Task) -> String {
    format!("{}_{}", classify(&task.description), task.priority)
}
