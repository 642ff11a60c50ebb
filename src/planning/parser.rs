//! Best-effort extraction of a step list from generated text
//!
//! Recognition order, first hit wins:
//! 1. a JSON array of step objects anywhere in the text
//! 2. marker lines (`Step 1: ...`, `Task: ...`, `Schritt 2 ...`) with
//!    capability, priority and dependency hints on the same or following lines
//! 3. a single fallback step built from a bounded prefix of the raw text
//!
//! Parsing never fails. Dependencies only ever point at earlier steps, so
//! every extracted plan is acyclic.

use crate::catalogue::CapabilityCatalogue;
use crate::types::TaskPriority;
use serde::Deserialize;
use tracing::{debug, warn};

/// Upper bound on the fallback description, in characters
pub const FALLBACK_PREFIX_CHARS: usize = 200;

/// Maximum number of subtasks kept from one plan
pub const MAX_SUBTASKS: usize = 12;

/// Keywords that open a new step when they lead a line
const MARKERS: &[&str] = &["task", "step", "subtask", "aufgabe", "schritt"];

/// Phrases after which step numbers are read as dependencies
const DEPENDENCY_PHRASES: &[&str] = &[
    "depends on",
    "depends_on",
    "dependencies",
    "after step",
    "after task",
    "requires step",
];

/// One extracted step
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub description: String,
    /// Catalogue capability recognized in the text
    pub capability: Option<String>,
    pub priority: TaskPriority,
    /// Zero-based indices of earlier steps
    pub depends_on: Vec<usize>,
}

impl PlannedStep {
    fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            capability: None,
            priority: TaskPriority::Medium,
            depends_on: Vec::new(),
        }
    }
}

/// Typed extraction result: structured steps, or the degraded single step
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPlan {
    Structured(Vec<PlannedStep>),
    Fallback(PlannedStep),
}

impl ParsedPlan {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedPlan::Fallback(_))
    }

    pub fn len(&self) -> usize {
        match self {
            ParsedPlan::Structured(steps) => steps.len(),
            ParsedPlan::Fallback(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_steps(self) -> Vec<PlannedStep> {
        match self {
            ParsedPlan::Structured(steps) => steps,
            ParsedPlan::Fallback(step) => vec![step],
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default, alias = "task", alias = "step")]
    description: String,
    #[serde(default, alias = "agent")]
    capability: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    /// One-based step numbers
    #[serde(default, alias = "dependencies")]
    depends_on: Vec<usize>,
}

/// Step extractor bound to a capability catalogue
pub struct PlanParser<'a> {
    catalogue: &'a CapabilityCatalogue,
    max_steps: usize,
}

impl<'a> PlanParser<'a> {
    pub fn new(catalogue: &'a CapabilityCatalogue) -> Self {
        Self {
            catalogue,
            max_steps: MAX_SUBTASKS,
        }
    }

    /// Extract steps from `raw`; `fallback_description` is used only when
    /// the raw text is blank
    pub fn parse(&self, raw: &str, fallback_description: &str) -> ParsedPlan {
        let structured = self
            .parse_json(raw)
            .or_else(|| self.parse_markers(raw));

        match structured {
            Some(mut steps) => {
                if steps.len() > self.max_steps {
                    warn!(
                        extracted = steps.len(),
                        kept = self.max_steps,
                        "plan exceeds subtask limit, dropping excess steps"
                    );
                    steps.truncate(self.max_steps);
                }
                debug!(steps = steps.len(), "structured plan extracted");
                ParsedPlan::Structured(steps)
            }
            None => {
                warn!(chars = raw.chars().count(), "no step markers recognized, using single-step plan");
                ParsedPlan::Fallback(fallback_step(raw, fallback_description))
            }
        }
    }

    fn parse_json(&self, raw: &str) -> Option<Vec<PlannedStep>> {
        let start = raw.find('[')?;
        let end = raw.rfind(']')?;
        if end <= start {
            return None;
        }

        let raw_steps: Vec<RawStep> = serde_json::from_str(&raw[start..=end]).ok()?;

        // Position in the raw list -> index among kept steps
        let mut positions: Vec<Option<usize>> = Vec::with_capacity(raw_steps.len());
        let mut steps: Vec<PlannedStep> = Vec::new();

        for raw_step in raw_steps {
            let description = raw_step.description.trim();
            if description.is_empty() {
                positions.push(None);
                continue;
            }

            let index = steps.len();
            let mut step = PlannedStep::new(description);
            step.capability = raw_step
                .capability
                .map(|c| c.trim().to_lowercase())
                .filter(|c| self.catalogue.contains(c));
            step.priority = raw_step
                .priority
                .and_then(|p| p.parse().ok())
                .unwrap_or_default();

            let mapped = raw_step
                .depends_on
                .iter()
                .filter_map(|n| n.checked_sub(1))
                .filter_map(|pos| positions.get(pos).copied().flatten());
            add_dependencies(&mut step, mapped, index);

            positions.push(Some(index));
            steps.push(step);
        }

        (!steps.is_empty()).then_some(steps)
    }

    fn parse_markers(&self, raw: &str) -> Option<Vec<PlannedStep>> {
        let mut steps: Vec<PlannedStep> = Vec::new();

        for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(rest) = strip_marker(line) {
                let description = if rest.is_empty() { line } else { rest };
                let mut step = PlannedStep::new(description);
                self.apply_hints(&mut step, line, steps.len());
                steps.push(step);
            } else if let Some(index) = steps.len().checked_sub(1) {
                self.apply_hints(&mut steps[index], line, index);
            }
        }

        (!steps.is_empty()).then_some(steps)
    }

    fn apply_hints(&self, step: &mut PlannedStep, line: &str, index: usize) {
        if step.capability.is_none() {
            step.capability = self
                .catalogue
                .find_mentions(line)
                .first()
                .map(|c| c.to_string());
        }

        if let Some(priority) = priority_hint(line) {
            step.priority = priority;
        }

        let referenced = dependency_hint(line)
            .into_iter()
            .filter_map(|n| n.checked_sub(1));
        add_dependencies(step, referenced, index);
    }
}

/// Strip a leading marker keyword and its numbering; None if the line has no marker
fn strip_marker(line: &str) -> Option<&str> {
    let body = line.trim_start_matches(|c: char| {
        c.is_ascii_digit() || matches!(c, '-' | '*' | '#' | '.' | ')' | ' ' | '\t')
    });

    let word_end = body.find(|c: char| !c.is_alphabetic()).unwrap_or(body.len());
    let word = body[..word_end].to_lowercase();
    if !MARKERS.contains(&word.as_str()) {
        return None;
    }

    let rest = body[word_end..].trim_start_matches(|c: char| {
        c.is_ascii_digit() || matches!(c, ':' | '.' | ')' | '-' | '*' | '#' | ' ' | '\t')
    });
    Some(rest.trim_end_matches('*').trim())
}

/// `priority: high`, `priority high` or `high priority`
fn priority_hint(line: &str) -> Option<TaskPriority> {
    let lower = line.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    tokens.iter().enumerate().find_map(|(i, token)| {
        if *token != "priority" {
            return None;
        }
        let after = tokens.get(i + 1).and_then(|t| t.parse().ok());
        let before = i
            .checked_sub(1)
            .and_then(|j| tokens.get(j))
            .and_then(|t| t.parse().ok());
        after.or(before)
    })
}

/// One-based step numbers following a dependency phrase
fn dependency_hint(line: &str) -> Vec<usize> {
    let lower = line.to_lowercase();
    let Some(start) = DEPENDENCY_PHRASES
        .iter()
        .filter_map(|phrase| lower.find(phrase).map(|pos| pos + phrase.len()))
        .min()
    else {
        return Vec::new();
    };

    lower[start..]
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|n| n.parse().ok())
        .collect()
}

/// Keep only references to earlier steps, deduplicated and sorted
fn add_dependencies(step: &mut PlannedStep, referenced: impl Iterator<Item = usize>, index: usize) {
    for dep in referenced.filter(|d| *d < index) {
        if !step.depends_on.contains(&dep) {
            step.depends_on.push(dep);
        }
    }
    step.depends_on.sort_unstable();
}

/// Bounded prefix of the untrimmed backend text
fn fallback_step(raw: &str, fallback_description: &str) -> PlannedStep {
    let source = if raw.trim().is_empty() {
        fallback_description.trim()
    } else {
        raw
    };
    PlannedStep::new(source.chars().take(FALLBACK_PREFIX_CHARS).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ParsedPlan {
        let catalogue = CapabilityCatalogue::default();
        PlanParser::new(&catalogue).parse(raw, "parent objective")
    }

    #[test]
    fn test_json_plan() {
        let raw = r#"Here is the plan:
[
  {"description": "Collect sources", "capability": "Research", "priority": "high"},
  {"description": "Compare findings", "capability": "analysis", "depends_on": [1]},
  {"description": "Draft report", "capability": "unknown", "depends_on": [3, 2]}
]
Let me know."#;
        let steps = parse(raw).into_steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].capability.as_deref(), Some("research"));
        assert_eq!(steps[0].priority, TaskPriority::High);
        assert_eq!(steps[1].depends_on, vec![0]);
        // self reference dropped, unknown capability ignored
        assert_eq!(steps[2].depends_on, vec![1]);
        assert_eq!(steps[2].capability, None);
    }

    #[test]
    fn test_marker_plan_with_hints() {
        let raw = "1. Step 1: Gather market data\n   Agent: RESEARCH\n   Priority: critical\n\
                   2. Step 2: Build the scraper\n   Agent: code\n\
                   3. Step 3: Merge results\n   Depends on step 1, 2";
        let plan = parse(raw);
        assert!(!plan.is_fallback());
        let steps = plan.into_steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].description, "Gather market data");
        assert_eq!(steps[0].capability.as_deref(), Some("research"));
        assert_eq!(steps[0].priority, TaskPriority::Critical);
        assert_eq!(steps[1].capability.as_deref(), Some("code"));
        assert_eq!(steps[1].priority, TaskPriority::Medium);
        assert_eq!(steps[2].depends_on, vec![0, 1]);
    }

    #[test]
    fn test_forward_dependencies_dropped() {
        let raw = "Task: first (after step 2)\nTask: second";
        let steps = parse(raw).into_steps();
        assert!(steps[0].depends_on.is_empty());
    }

    #[test]
    fn test_german_markers() {
        let steps = parse("Schritt 1: Daten sammeln\nSchritt 2: Bericht schreiben").into_steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].description, "Bericht schreiben");
    }

    #[test]
    fn test_fallback_prefix() {
        let raw = "x".repeat(500);
        let plan = parse(&raw);
        assert!(plan.is_fallback());
        let steps = plan.into_steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].description.chars().count(), FALLBACK_PREFIX_CHARS);
        assert!(raw.starts_with(&steps[0].description));
    }

    #[test]
    fn test_fallback_keeps_leading_whitespace() {
        let raw = "\n  I am not sure what you mean.";
        let steps = parse(raw).into_steps();
        assert_eq!(steps[0].description, raw);
        assert!(raw.starts_with(&steps[0].description));
    }

    #[test]
    fn test_fallback_on_blank_output() {
        let steps = parse("   \n").into_steps();
        assert_eq!(steps[0].description, "parent objective");
    }

    #[test]
    fn test_plural_is_not_a_marker() {
        assert!(parse("Tasks are hard to list today.").is_fallback());
    }

    #[test]
    fn test_subtask_limit() {
        let raw: String = (1..=20).map(|i| format!("Step {}: item {}\n", i, i)).collect();
        assert_eq!(parse(&raw).len(), MAX_SUBTASKS);
    }

    #[test]
    fn test_priority_hint_forms() {
        assert_eq!(priority_hint("priority: high"), Some(TaskPriority::High));
        assert_eq!(priority_hint("(low priority)"), Some(TaskPriority::Low));
        assert_eq!(priority_hint("no hint here"), None);
    }
}
