//! Per-task orchestration state machine
//!
//! Valid transitions:
//! 1. Created         → Decomposed        (on: DecompositionComplete)
//! 2. Decomposed      → SubtasksRunning   (on: DispatchStarted)
//! 3. SubtasksRunning → Aggregated        (on: AllSubtasksTerminal)
//! 4. Aggregated      → Done              (on: AllCompleted)
//! 5. Aggregated      → DoneWithFailures  (on: FailuresPresent)
//! 6. Done / DoneWithFailures self-loop   (terminal)

use crate::errors::{Result, SymphonyError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationState {
    Created,
    Decomposed,
    SubtasksRunning,
    Aggregated,
    /// Every subtask completed (terminal)
    Done,
    /// At least one subtask failed or was cancelled (terminal)
    DoneWithFailures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationEvent {
    DecompositionComplete,
    DispatchStarted,
    AllSubtasksTerminal,
    AllCompleted,
    FailuresPresent,
}

impl OrchestrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestrationState::Done | OrchestrationState::DoneWithFailures
        )
    }

    pub fn transition(&self, event: OrchestrationEvent) -> Result<OrchestrationState> {
        use OrchestrationEvent::*;
        use OrchestrationState::*;

        let next = match (self, event) {
            (Created, DecompositionComplete) => Decomposed,
            (Decomposed, DispatchStarted) => SubtasksRunning,
            (SubtasksRunning, AllSubtasksTerminal) => Aggregated,
            (Aggregated, AllCompleted) => Done,
            (Aggregated, FailuresPresent) => DoneWithFailures,

            (Done, _) => Done,
            (DoneWithFailures, _) => DoneWithFailures,

            (from, event) => {
                return Err(SymphonyError::InvalidTransition {
                    from: from.to_string(),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestrationState::Created => "CREATED",
            OrchestrationState::Decomposed => "DECOMPOSED",
            OrchestrationState::SubtasksRunning => "SUBTASKS_RUNNING",
            OrchestrationState::Aggregated => "AGGREGATED",
            OrchestrationState::Done => "DONE",
            OrchestrationState::DoneWithFailures => "DONE_WITH_FAILURES",
        }
    }
}

impl fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
