//! Engine state machine
//!
//! ```text
//! Pending -> Running -> {Completed, Failed}
//! Failed -> AwaitingRecovery -> {Running, Aborted}
//! Running -> Aborted            (cancellation, invalid step, corrective failure)
//! Pending -> Aborted            (cancelled before start)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    Pending,
    Running,
    Failed,
    AwaitingRecovery,
    Completed,
    Aborted,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Completed | EngineState::Aborted)
    }

    pub fn can_transition_to(&self, next: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Aborted)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Aborted)
                | (Failed, AwaitingRecovery)
                | (AwaitingRecovery, Running)
                | (AwaitingRecovery, Aborted)
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: EngineState,
    pub to: EngineState,
    pub at: DateTime<Utc>,
    /// Step index the engine was positioned at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
}

/// State plus the ordered trace of how it got there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachine {
    state: EngineState,
    transitions: Vec<StateTransition>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Pending,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<StateTransition> {
        self.transitions
    }

    /// Move to `next`; returns false and stays put when the move is illegal
    pub fn advance(&mut self, next: EngineState, step: Option<usize>) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "illegal engine state transition ignored");
            return false;
        }
        debug!(from = %self.state, to = %next, step = ?step, "engine state transition");
        self.transitions.push(StateTransition {
            from: self.state,
            to: next,
            at: Utc::now(),
            step,
        });
        self.state = next;
        true
    }

    /// States visited in order, starting with `Pending`
    pub fn path(&self) -> Vec<EngineState> {
        std::iter::once(EngineState::Pending)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }
}
