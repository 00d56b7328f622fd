//! Recovery handling seam
//!
//! The engine hands every step failure to a [`RecoveryHandler`] and acts on
//! the decision it returns. The AI-backed orchestrator lives in another
//! crate; the engine only knows this trait.

use action_primitives::ActionFailure;
use async_trait::async_trait;
use perceiver_structural::ScreenSnapshot;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use uiscript_core_types::RunId;

use crate::record::{AbortReason, StepRecord};
use crate::types::Step;

/// Everything a handler may use to decide how to recover one failure
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    pub run_id: RunId,
    pub script: String,
    /// Index of the failed step in the script
    pub step_index: usize,
    pub failed_step: Step,
    pub failure: ActionFailure,
    /// Screen at the time of failure
    pub screen: Option<Arc<ScreenSnapshot>>,
    /// Most recent step records, oldest first
    pub recent_history: Vec<StepRecord>,
    /// Names bound when the failure happened
    pub variables: BTreeMap<String, Value>,
    /// Negotiations already spent on this failure episode
    pub depth: u32,
}

/// Handler verdict
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryDecision {
    /// Run these steps, then retry the failed step
    Corrective(Vec<Step>),
    /// End the run
    Terminal { reason: AbortReason, detail: String },
}

impl RecoveryDecision {
    pub fn terminal(reason: AbortReason, detail: impl Into<String>) -> Self {
        RecoveryDecision::Terminal {
            reason,
            detail: detail.into(),
        }
    }
}

/// Decision plus the raw exchange, kept for the run's audit trail
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub decision: RecoveryDecision,
    pub request: Option<Value>,
    pub response: Option<Value>,
}

impl RecoveryOutcome {
    pub fn new(decision: RecoveryDecision) -> Self {
        Self {
            decision,
            request: None,
            response: None,
        }
    }

    pub fn with_exchange(mut self, request: Option<Value>, response: Option<Value>) -> Self {
        self.request = request;
        self.response = response;
        self
    }
}

/// Recovery handler trait
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    /// Negotiations allowed per failure episode beyond the first
    fn max_depth(&self) -> u32;

    /// Step records to include as recent history
    fn history_window(&self) -> usize {
        5
    }

    /// Decide how to recover; must not block indefinitely
    async fn negotiate(&self, context: RecoveryContext) -> RecoveryOutcome;
}
