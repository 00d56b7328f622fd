//! Recovery orchestrator
//!
//! Implements the engine's [`RecoveryHandler`] seam on top of a
//! [`RecoveryAgent`]. Steps per negotiation:
//! 1. Refuse when the episode is already past the depth bound
//! 2. Build a fresh [`RecoveryRequest`] from the failure context
//! 3. Call the agent under the configured timeout
//! 4. Validate the raw answer and turn it into a decision
//!
//! Every infrastructure problem becomes a terminal decision; nothing is
//! retried here.

use action_flow::{
    AbortReason, RecoveryContext, RecoveryDecision, RecoveryHandler, RecoveryOutcome,
    SchemaOptions,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RecoveryConfig;
use crate::contract::{ContractLimits, RecoveryRequest, RecoveryResponse};
use crate::errors::AgentError;
use crate::provider::{HttpRecoveryAgent, RecoveryAgent};

pub struct RecoveryOrchestrator {
    agent: Arc<dyn RecoveryAgent>,
    config: RecoveryConfig,
}

impl RecoveryOrchestrator {
    pub fn new(agent: Arc<dyn RecoveryAgent>, config: RecoveryConfig) -> Self {
        Self { agent, config }
    }

    /// HTTP-backed orchestrator, or `None` when no endpoint is configured
    pub fn from_config(config: RecoveryConfig) -> Result<Option<Self>, AgentError> {
        if !config.has_endpoint() {
            return Ok(None);
        }
        let endpoint = config.endpoint.clone().unwrap_or_default();
        let agent = HttpRecoveryAgent::new(endpoint, config.timeout())?;
        Ok(Some(Self::new(Arc::new(agent), config)))
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn limits(&self) -> ContractLimits {
        ContractLimits {
            max_steps: self.config.max_corrective_steps,
            schema: SchemaOptions {
                reject_positional: self.config.strict_selectors,
            },
        }
    }

    pub fn build_request(&self, context: &RecoveryContext) -> RecoveryRequest {
        RecoveryRequest::from_context(context, self.config.history_window)
    }

    /// Turn a raw answer into a decision
    pub fn decide(&self, raw: &Value, known: &BTreeSet<String>) -> RecoveryDecision {
        match RecoveryResponse::parse(raw, known, self.limits()) {
            Ok(RecoveryResponse::CorrectiveScript { steps }) => RecoveryDecision::Corrective(steps),
            Ok(RecoveryResponse::Terminal { reason }) => {
                RecoveryDecision::terminal(AbortReason::AgentVerdict, reason)
            }
            Err(err) => {
                warn!(error = %err, "Rejected recovery response");
                RecoveryDecision::terminal(AbortReason::InvalidRecoveryResponse, err.to_string())
            }
        }
    }
}

#[async_trait]
impl RecoveryHandler for RecoveryOrchestrator {
    fn max_depth(&self) -> u32 {
        self.config.max_depth
    }

    fn history_window(&self) -> usize {
        self.config.history_window
    }

    async fn negotiate(&self, context: RecoveryContext) -> RecoveryOutcome {
        if context.depth > self.config.max_depth {
            return RecoveryOutcome::new(RecoveryDecision::terminal(
                AbortReason::RecursionBoundExceeded,
                format!(
                    "negotiation depth {} exceeds bound {}",
                    context.depth, self.config.max_depth
                ),
            ));
        }

        let request = self.build_request(&context);
        let payload = match serde_json::to_value(&request) {
            Ok(payload) => payload,
            Err(err) => {
                return RecoveryOutcome::new(RecoveryDecision::terminal(
                    AbortReason::AgentUnavailable,
                    format!("failed to encode recovery request: {err}"),
                ));
            }
        };

        info!(
            run_id = %context.run_id,
            step = context.step_index,
            depth = context.depth,
            reason = %context.failure.reason,
            agent = self.agent.name(),
            "Sending recovery request"
        );

        let answer = tokio::time::timeout(self.config.timeout(), self.agent.propose(&payload)).await;
        let raw = match answer {
            Err(_) => {
                warn!(
                    run_id = %context.run_id,
                    timeout_ms = self.config.timeout_ms,
                    "Recovery agent timed out"
                );
                return RecoveryOutcome::new(RecoveryDecision::terminal(
                    AbortReason::AgentUnavailable,
                    format!("agent did not answer within {} ms", self.config.timeout_ms),
                ))
                .with_exchange(Some(payload), None);
            }
            Ok(Err(err)) => {
                warn!(run_id = %context.run_id, error = %err, "Recovery agent unavailable");
                return RecoveryOutcome::new(RecoveryDecision::terminal(
                    AbortReason::AgentUnavailable,
                    err.to_string(),
                ))
                .with_exchange(Some(payload), None);
            }
            Ok(Ok(raw)) => raw,
        };

        let known: BTreeSet<String> = context.variables.keys().cloned().collect();
        let decision = self.decide(&raw, &known);
        RecoveryOutcome::new(decision).with_exchange(Some(payload), Some(raw))
    }
}
