//! Script execution engine
//!
//! Runs a script's steps strictly in order against one device. A failed step
//! is handed to the [`RecoveryHandler`]; a corrective script it returns runs
//! as a nested sequence, after which the failed step is re-resolved and, if
//! its target is now on screen, executed again.

use action_locator::{DefaultElementResolver, ElementResolver, Selector};
use action_primitives::{
    ActionExecutor, ActionFailure, ActionRequest, Device, ExecCtx, ExecutionResult, FailureReason,
    ReadFormat, WaitCondition,
};
use async_recursion::async_recursion;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uiscript_core_types::RunId;

use crate::errors::StepError;
use crate::record::{
    AbortInfo, AbortReason, AuditDecision, CorrectiveRun, RecoveryAudit, RunRecord, RunStatus,
    StepOrigin, StepRecord, StepResult,
};
use crate::request::build_request;
use crate::state::{EngineState, StateMachine};
use crate::strategies::{RecoveryContext, RecoveryDecision, RecoveryHandler};
use crate::types::{Script, Step};
use crate::vars::Variables;

/// Engine limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Negotiations allowed per failure episode beyond the first
    pub max_recovery_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_recovery_depth: 1,
        }
    }
}

/// Script runner trait
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run a script to a terminal state; always yields a record
    async fn run(&self, script: &Script, device: &dyn Device, cancel: CancellationToken)
        -> RunRecord;
}

/// Default engine over an [`ActionExecutor`] and an optional recovery handler
pub struct ScriptEngine {
    executor: Arc<dyn ActionExecutor>,
    recovery: Option<Arc<dyn RecoveryHandler>>,
    resolver: DefaultElementResolver,
    config: EngineConfig,
}

/// Mutable state of one run, shared by the main and corrective sequences
struct RunState {
    run_id: RunId,
    script: String,
    cancel: CancellationToken,
    vars: Variables,
    steps: Vec<StepRecord>,
    recoveries: Vec<RecoveryAudit>,
    /// Negotiations held in the open failure episode
    depth: u32,
    /// Depth of the latest negotiation in the open episode
    episode_depth: u32,
    /// Deepest negotiation held in any episode
    deepest: u32,
}

enum SequenceEnd {
    Completed,
    Aborted(AbortInfo),
}

enum RecoveryEnd {
    Resume,
    Abort(AbortInfo),
}

fn abort(reason: AbortReason, detail: impl Into<String>, step: usize) -> AbortInfo {
    AbortInfo {
        reason,
        detail: detail.into(),
        step: Some(step),
    }
}

/// Selector the request will act on, after substitution
fn request_selector(request: &ActionRequest) -> Option<&Selector> {
    match request {
        ActionRequest::Tap { selector }
        | ActionRequest::LongPress { selector, .. }
        | ActionRequest::Clear { selector }
        | ActionRequest::TypeText { selector, .. }
        | ActionRequest::ScrollToFind { selector, .. } => Some(selector),
        ActionRequest::ReadScreen {
            format: ReadFormat::Targeted(selector),
        } => Some(selector),
        ActionRequest::Wait { condition, .. } => match condition {
            WaitCondition::Present(selector)
            | WaitCondition::Absent(selector)
            | WaitCondition::Enabled(selector) => Some(selector),
            WaitCondition::ScreenStable => None,
        },
        ActionRequest::ReadScreen { .. } => None,
    }
}

impl ScriptEngine {
    pub fn new(executor: Arc<dyn ActionExecutor>, config: EngineConfig) -> Self {
        Self {
            executor,
            recovery: None,
            resolver: DefaultElementResolver,
            config,
        }
    }

    pub fn with_recovery(mut self, handler: Arc<dyn RecoveryHandler>) -> Self {
        self.recovery = Some(handler);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_recovery(&self) -> bool {
        self.recovery.is_some()
    }

    /// Execute one step and record it
    async fn execute_step(
        &self,
        run: &mut RunState,
        device: &dyn Device,
        step: &Step,
        index: usize,
        origin: StepOrigin,
    ) -> Result<ExecutionResult, StepError> {
        let request = match build_request(step, &run.vars) {
            Ok(request) => request,
            Err(err) => {
                run.steps.push(StepRecord {
                    index,
                    step_id: step.id.clone(),
                    action: step.action,
                    selector: step.selector.as_ref().map(|s| s.to_string()),
                    origin,
                    result: StepResult::Invalid {
                        invalid: err.to_string(),
                    },
                    started_at: Utc::now(),
                    duration_ms: 0,
                });
                return Err(err);
            }
        };
        let selector = request_selector(&request).map(|s| s.to_string());
        let ctx = ExecCtx::new(run.run_id.clone(), run.cancel.clone());

        debug!(
            run_id = %run.run_id,
            step = index,
            action = %step.action,
            origin = ?origin,
            "Executing step"
        );

        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.executor.execute(&ctx, device, &request).await;

        if let (ExecutionResult::Success { value }, Some(name)) = (&result, &step.capture) {
            run.vars
                .set(name.clone(), value.clone().unwrap_or(Value::Null));
            debug!(run_id = %run.run_id, variable = %name, "Captured step value");
        }

        run.steps.push(StepRecord {
            index,
            step_id: step.id.clone(),
            action: step.action,
            selector,
            origin,
            result: StepResult::Executed(result.clone()),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        });

        Ok(result)
    }

    /// Run `steps` in order
    ///
    /// `negotiation` is set for corrective sequences: they never negotiate,
    /// and their first failure ends the sequence.
    #[async_recursion]
    async fn run_sequence(
        &self,
        run: &mut RunState,
        device: &dyn Device,
        steps: &[Step],
        negotiation: Option<u32>,
        machine: &mut StateMachine,
    ) -> SequenceEnd {
        if run.cancel.is_cancelled() {
            machine.advance(EngineState::Aborted, None);
            return SequenceEnd::Aborted(AbortInfo {
                reason: AbortReason::Cancelled,
                detail: "cancelled before start".to_string(),
                step: None,
            });
        }
        machine.advance(EngineState::Running, Some(0));

        let origin = match negotiation {
            None => StepOrigin::Script,
            Some(negotiation) => StepOrigin::Corrective { negotiation },
        };

        let mut index = 0;
        while index < steps.len() {
            let step = &steps[index];

            if run.cancel.is_cancelled() {
                machine.advance(EngineState::Aborted, Some(index));
                return SequenceEnd::Aborted(abort(
                    AbortReason::Cancelled,
                    format!("cancelled before step {index}"),
                    index,
                ));
            }

            let result = match self.execute_step(run, device, step, index, origin).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(run_id = %run.run_id, step = index, error = %err, "Step is invalid");
                    machine.advance(EngineState::Aborted, Some(index));
                    return SequenceEnd::Aborted(abort(
                        AbortReason::InvalidStep,
                        format!("step {index} ({}): {err}", step.label()),
                        index,
                    ));
                }
            };

            let failure = match result {
                ExecutionResult::Success { .. } => {
                    if negotiation.is_none() {
                        run.depth = 0;
                        run.episode_depth = 0;
                    }
                    index += 1;
                    continue;
                }
                ExecutionResult::Failure(failure) => failure,
            };

            if failure.reason == FailureReason::Cancelled {
                machine.advance(EngineState::Aborted, Some(index));
                return SequenceEnd::Aborted(abort(AbortReason::Cancelled, failure.detail, index));
            }

            if negotiation.is_some() {
                warn!(
                    run_id = %run.run_id,
                    step = index,
                    reason = %failure.reason,
                    "Corrective step failed"
                );
                machine.advance(EngineState::Aborted, Some(index));
                return SequenceEnd::Aborted(abort(
                    failure.reason.into(),
                    format!(
                        "corrective step {index} ({}) failed: {}",
                        step.label(),
                        failure.detail
                    ),
                    index,
                ));
            }

            machine.advance(EngineState::Failed, Some(index));
            machine.advance(EngineState::AwaitingRecovery, Some(index));
            match self.recover(run, device, step, index, failure, machine).await {
                RecoveryEnd::Resume => {}
                RecoveryEnd::Abort(info) => {
                    machine.advance(EngineState::Aborted, Some(index));
                    return SequenceEnd::Aborted(info);
                }
            }
        }

        machine.advance(EngineState::Completed, None);
        SequenceEnd::Completed
    }

    /// Negotiate until the failed step can be retried or the run must end
    ///
    /// Entered in `AwaitingRecovery`. On `Resume` the machine is back in
    /// `Running`.
    async fn recover(
        &self,
        run: &mut RunState,
        device: &dyn Device,
        step: &Step,
        index: usize,
        failure: ActionFailure,
        machine: &mut StateMachine,
    ) -> RecoveryEnd {
        let mut failure = failure;
        loop {
            let Some(handler) = self.recovery.as_ref() else {
                return RecoveryEnd::Abort(abort(
                    failure.reason.into(),
                    format!("{}; no recovery agent configured", failure.detail),
                    index,
                ));
            };

            let bound = self.config.max_recovery_depth.min(handler.max_depth());
            if run.depth > bound {
                warn!(
                    run_id = %run.run_id,
                    step = index,
                    depth = run.depth,
                    bound,
                    "Recovery depth bound exceeded"
                );
                return RecoveryEnd::Abort(abort(
                    AbortReason::RecursionBoundExceeded,
                    format!(
                        "step {index} ({}) still failing after {} negotiations: {}",
                        step.label(),
                        run.depth,
                        failure.detail
                    ),
                    index,
                ));
            }

            let screen = match failure.snapshot.clone() {
                Some(snapshot) => Some(snapshot),
                None => self.executor.snapshot(device, true).await.ok(),
            };
            let window = handler.history_window();
            let history_start = run.steps.len().saturating_sub(window);
            let context = RecoveryContext {
                run_id: run.run_id.clone(),
                script: run.script.clone(),
                step_index: index,
                failed_step: step.clone(),
                failure: failure.clone(),
                screen,
                recent_history: run.steps[history_start..].to_vec(),
                variables: run.vars.snapshot(),
                depth: run.depth,
            };

            info!(
                run_id = %run.run_id,
                step = index,
                depth = run.depth,
                reason = %failure.reason,
                "Negotiating recovery"
            );

            let start = Instant::now();
            let outcome = tokio::select! {
                _ = run.cancel.cancelled() => {
                    return RecoveryEnd::Abort(abort(
                        AbortReason::Cancelled,
                        "cancelled during recovery negotiation",
                        index,
                    ));
                }
                outcome = handler.negotiate(context) => outcome,
            };

            let depth = run.depth;
            run.depth += 1;
            run.episode_depth = depth;
            run.deepest = run.deepest.max(depth);

            let mut audit = RecoveryAudit {
                step: index,
                depth,
                failure_reason: failure.reason,
                request: outcome.request,
                response: outcome.response,
                decision: AuditDecision::Corrective { steps: 0 },
                corrective: None,
                duration_ms: start.elapsed().as_millis() as u64,
            };

            let corrective = match outcome.decision {
                RecoveryDecision::Terminal { reason, detail } => {
                    info!(run_id = %run.run_id, step = index, reason = %reason, "Recovery ended the run");
                    audit.decision = AuditDecision::Terminal {
                        reason,
                        detail: detail.clone(),
                    };
                    run.recoveries.push(audit);
                    return RecoveryEnd::Abort(abort(reason, detail, index));
                }
                RecoveryDecision::Corrective(steps) => steps,
            };

            audit.decision = AuditDecision::Corrective {
                steps: corrective.len(),
            };
            info!(
                run_id = %run.run_id,
                step = index,
                steps = corrective.len(),
                "Running corrective script"
            );

            machine.advance(EngineState::Running, Some(index));
            let mut nested = StateMachine::new();
            let end = self
                .run_sequence(run, device, &corrective, Some(depth), &mut nested)
                .await;

            if let SequenceEnd::Aborted(info) = end {
                audit.corrective = Some(CorrectiveRun {
                    completed: false,
                    transitions: nested.into_transitions(),
                    target_resolved: None,
                });
                run.recoveries.push(audit);
                return RecoveryEnd::Abort(AbortInfo {
                    step: Some(index),
                    ..info
                });
            }

            let unresolved = self.unresolved_target(run, device, step).await;
            audit.corrective = Some(CorrectiveRun {
                completed: true,
                transitions: nested.into_transitions(),
                target_resolved: Some(unresolved.is_none()),
            });
            run.recoveries.push(audit);

            match unresolved {
                None => {
                    info!(run_id = %run.run_id, step = index, "Target resolves, retrying step");
                    return RecoveryEnd::Resume;
                }
                Some(second) => {
                    warn!(
                        run_id = %run.run_id,
                        step = index,
                        "Target still unresolved after corrective script"
                    );
                    machine.advance(EngineState::Failed, Some(index));
                    machine.advance(EngineState::AwaitingRecovery, Some(index));
                    failure = second;
                }
            }
        }
    }

    /// Re-resolve the failed step's selector on a fresh capture
    ///
    /// Returns the second-order failure when the target is still absent.
    async fn unresolved_target(
        &self,
        run: &RunState,
        device: &dyn Device,
        step: &Step,
    ) -> Option<ActionFailure> {
        let selector = step.selector.as_ref()?;
        let selector = match run.vars.resolve_selector(selector) {
            Ok(selector) => selector,
            Err(err) => {
                return Some(ActionFailure::new(FailureReason::NoTarget, err.to_string()));
            }
        };

        let snapshot = match self.executor.snapshot(device, true).await {
            Ok(snapshot) => snapshot,
            Err(failure) => return Some(failure),
        };

        if self.resolver.resolve(&selector, &snapshot).is_empty() {
            Some(
                ActionFailure::new(
                    FailureReason::NoTarget,
                    format!("selector '{selector}' still unresolved after corrective script"),
                )
                .with_snapshot(snapshot),
            )
        } else {
            None
        }
    }
}

#[async_trait]
impl ScriptRunner for ScriptEngine {
    async fn run(
        &self,
        script: &Script,
        device: &dyn Device,
        cancel: CancellationToken,
    ) -> RunRecord {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut run = RunState {
            run_id: RunId::new(),
            script: script.name.clone(),
            cancel,
            vars: Variables::new(script.variables.clone()),
            steps: Vec::new(),
            recoveries: Vec::new(),
            depth: 0,
            episode_depth: 0,
            deepest: 0,
        };

        info!(
            run_id = %run.run_id,
            script = %script.name,
            steps = script.steps.len(),
            recovery = self.recovery.is_some(),
            "Starting script run"
        );

        let mut machine = StateMachine::new();
        let end = self
            .run_sequence(&mut run, device, &script.steps, None, &mut machine)
            .await;

        let (completed, abort) = match end {
            SequenceEnd::Completed => (true, None),
            SequenceEnd::Aborted(info) => (false, Some(info)),
        };
        let recovered = run.recoveries.iter().any(RecoveryAudit::ran_corrective);
        let status = RunStatus::derive(completed, recovered);

        match &abort {
            None => info!(
                run_id = %run.run_id,
                status = %status,
                steps = run.steps.len(),
                "Script run finished"
            ),
            Some(info) => warn!(
                run_id = %run.run_id,
                status = %status,
                reason = %info.reason,
                detail = %info.detail,
                "Script run aborted"
            ),
        }

        RunRecord {
            run_id: run.run_id,
            script: run.script,
            status,
            abort,
            steps: run.steps,
            transitions: machine.into_transitions(),
            recoveries: run.recoveries,
            negotiation_depth: run.episode_depth,
            max_negotiation_depth: run.deepest,
            variables: run.vars.snapshot(),
            started_at,
            finished_at: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}
