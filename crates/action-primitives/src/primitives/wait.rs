//! Wait primitive

use action_locator::ElementResolver;
use perceiver_structural::ScreenSnapshot;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::{
    device::Device,
    primitives::{DefaultActionExecutor, PrimitiveOutcome},
    types::{ActionFailure, ExecCtx, FailureReason, WaitCondition},
};

/// Execute wait primitive
///
/// Polls the screen every `poll_interval_ms` until `condition` holds or
/// `timeout_ms` elapses. The condition is always checked at least once.
/// Cancellation is observed while sleeping between polls.
pub async fn execute_wait(
    executor: &DefaultActionExecutor,
    ctx: &ExecCtx,
    device: &dyn Device,
    condition: &WaitCondition,
    timeout_ms: u64,
) -> PrimitiveOutcome {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let poll = Duration::from_millis(executor.config().poll_interval_ms.max(1));
    let mut previous: Option<Arc<ScreenSnapshot>> = None;
    let mut polls = 0u32;

    loop {
        let snapshot = executor.capture_in(ctx, device, false).await?;
        polls += 1;

        if let Some(value) = evaluate(executor, condition, &snapshot, previous.as_deref()) {
            debug!(
                action_id = %ctx.action_id,
                condition = condition.name(),
                polls = polls,
                "wait condition satisfied"
            );
            return Ok(Some(value));
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ActionFailure::new(
                FailureReason::Timeout,
                format!(
                    "condition '{}' not met within {timeout_ms}ms ({polls} polls)",
                    describe(condition)
                ),
            )
            .with_snapshot(snapshot));
        }

        let pause = poll.min(deadline - now);
        tokio::select! {
            _ = ctx.cancel_token.cancelled() => {
                return Err(DefaultActionExecutor::cancelled("while waiting"));
            }
            _ = sleep(pause) => {}
        }
        previous = Some(snapshot);
    }
}

fn evaluate(
    executor: &DefaultActionExecutor,
    condition: &WaitCondition,
    snapshot: &ScreenSnapshot,
    previous: Option<&ScreenSnapshot>,
) -> Option<Value> {
    match condition {
        WaitCondition::Present(selector) => {
            let resolution = executor.resolver().resolve(selector, snapshot);
            (!resolution.is_empty()).then(|| json!({ "matches": resolution.len() }))
        }
        WaitCondition::Absent(selector) => executor
            .resolver()
            .resolve(selector, snapshot)
            .is_empty()
            .then(|| json!({ "matches": 0 })),
        WaitCondition::Enabled(selector) => {
            let resolution = executor.resolver().resolve(selector, snapshot);
            let all_enabled = resolution
                .matches
                .iter()
                .all(|index| snapshot.get(*index).map(|el| el.enabled).unwrap_or(false));
            (!resolution.is_empty() && all_enabled)
                .then(|| json!({ "matches": resolution.len() }))
        }
        WaitCondition::ScreenStable => previous
            .filter(|prev| prev.structurally_eq(snapshot))
            .map(|_| json!({ "stable": true })),
    }
}

fn describe(condition: &WaitCondition) -> String {
    match condition {
        WaitCondition::Present(selector)
        | WaitCondition::Absent(selector)
        | WaitCondition::Enabled(selector) => format!("{} {selector}", condition.name()),
        WaitCondition::ScreenStable => condition.name().to_string(),
    }
}
