//! Tap and long-press primitives

use action_locator::Selector;
use std::time::Duration;
use tracing::debug;

use crate::{
    device::Device,
    primitives::{DefaultActionExecutor, PrimitiveOutcome},
    types::ExecCtx,
};

/// Execute tap primitive
///
/// Steps:
/// 1. Capture a stabilized snapshot
/// 2. Resolve the selector to exactly one element
/// 3. Deliver the tap at the element
pub async fn execute_tap(
    executor: &DefaultActionExecutor,
    ctx: &ExecCtx,
    device: &dyn Device,
    selector: &Selector,
) -> PrimitiveOutcome {
    let snapshot = executor.capture_in(ctx, device, true).await?;
    let (_, target) = executor.resolve_single(&snapshot, selector)?;

    debug!(action_id = %ctx.action_id, element = %target.element_id, bounds = %target.bounds, "tap");
    device
        .tap(&target)
        .await
        .map_err(|err| DefaultActionExecutor::device_failure(err, &snapshot))?;
    Ok(None)
}

/// Execute long-press primitive
pub async fn execute_long_press(
    executor: &DefaultActionExecutor,
    ctx: &ExecCtx,
    device: &dyn Device,
    selector: &Selector,
    duration_ms: u64,
) -> PrimitiveOutcome {
    let snapshot = executor.capture_in(ctx, device, true).await?;
    let (_, target) = executor.resolve_single(&snapshot, selector)?;

    debug!(
        action_id = %ctx.action_id,
        element = %target.element_id,
        duration_ms = duration_ms,
        "long press"
    );
    device
        .long_press(&target, Duration::from_millis(duration_ms))
        .await
        .map_err(|err| DefaultActionExecutor::device_failure(err, &snapshot))?;
    Ok(None)
}
