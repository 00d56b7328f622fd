//! Clear and type primitives

use action_locator::Selector;
use tracing::debug;

use crate::{
    device::Device,
    primitives::{DefaultActionExecutor, PrimitiveOutcome},
    types::{ActionFailure, ExecCtx, FailureReason},
};

/// Execute clear primitive
///
/// Empties a single editable element. Elements that cannot take input are
/// reported as `NoTarget`.
pub async fn execute_clear(
    executor: &DefaultActionExecutor,
    ctx: &ExecCtx,
    device: &dyn Device,
    selector: &Selector,
) -> PrimitiveOutcome {
    let snapshot = executor.capture_in(ctx, device, true).await?;
    let (index, target) = executor.resolve_single(&snapshot, selector)?;
    ensure_focusable(&snapshot, index, selector)?;

    debug!(action_id = %ctx.action_id, element = %target.element_id, "clear");
    device
        .clear(&target)
        .await
        .map_err(|err| DefaultActionExecutor::device_failure(err, &snapshot))?;
    Ok(None)
}

/// Execute type primitive
///
/// `text` arrives with variables already substituted.
pub async fn execute_type_text(
    executor: &DefaultActionExecutor,
    ctx: &ExecCtx,
    device: &dyn Device,
    selector: &Selector,
    text: &str,
) -> PrimitiveOutcome {
    let snapshot = executor.capture_in(ctx, device, true).await?;
    let (index, target) = executor.resolve_single(&snapshot, selector)?;
    ensure_focusable(&snapshot, index, selector)?;

    debug!(
        action_id = %ctx.action_id,
        element = %target.element_id,
        chars = text.chars().count(),
        "type text"
    );
    device
        .type_text(&target, text)
        .await
        .map_err(|err| DefaultActionExecutor::device_failure(err, &snapshot))?;
    Ok(None)
}

fn ensure_focusable(
    snapshot: &std::sync::Arc<perceiver_structural::ScreenSnapshot>,
    index: perceiver_structural::NodeIndex,
    selector: &Selector,
) -> Result<(), ActionFailure> {
    match snapshot.get(index) {
        Some(element) if element.focusable && element.enabled => Ok(()),
        Some(element) => Err(ActionFailure::new(
            FailureReason::NoTarget,
            format!(
                "element '{}' matched by '{selector}' does not accept input",
                element.id
            ),
        )
        .with_snapshot(snapshot.clone())),
        None => Err(ActionFailure::new(
            FailureReason::NoTarget,
            format!("selector '{selector}' resolved outside the snapshot"),
        )
        .with_snapshot(snapshot.clone())),
    }
}
