//! Scroll-to-find primitive

use action_locator::{ElementResolver, Selector};
use serde_json::json;
use tracing::{debug, info};

use crate::{
    device::{Device, ScrollDirection},
    primitives::{DefaultActionExecutor, PrimitiveOutcome},
    types::{ActionFailure, ExecCtx, FailureReason},
};

/// Execute scroll_to_find primitive
///
/// The current screen is checked first; after that each attempt is one
/// scroll unit in `direction` followed by a capture and a resolve. At most
/// `max_attempts` scrolls are performed. Success carries the first match in
/// document order and the number of scrolls it took.
pub async fn execute_scroll_to_find(
    executor: &DefaultActionExecutor,
    ctx: &ExecCtx,
    device: &dyn Device,
    selector: &Selector,
    direction: ScrollDirection,
    max_attempts: u32,
) -> PrimitiveOutcome {
    let mut snapshot = executor.capture_in(ctx, device, true).await?;
    let mut attempt = 0u32;

    loop {
        let resolution = executor.resolver().resolve(selector, &snapshot);
        if let Some(element) = resolution.refs(&snapshot).into_iter().next() {
            info!(
                action_id = %ctx.action_id,
                attempts = attempt,
                element = %element.element_id,
                "scroll_to_find located target"
            );
            return Ok(Some(json!({
                "element": element,
                "attempts": attempt,
            })));
        }

        if attempt >= max_attempts {
            return Err(ActionFailure::new(
                FailureReason::NotFound,
                format!(
                    "selector '{selector}' not found after {attempt} scroll(s) {direction}"
                ),
            )
            .with_snapshot(snapshot));
        }

        if ctx.is_cancelled() {
            return Err(DefaultActionExecutor::cancelled("during scroll_to_find"));
        }

        attempt += 1;
        debug!(action_id = %ctx.action_id, attempt = attempt, direction = %direction, "scroll");
        device
            .scroll(direction)
            .await
            .map_err(|err| DefaultActionExecutor::device_failure(err, &snapshot))?;
        snapshot = executor.capture_in(ctx, device, true).await?;
    }
}
