//! Read-screen primitive

use action_locator::ElementResolver;
use perceiver_structural::{render_full, render_subtrees, render_summary};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    device::Device,
    primitives::{DefaultActionExecutor, PrimitiveOutcome},
    types::{ActionFailure, ExecCtx, FailureReason, ReadFormat},
};

/// Execute read_screen primitive
///
/// Returns the stabilized screen rendered in `format`. A targeted read whose
/// selector matches nothing fails with `NoTarget`.
pub async fn execute_read_screen(
    executor: &DefaultActionExecutor,
    ctx: &ExecCtx,
    device: &dyn Device,
    format: &ReadFormat,
) -> PrimitiveOutcome {
    let snapshot = executor.capture_in(ctx, device, true).await?;
    debug!(
        action_id = %ctx.action_id,
        format = format.name(),
        nodes = snapshot.len(),
        stable = snapshot.stable,
        "read screen"
    );

    let value = match format {
        ReadFormat::Full => to_value(&render_full(&snapshot)),
        ReadFormat::Summary => to_value(&render_summary(&snapshot)),
        ReadFormat::Targeted(selector) => {
            let resolution = executor.resolver().resolve(selector, &snapshot);
            if resolution.is_empty() {
                return Err(ActionFailure::new(
                    FailureReason::NoTarget,
                    format!("selector '{selector}' matched no element to read"),
                )
                .with_snapshot(snapshot.clone()));
            }
            to_value(&render_subtrees(&snapshot, &resolution.matches))
        }
    };

    value.map(Some).map_err(|err| {
        ActionFailure::new(
            FailureReason::DeviceError,
            format!("failed to render screen: {err}"),
        )
        .with_snapshot(snapshot.clone())
    })
}

fn to_value<T: Serialize>(rendered: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(rendered)
}
