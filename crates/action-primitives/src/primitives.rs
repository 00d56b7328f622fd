//! Action executor implementation
//!
//! Seven primitives, one per step action:
//! 1. tap - tap a single resolved element
//! 2. long_press - press and hold a single resolved element
//! 3. clear - empty an editable element
//! 4. type - deliver text to a focusable element
//! 5. read_screen - render the current screen as data
//! 6. scroll_to_find - scroll until a selector resolves
//! 7. wait - poll until a screen condition holds

mod read_screen;
mod scroll;
mod tap;
mod type_text;
mod wait;

pub use read_screen::*;
pub use scroll::*;
pub use tap::*;
pub use type_text::*;
pub use wait::*;

use action_locator::{DefaultElementResolver, ElementResolver, Selector};
use async_trait::async_trait;
use perceiver_structural::{NodeIndex, PerceiverError, ScreenSnapshot, Snapshotter};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    device::{Device, ElementTarget},
    types::{ActionFailure, ActionRequest, ExecCtx, ExecutionResult, ExecutorConfig, FailureReason},
};

/// Outcome of one primitive before it is folded into an [`ExecutionResult`]
pub type PrimitiveOutcome = Result<Option<Value>, ActionFailure>;

/// Action executor trait
///
/// Every operation is total: whatever happens on the device, the caller gets
/// an [`ExecutionResult`], never an error.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute one resolved action against the device
    async fn execute(
        &self,
        ctx: &ExecCtx,
        device: &dyn Device,
        request: &ActionRequest,
    ) -> ExecutionResult;

    /// Capture the current screen through the executor's snapshot policy
    async fn snapshot(
        &self,
        device: &dyn Device,
        stabilize: bool,
    ) -> Result<Arc<ScreenSnapshot>, ActionFailure>;
}

/// Default executor over any [`Device`]
#[derive(Clone, Debug, Default)]
pub struct DefaultActionExecutor {
    config: ExecutorConfig,
    snapshotter: Snapshotter,
    resolver: DefaultElementResolver,
}

impl DefaultActionExecutor {
    pub fn new(config: ExecutorConfig, snapshotter: Snapshotter) -> Self {
        Self {
            config,
            snapshotter,
            resolver: DefaultElementResolver,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn resolver(&self) -> &DefaultElementResolver {
        &self.resolver
    }

    /// Capture a snapshot, mapping capture errors to `DeviceError` failures
    pub async fn capture(
        &self,
        device: &dyn Device,
        stabilize: bool,
    ) -> Result<Arc<ScreenSnapshot>, ActionFailure> {
        self.capture_until(device, stabilize, &CancellationToken::new())
            .await
    }

    /// Capture on behalf of an action; cancelling `ctx` while the screen
    /// settles yields a `Cancelled` failure
    pub async fn capture_in(
        &self,
        ctx: &ExecCtx,
        device: &dyn Device,
        stabilize: bool,
    ) -> Result<Arc<ScreenSnapshot>, ActionFailure> {
        self.capture_until(device, stabilize, &ctx.cancel_token)
            .await
    }

    async fn capture_until(
        &self,
        device: &dyn Device,
        stabilize: bool,
        cancel: &CancellationToken,
    ) -> Result<Arc<ScreenSnapshot>, ActionFailure> {
        match self.snapshotter.capture_until(device, stabilize, cancel).await {
            Ok(snapshot) => Ok(Arc::new(snapshot)),
            Err(PerceiverError::Cancelled) => Err(Self::cancelled("while the screen settled")),
            Err(err) => Err(ActionFailure::new(FailureReason::DeviceError, err.to_string())),
        }
    }

    /// Resolve `selector` to exactly one element of `snapshot`
    ///
    /// Zero matches is `NoTarget`; several matches without a pick policy is
    /// `AmbiguousTarget`.
    pub fn resolve_single(
        &self,
        snapshot: &Arc<ScreenSnapshot>,
        selector: &Selector,
    ) -> Result<(NodeIndex, ElementTarget), ActionFailure> {
        let resolution = self.resolver.resolve(selector, snapshot);
        match resolution.matches.as_slice() {
            [] => Err(ActionFailure::new(
                FailureReason::NoTarget,
                format!("selector '{selector}' matched no element"),
            )
            .with_snapshot(snapshot.clone())),
            [index] => {
                let element = snapshot.get(*index).ok_or_else(|| {
                    ActionFailure::new(
                        FailureReason::NoTarget,
                        format!("selector '{selector}' resolved outside the snapshot"),
                    )
                    .with_snapshot(snapshot.clone())
                })?;
                Ok((*index, ElementTarget::from(element)))
            }
            many => Err(ActionFailure::new(
                FailureReason::AmbiguousTarget,
                format!(
                    "selector '{selector}' matched {} elements; add @first, @last or @nth=N",
                    many.len()
                ),
            )
            .with_snapshot(snapshot.clone())),
        }
    }

    pub(crate) fn cancelled(detail: &str) -> ActionFailure {
        ActionFailure::new(FailureReason::Cancelled, format!("cancelled {detail}"))
    }

    pub(crate) fn device_failure(
        err: crate::errors::DeviceError,
        snapshot: &Arc<ScreenSnapshot>,
    ) -> ActionFailure {
        ActionFailure::new(FailureReason::DeviceError, err.to_string()).with_snapshot(snapshot.clone())
    }
}

#[async_trait]
impl ActionExecutor for DefaultActionExecutor {
    async fn execute(
        &self,
        ctx: &ExecCtx,
        device: &dyn Device,
        request: &ActionRequest,
    ) -> ExecutionResult {
        let start = Instant::now();
        info!(
            run_id = %ctx.run_id,
            action_id = %ctx.action_id,
            action = %request.kind(),
            "Executing action"
        );

        if ctx.is_cancelled() {
            return ExecutionResult::Failure(Self::cancelled("before action start"));
        }

        let outcome = match request {
            ActionRequest::Tap { selector } => tap::execute_tap(self, ctx, device, selector).await,
            ActionRequest::LongPress {
                selector,
                duration_ms,
            } => {
                let duration = duration_ms.unwrap_or(self.config.default_long_press_ms);
                tap::execute_long_press(self, ctx, device, selector, duration).await
            }
            ActionRequest::Clear { selector } => {
                type_text::execute_clear(self, ctx, device, selector).await
            }
            ActionRequest::TypeText { selector, text } => {
                type_text::execute_type_text(self, ctx, device, selector, text).await
            }
            ActionRequest::ReadScreen { format } => {
                read_screen::execute_read_screen(self, ctx, device, format).await
            }
            ActionRequest::ScrollToFind {
                selector,
                direction,
                max_attempts,
            } => {
                let attempts = max_attempts.unwrap_or(self.config.default_scroll_attempts);
                scroll::execute_scroll_to_find(self, ctx, device, selector, *direction, attempts)
                    .await
            }
            ActionRequest::Wait {
                condition,
                timeout_ms,
            } => {
                let timeout = timeout_ms.unwrap_or(self.config.default_wait_timeout_ms);
                wait::execute_wait(self, ctx, device, condition, timeout).await
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                info!(
                    action_id = %ctx.action_id,
                    latency_ms = latency_ms,
                    "Action completed successfully"
                );
                ExecutionResult::Success { value }
            }
            Err(failure) => {
                warn!(
                    action_id = %ctx.action_id,
                    latency_ms = latency_ms,
                    reason = %failure.reason,
                    detail = %failure.detail,
                    "Action failed"
                );
                ExecutionResult::Failure(failure)
            }
        }
    }

    async fn snapshot(
        &self,
        device: &dyn Device,
        stabilize: bool,
    ) -> Result<Arc<ScreenSnapshot>, ActionFailure> {
        self.capture(device, stabilize).await
    }
}
