use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::PerceiverError;
use crate::model::ScreenSnapshot;
use crate::policy::StabilizePolicy;
use crate::ports::ScreenSource;

/// Captures snapshots from a screen source, optionally waiting for the UI to
/// settle.
#[derive(Clone, Debug, Default)]
pub struct Snapshotter {
    policy: StabilizePolicy,
}

impl Snapshotter {
    pub fn new(policy: StabilizePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &StabilizePolicy {
        &self.policy
    }

    /// Capture the current screen.
    ///
    /// With `stabilize`, captures repeat until two consecutive trees are
    /// structurally equal or the attempt budget runs out. The last capture is
    /// returned either way; `stable` tells the caller which case happened.
    pub async fn capture<S>(&self, source: &S, stabilize: bool) -> Result<ScreenSnapshot, PerceiverError>
    where
        S: ScreenSource + ?Sized,
    {
        self.capture_until(source, stabilize, &CancellationToken::new())
            .await
    }

    /// Capture like [`Snapshotter::capture`], giving up with
    /// [`PerceiverError::Cancelled`] if `cancel` fires while the screen settles.
    pub async fn capture_until<S>(
        &self,
        source: &S,
        stabilize: bool,
        cancel: &CancellationToken,
    ) -> Result<ScreenSnapshot, PerceiverError>
    where
        S: ScreenSource + ?Sized,
    {
        let first = ScreenSnapshot::from_descriptors(&source.dump_tree().await?);
        if !stabilize {
            return Ok(first);
        }

        let max_attempts = self.policy.stabilize_attempts.max(2);
        let settle = Duration::from_millis(self.policy.settle_interval_ms);
        let mut previous = first;
        let mut attempt = 1;
        while attempt < max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(attempts = attempt, "capture cancelled while settling");
                    return Err(PerceiverError::Cancelled);
                }
                _ = sleep(settle) => {}
            }
            attempt += 1;
            let next = ScreenSnapshot::from_descriptors(&source.dump_tree().await?);
            if next.structurally_eq(&previous) {
                debug!(attempts = attempt, nodes = next.len(), "screen stabilized");
                return Ok(next.with_stability(true, attempt));
            }
            previous = next;
        }

        warn!(attempts = attempt, "screen did not stabilize; returning last capture");
        Ok(previous.with_stability(false, attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElementDescriptor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a different tree for the first `changes` captures.
    struct Settling {
        calls: AtomicUsize,
        changes: usize,
    }

    #[async_trait]
    impl ScreenSource for Settling {
        async fn dump_tree(&self) -> Result<Vec<ElementDescriptor>, PerceiverError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let label = if call < self.changes {
                format!("frame-{call}")
            } else {
                "settled".to_string()
            };
            Ok(vec![ElementDescriptor::new("label", "text").with_text(label)])
        }
    }

    fn fast_policy(attempts: u32) -> StabilizePolicy {
        StabilizePolicy {
            stabilize_attempts: attempts,
            settle_interval_ms: 1,
        }
    }

    #[tokio::test]
    async fn single_capture_without_stabilize() {
        let source = Settling {
            calls: AtomicUsize::new(0),
            changes: 5,
        };
        let snapshot = Snapshotter::new(fast_policy(3))
            .capture(&source, false)
            .await
            .unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(!snapshot.stable);
        assert_eq!(snapshot.attempts, 1);
    }

    #[tokio::test]
    async fn stabilizes_once_two_captures_agree() {
        let source = Settling {
            calls: AtomicUsize::new(0),
            changes: 1,
        };
        let snapshot = Snapshotter::new(fast_policy(5))
            .capture(&source, true)
            .await
            .unwrap();
        assert!(snapshot.stable);
        assert_eq!(snapshot.attempts, 3);
    }

    #[tokio::test]
    async fn returns_last_capture_when_budget_exhausted() {
        let source = Settling {
            calls: AtomicUsize::new(0),
            changes: 100,
        };
        let snapshot = Snapshotter::new(fast_policy(4))
            .capture(&source, true)
            .await
            .unwrap();
        assert!(!snapshot.stable);
        assert_eq!(snapshot.attempts, 4);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert_eq!(snapshot.get(0).unwrap().text.as_deref(), Some("frame-3"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_settling() {
        let source = Settling {
            calls: AtomicUsize::new(0),
            changes: 100,
        };
        let snapshotter = Snapshotter::new(StabilizePolicy {
            stabilize_attempts: 50,
            settle_interval_ms: 1_000,
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2_500)).await;
            trigger.cancel();
        });

        let err = snapshotter
            .capture_until(&source, true, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PerceiverError::Cancelled));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unstabilized_capture_ignores_cancellation() {
        let source = Settling {
            calls: AtomicUsize::new(0),
            changes: 0,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let snapshot = Snapshotter::new(fast_policy(3))
            .capture_until(&source, false, &cancel)
            .await
            .unwrap();
        assert_eq!(snapshot.attempts, 1);
    }
}
