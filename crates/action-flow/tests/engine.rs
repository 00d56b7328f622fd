use action_flow::{
    AbortReason, EngineConfig, EngineState, RecoveryContext, RecoveryDecision, RecoveryHandler,
    RecoveryHint, RecoveryOutcome, RunStatus, Script, ScriptEngine, ScriptRunner, Step, StepOrigin,
    StepResult,
};
use action_locator::Selector;
use action_primitives::{
    ActionKind, DefaultActionExecutor, Device, DeviceError, DeviceEvent, ElementTarget,
    ExecutorConfig, FailureReason, FixtureDevice, ScrollDirection,
};
use async_trait::async_trait;
use perceiver_structural::{
    ElementDescriptor, PerceiverError, ScreenSource, Snapshotter, StabilizePolicy,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use EngineState::*;

/// Handler replaying a fixed list of decisions, then repeating a fallback
struct ScriptedHandler {
    decisions: Mutex<VecDeque<RecoveryDecision>>,
    fallback: RecoveryDecision,
    contexts: Mutex<Vec<RecoveryContext>>,
    max_depth: u32,
    delay: Option<Duration>,
}

impl ScriptedHandler {
    fn new(decisions: Vec<RecoveryDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            fallback: RecoveryDecision::terminal(AbortReason::AgentUnavailable, "no more answers"),
            contexts: Mutex::new(Vec::new()),
            max_depth: 10,
            delay: None,
        }
    }

    fn repeating(decision: RecoveryDecision) -> Self {
        Self {
            fallback: decision,
            ..Self::new(Vec::new())
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn contexts(&self) -> Vec<RecoveryContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecoveryHandler for ScriptedHandler {
    fn max_depth(&self) -> u32 {
        self.max_depth
    }

    fn history_window(&self) -> usize {
        2
    }

    async fn negotiate(&self, context: RecoveryContext) -> RecoveryOutcome {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.contexts.lock().unwrap().push(context);
        let decision = self
            .decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        RecoveryOutcome::new(decision)
    }
}

fn sel(text: &str) -> Selector {
    Selector::parse(text).unwrap()
}

fn engine(depth: u32) -> ScriptEngine {
    let executor = DefaultActionExecutor::new(
        ExecutorConfig {
            poll_interval_ms: 5,
            default_wait_timeout_ms: 100,
            ..ExecutorConfig::default()
        },
        Snapshotter::new(StabilizePolicy {
            stabilize_attempts: 2,
            settle_interval_ms: 1,
        }),
    );
    ScriptEngine::new(
        Arc::new(executor),
        EngineConfig {
            max_recovery_depth: depth,
        },
    )
}

fn button(id: &str, text: &str, y: i32) -> ElementDescriptor {
    ElementDescriptor::new(id, "button")
        .with_text(text)
        .with_bounds(10, y, 120, 40)
}

fn screen(children: Vec<ElementDescriptor>) -> Vec<ElementDescriptor> {
    vec![ElementDescriptor::new("root", "window")
        .with_bounds(0, 0, 400, 800)
        .with_children(children)]
}

fn login_form() -> Vec<ElementDescriptor> {
    screen(vec![
        ElementDescriptor::new("user", "textfield")
            .with_focusable(true)
            .with_bounds(10, 100, 300, 40),
        button("ok", "OK", 200),
    ])
}

/// Screen 0 hides `login` behind a menu; tapping `menu` shows it
fn menu_device() -> FixtureDevice {
    FixtureDevice::new(vec![
        screen(vec![button("menu", "Menu", 10)]),
        screen(vec![button("login", "Log in", 300)]),
    ])
    .with_transition("menu", 1)
}

#[tokio::test]
async fn completes_in_declaration_order() {
    let device = FixtureDevice::single(login_form());
    let script = Script::new("login")
        .with_variable("name", json!("alice"))
        .with_step(Step::type_text(sel("id=user"), "${name}"))
        .with_step(Step::tap(sel("text=OK")));

    let record = engine(1).run(&script, &device, CancellationToken::new()).await;

    assert_eq!(record.status, RunStatus::Completed);
    assert!(record.abort.is_none());
    let order: Vec<usize> = record.steps.iter().map(|s| s.index).collect();
    assert_eq!(order, vec![0, 1]);
    assert_eq!(
        device.events(),
        vec![
            DeviceEvent::Type {
                element_id: "user".into(),
                text: "alice".into()
            },
            DeviceEvent::Tap {
                element_id: "ok".into()
            },
        ]
    );
    let path: Vec<EngineState> = record.transitions.iter().map(|t| t.to).collect();
    assert_eq!(path, vec![Running, Completed]);
    assert_eq!(record.steps[0].selector.as_deref(), Some("id=user"));
}

#[test]
fn empty_script_completes_without_touching_the_device() {
    let device = FixtureDevice::single(login_form());
    let script = Script::new("empty");

    let record = tokio_test::block_on(engine(1).run(&script, &device, CancellationToken::new()));

    assert_eq!(record.status, RunStatus::Completed);
    assert!(record.steps.is_empty());
    assert!(device.events().is_empty());
    let path: Vec<EngineState> = record.transitions.iter().map(|t| t.to).collect();
    assert_eq!(path, vec![Running, Completed]);
}

#[tokio::test]
async fn captured_values_are_bound() {
    let device = FixtureDevice::single(login_form());
    let script = Script::new("read")
        .with_step(Step::read_screen("summary").with_capture("before"))
        .with_step(Step::tap(sel("text=OK")).with_capture("tapped"));

    let record = engine(1).run(&script, &device, CancellationToken::new()).await;

    assert!(record.is_completed());
    let before = record.variables.get("before").expect("capture bound");
    assert_eq!(before.as_array().map(Vec::len), Some(2));
    assert_eq!(record.variables.get("tapped"), Some(&serde_json::Value::Null));
}

#[tokio::test]
async fn terminal_verdict_aborts_the_run() {
    let device = FixtureDevice::single(login_form());
    let handler = Arc::new(ScriptedHandler::new(vec![RecoveryDecision::terminal(
        AbortReason::AgentVerdict,
        "element removed",
    )]));
    let script = Script::new("a").with_step(
        Step::tap(sel("id=login")).with_hint(RecoveryHint::new("login moved into the menu")),
    );

    let record = engine(1)
        .with_recovery(handler.clone())
        .run(&script, &device, CancellationToken::new())
        .await;

    assert_eq!(record.status, RunStatus::Aborted);
    let abort = record.abort.as_ref().unwrap();
    assert_eq!(abort.reason, AbortReason::AgentVerdict);
    assert_eq!(abort.detail, "element removed");
    assert_eq!(abort.step, Some(0));
    assert_eq!(record.final_state(), Aborted);
    let path: Vec<EngineState> = record.transitions.iter().map(|t| t.to).collect();
    assert_eq!(path, vec![Running, Failed, AwaitingRecovery, Aborted]);

    let contexts = handler.contexts();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].failure.reason, FailureReason::NoTarget);
    assert!(contexts[0].screen.is_some());
    assert_eq!(contexts[0].failed_step.recovery_hints.len(), 1);
    assert_eq!(record.negotiations(), 1);
}

#[tokio::test]
async fn failure_without_agent_aborts_with_failure_reason() {
    let device = FixtureDevice::single(login_form());
    let script = Script::new("a").with_step(Step::tap(sel("id=login")));

    let record = engine(1).run(&script, &device, CancellationToken::new()).await;

    assert_eq!(record.status, RunStatus::Aborted);
    assert_eq!(record.abort_reason(), Some(AbortReason::NoTarget));
    assert!(record.abort.unwrap().detail.contains("no recovery agent"));
    assert_eq!(record.steps.len(), 1);
}

#[tokio::test]
async fn corrective_script_then_failed_step_resumes() {
    let device = menu_device();
    let handler = Arc::new(ScriptedHandler::new(vec![RecoveryDecision::Corrective(vec![
        Step::tap(sel("id=menu")),
    ])]));
    let script = Script::new("login").with_step(Step::tap(sel("id=login")));

    let record = engine(1)
        .with_recovery(handler)
        .run(&script, &device, CancellationToken::new())
        .await;

    assert_eq!(record.status, RunStatus::RecoveredAndCompleted);
    assert_eq!(device.taps(), vec!["menu", "login"]);
    let origins: Vec<StepOrigin> = record.steps.iter().map(|s| s.origin).collect();
    assert_eq!(
        origins,
        vec![
            StepOrigin::Script,
            StepOrigin::Corrective { negotiation: 0 },
            StepOrigin::Script,
        ]
    );
    let path: Vec<EngineState> = record.transitions.iter().map(|t| t.to).collect();
    assert_eq!(
        path,
        vec![Running, Failed, AwaitingRecovery, Running, Completed]
    );

    let audit = &record.recoveries[0];
    let corrective = audit.corrective.as_ref().unwrap();
    assert!(corrective.completed);
    assert_eq!(corrective.target_resolved, Some(true));
    let nested: Vec<EngineState> = corrective.transitions.iter().map(|t| t.to).collect();
    assert_eq!(nested, vec![Running, Completed]);
    assert_eq!(record.negotiation_depth, 0);
    assert_eq!(record.max_negotiation_depth, 0);
}

#[tokio::test]
async fn recovery_depth_never_exceeds_bound() {
    for bound in 0..3u32 {
        let device = FixtureDevice::single(login_form());
        let handler = Arc::new(ScriptedHandler::repeating(RecoveryDecision::Corrective(
            vec![Step::read_screen("summary")],
        )));
        let script = Script::new("stuck").with_step(Step::tap(sel("id=login")));

        let record = engine(bound)
            .with_recovery(handler.clone())
            .run(&script, &device, CancellationToken::new())
            .await;

        assert_eq!(record.abort_reason(), Some(AbortReason::RecursionBoundExceeded));
        assert_eq!(record.status, RunStatus::RecoveredAndAborted);
        assert_eq!(record.negotiations(), bound as usize + 1);
        assert_eq!(handler.contexts().len(), bound as usize + 1);
        assert!(record.max_negotiation_depth <= bound);
        assert_eq!(record.max_negotiation_depth, bound);
        assert_eq!(record.negotiation_depth, bound);
        let depths: Vec<u32> = handler.contexts().iter().map(|c| c.depth).collect();
        assert_eq!(depths, (0..=bound).collect::<Vec<_>>());
        let audited: Vec<u32> = record.recoveries.iter().map(|a| a.depth).collect();
        assert_eq!(audited, depths);
        assert!(record
            .recoveries
            .iter()
            .all(|audit| audit.corrective.as_ref().and_then(|c| c.target_resolved) == Some(false)));
    }
}

#[tokio::test]
async fn handler_bound_is_also_honored() {
    let device = FixtureDevice::single(login_form());
    let handler = ScriptedHandler {
        max_depth: 0,
        ..ScriptedHandler::repeating(RecoveryDecision::Corrective(vec![Step::read_screen(
            "summary",
        )]))
    };
    let script = Script::new("stuck").with_step(Step::tap(sel("id=login")));

    let record = engine(5)
        .with_recovery(Arc::new(handler))
        .run(&script, &device, CancellationToken::new())
        .await;

    assert_eq!(record.negotiations(), 1);
    assert_eq!(record.abort_reason(), Some(AbortReason::RecursionBoundExceeded));
}

#[tokio::test]
async fn depth_resets_after_failed_step_succeeds() {
    let device = FixtureDevice::new(vec![
        screen(vec![button("menu", "Menu", 10)]),
        screen(vec![button("login", "Log in", 300)]),
        screen(vec![button("more", "More", 10)]),
        screen(vec![button("confirm", "Confirm", 300)]),
    ])
    .with_transition("menu", 1)
    .with_transition("login", 2)
    .with_transition("more", 3);
    let handler = Arc::new(ScriptedHandler::new(vec![
        RecoveryDecision::Corrective(vec![Step::tap(sel("id=menu"))]),
        RecoveryDecision::Corrective(vec![Step::tap(sel("id=more"))]),
    ]));
    let script = Script::new("two")
        .with_step(Step::tap(sel("id=login")))
        .with_step(Step::tap(sel("id=confirm")));

    let record = engine(0)
        .with_recovery(handler)
        .run(&script, &device, CancellationToken::new())
        .await;

    assert_eq!(record.status, RunStatus::RecoveredAndCompleted);
    assert_eq!(device.taps(), vec!["menu", "login", "more", "confirm"]);
    assert!(record.recoveries.iter().all(|audit| audit.depth == 0));
}

#[tokio::test]
async fn corrective_step_failure_ends_the_run() {
    let device = FixtureDevice::single(login_form());
    let handler = Arc::new(ScriptedHandler::new(vec![RecoveryDecision::Corrective(vec![
        Step::tap(sel("id=ghost")),
    ])]));
    let script = Script::new("a").with_step(Step::tap(sel("id=login")));

    let record = engine(3)
        .with_recovery(handler.clone())
        .run(&script, &device, CancellationToken::new())
        .await;

    assert_eq!(record.status, RunStatus::RecoveredAndAborted);
    let abort = record.abort.as_ref().unwrap();
    assert_eq!(abort.reason, AbortReason::NoTarget);
    assert!(abort.detail.starts_with("corrective step 0"));
    assert_eq!(abort.step, Some(0));
    assert_eq!(handler.contexts().len(), 1);
    let corrective = record.recoveries[0].corrective.as_ref().unwrap();
    assert!(!corrective.completed);
    assert_eq!(corrective.target_resolved, None);
}

#[tokio::test]
async fn history_window_limits_recent_history() {
    let device = FixtureDevice::single(login_form());
    let handler = Arc::new(ScriptedHandler::new(Vec::new()));
    let script = Script::new("hist")
        .with_step(Step::read_screen("summary"))
        .with_step(Step::read_screen("full"))
        .with_step(Step::new(ActionKind::Clear).with_selector(sel("id=user")))
        .with_step(Step::tap(sel("id=login")));

    let record = engine(1)
        .with_recovery(handler.clone())
        .run(&script, &device, CancellationToken::new())
        .await;

    assert_eq!(record.abort_reason(), Some(AbortReason::AgentUnavailable));
    let context = &handler.contexts()[0];
    assert_eq!(context.step_index, 3);
    let indices: Vec<usize> = context.recent_history.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![2, 3]);
}

#[tokio::test]
async fn cancelled_before_start() {
    let device = FixtureDevice::single(login_form());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let script = Script::new("a").with_step(Step::tap(sel("text=OK")));

    let record = engine(1).run(&script, &device, cancel).await;

    assert_eq!(record.abort_reason(), Some(AbortReason::Cancelled));
    assert!(record.steps.is_empty());
    assert!(device.events().is_empty());
    assert_eq!(record.final_state(), Aborted);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_negotiation() {
    let device = FixtureDevice::single(login_form());
    let handler = Arc::new(
        ScriptedHandler::new(vec![RecoveryDecision::Corrective(Vec::new())])
            .with_delay(Duration::from_secs(60)),
    );
    let script = Script::new("a").with_step(Step::tap(sel("id=login")));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let record = engine(1)
        .with_recovery(handler)
        .run(&script, &device, cancel)
        .await;

    assert_eq!(record.abort_reason(), Some(AbortReason::Cancelled));
    assert_eq!(record.status, RunStatus::Aborted);
    assert!(record.recoveries.is_empty());
}

#[tokio::test]
async fn unbound_variable_is_an_invalid_step() {
    let device = FixtureDevice::single(login_form());
    let script = Script::new("bad").with_step(Step::tap(sel("id=${missing}")));

    let record = engine(1).run(&script, &device, CancellationToken::new()).await;

    assert_eq!(record.abort_reason(), Some(AbortReason::InvalidStep));
    assert_eq!(record.abort.as_ref().unwrap().step, Some(0));
    assert!(record.abort.unwrap().detail.contains("missing"));
    assert_eq!(record.steps.len(), 1);
    let step = &record.steps[0];
    assert!(!step.is_success());
    assert_eq!(step.selector.as_deref(), Some("id=${missing}"));
    match &step.result {
        StepResult::Invalid { invalid } => assert!(invalid.contains("missing")),
        other => panic!("expected an invalid step, got {other:?}"),
    }
    assert!(device.events().is_empty());
}

/// Fixture device that cancels the run once it has been tapped `after` times
struct CancelAfterTaps {
    inner: FixtureDevice,
    cancel: CancellationToken,
    after: usize,
}

#[async_trait]
impl ScreenSource for CancelAfterTaps {
    async fn dump_tree(&self) -> Result<Vec<ElementDescriptor>, PerceiverError> {
        self.inner.dump_tree().await
    }
}

#[async_trait]
impl Device for CancelAfterTaps {
    async fn tap(&self, target: &ElementTarget) -> Result<(), DeviceError> {
        self.inner.tap(target).await?;
        if self.inner.taps().len() >= self.after {
            self.cancel.cancel();
        }
        Ok(())
    }

    async fn long_press(&self, target: &ElementTarget, duration: Duration) -> Result<(), DeviceError> {
        self.inner.long_press(target, duration).await
    }

    async fn clear(&self, target: &ElementTarget) -> Result<(), DeviceError> {
        self.inner.clear(target).await
    }

    async fn type_text(&self, target: &ElementTarget, text: &str) -> Result<(), DeviceError> {
        self.inner.type_text(target, text).await
    }

    async fn scroll(&self, direction: ScrollDirection) -> Result<(), DeviceError> {
        self.inner.scroll(direction).await
    }
}

#[tokio::test]
async fn cancellation_between_steps_stops_before_the_next_step() {
    let cancel = CancellationToken::new();
    let device = CancelAfterTaps {
        inner: FixtureDevice::single(login_form()),
        cancel: cancel.clone(),
        after: 1,
    };
    let script = Script::new("two")
        .with_step(Step::tap(sel("text=OK")))
        .with_step(Step::type_text(sel("id=user"), "alice"));

    let record = engine(1).run(&script, &device, cancel).await;

    assert_eq!(record.status, RunStatus::Aborted);
    let abort = record.abort.as_ref().unwrap();
    assert_eq!(abort.reason, AbortReason::Cancelled);
    assert_eq!(abort.step, Some(1));
    assert_eq!(record.steps.len(), 1);
    assert!(record.steps[0].is_success());
    assert_eq!(device.inner.taps(), vec!["ok"]);
    assert_eq!(device.inner.events().len(), 1);
}

#[tokio::test]
async fn cancellation_during_corrective_script_aborts_as_cancelled() {
    let cancel = CancellationToken::new();
    let device = CancelAfterTaps {
        inner: menu_device(),
        cancel: cancel.clone(),
        after: 1,
    };
    let handler = Arc::new(ScriptedHandler::new(vec![RecoveryDecision::Corrective(vec![
        Step::tap(sel("id=menu")),
        Step::tap(sel("id=ghost")),
    ])]));
    let script = Script::new("login").with_step(Step::tap(sel("id=login")));

    let record = engine(3)
        .with_recovery(handler.clone())
        .run(&script, &device, cancel)
        .await;

    assert_eq!(record.status, RunStatus::RecoveredAndAborted);
    let abort = record.abort.as_ref().unwrap();
    assert_eq!(abort.reason, AbortReason::Cancelled);
    assert_eq!(abort.step, Some(0));
    assert!(!abort.detail.contains("corrective step"));
    assert_eq!(device.inner.taps(), vec!["menu"]);
    assert_eq!(handler.contexts().len(), 1);
    let corrective = record.recoveries[0].corrective.as_ref().unwrap();
    assert!(!corrective.completed);
}
