#![forbid(unsafe_code)]

//! End-to-end story scenarios against the headless surface adapter.
//!
//! Covers:
//! (1) same-object steps animate, object changes switch and demote cards
//! (2) boundaries and out-of-range jumps are no-ops
//! (3) wheel accumulation in both directions and cooldown collapse
//! (4) the scroll-lock gate and panel keyboard bindings
//! (5) embedded and button-strategy input
//! (6) readiness timeout (with log capture), superseded and evicted activations
//! (7) warming in stories with more objects than the pool holds
//! (8) a host clock at the end of its range
//!
//! Run:
//!   cargo test -p telar-core --test story_scenarios

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use telar_core::headless::{HeadlessFactory, HeadlessHost};
use telar_core::input::{ClickTarget, InputEvent, NavButton, NavKey, WheelTarget};
use telar_core::model::{ObjectIndex, Step, Story};
use telar_core::navigation::{
    Direction, IgnoreReason, InputOutcome, InputStrategy, TransitionOutcome, ViewportInfo,
};
use telar_core::panel::PanelLayer;
use telar_core::pool::PositionOutcome;
use telar_core::{PageEffect, RuntimeConfig, StoryRuntime};
use tracing_subscriber::layer::SubscriberExt;

// ============================================================================
// Fixtures
// ============================================================================

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn desktop() -> ViewportInfo {
    ViewportInfo::desktop(1280.0, 800.0)
}

fn build(
    steps: Vec<Step>,
    config: RuntimeConfig,
    viewport: ViewportInfo,
    ready_on_create: bool,
) -> (StoryRuntime<HeadlessFactory>, HeadlessHost) {
    let factory = HeadlessFactory::new();
    let host = factory.host();
    host.set_ready_on_create(ready_on_create);
    let mut rt = StoryRuntime::new(
        Story::new(steps, ObjectIndex::new()),
        config,
        factory,
        viewport,
    );
    rt.initialize().expect("fresh runtime initializes");
    (rt, host)
}

fn a_a_b() -> Vec<Step> {
    vec![
        Step::at("a", 0.5, 0.5, 1.0),
        Step::at("a", 0.2, 0.2, 2.0),
        Step::at("b", 0.7, 0.7, 1.5),
    ]
}

fn next() -> InputEvent {
    InputEvent::key(NavKey::ArrowDown)
}

fn prev() -> InputEvent {
    InputEvent::key(NavKey::ArrowUp)
}

// ============================================================================
// Log capture
// ============================================================================

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: tracing::Level,
    message: String,
}

struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct MessageVisitor(Option<String>);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = MessageVisitor(None);
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.0.unwrap_or_default(),
        });
    }
}

fn with_captured_events<F: FnOnce()>(f: F) -> Vec<CapturedEvent> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(EventCapture {
        events: Arc::clone(&events),
    });
    tracing::subscriber::with_default(subscriber, f);
    let captured = events.lock().unwrap().clone();
    captured
}

// ============================================================================
// (1) Card switching
// ============================================================================

#[test]
fn same_object_animates_and_new_object_switches() {
    let (mut rt, host) = build(a_a_b(), RuntimeConfig::default(), desktop(), true);
    let a = host.container_for("a").unwrap();
    let b = host.container_for("b").unwrap();
    assert_eq!(host.created_count(), 2, "step 2's object is preloaded");
    host.clear_commands();

    assert_eq!(
        rt.handle_input(next()),
        InputOutcome::Navigated(TransitionOutcome::Repositioned(PositionOutcome::Applied))
    );
    let commands = host.commands_for(a);
    assert_eq!(commands.len(), 2);
    assert!(commands.iter().all(|c| !c.motion().is_immediate()));

    rt.advance_time(ms(700));
    assert_eq!(
        rt.handle_input(next()),
        InputOutcome::Navigated(TransitionOutcome::Switched {
            object_id: "b".into(),
            ready: true,
            created: false,
            evicted: None,
        })
    );
    assert!(host.commands_for(b).iter().all(|c| c.motion().is_immediate()));
    assert!(!host.record(a).unwrap().active);
    assert!(host.record(b).unwrap().active);
    assert!(host.record(b).unwrap().stacking_order > host.record(a).unwrap().stacking_order);
    assert_eq!(host.created_count(), 2);
    assert_eq!(rt.snapshot().active_object.as_deref(), Some("b"));
}

#[test]
fn forward_moves_activate_steps_backward_moves_do_not() {
    let (mut rt, _host) = build(a_a_b(), RuntimeConfig::default(), desktop(), true);
    rt.drain_effects();

    rt.handle_input(next());
    let effects = rt.drain_effects();
    assert!(effects.contains(&PageEffect::ActivateStep { index: 1 }));
    assert!(effects.contains(&PageEffect::StepChanged {
        index: 1,
        direction: Direction::Forward,
    }));

    rt.advance_time(ms(700));
    rt.handle_input(prev());
    let effects = rt.drain_effects();
    assert!(!effects.iter().any(|e| matches!(e, PageEffect::ActivateStep { .. })));
    assert!(effects.contains(&PageEffect::NavButtons {
        previous_enabled: false,
        next_enabled: true,
    }));
}

#[test]
fn intro_step_leaves_pool_untouched() {
    let mut config = RuntimeConfig::default();
    config.preload.steps_ahead = 0;
    config.preload.steps_behind = 0;
    let steps = vec![Step::intro(), Step::at("a", 0.5, 0.5, 1.0)];
    let (mut rt, host) = build(steps, config, desktop(), true);

    assert!(rt.snapshot().intro_visible);
    assert_eq!(host.created_count(), 0);

    rt.handle_input(next());
    let effects = rt.drain_effects();
    assert!(effects.contains(&PageEffect::IntroVisible { visible: false }));
    assert_eq!(rt.snapshot().active_object.as_deref(), Some("a"));
}

// ============================================================================
// (2) Boundaries
// ============================================================================

#[test]
fn boundaries_are_no_ops() {
    let (mut rt, host) = build(a_a_b(), RuntimeConfig::default(), desktop(), true);
    let created = host.created_count();
    assert_eq!(rt.handle_input(prev()), InputOutcome::Ignored(IgnoreReason::Boundary));
    assert_eq!(rt.go_to_step(99, Direction::Forward), TransitionOutcome::OutOfRange);
    assert_eq!(rt.snapshot().current_index, Some(0));
    assert_eq!(host.created_count(), created, "out-of-range jumps create no cards");

    rt.go_to_step(2, Direction::Forward);
    rt.advance_time(ms(700));
    assert_eq!(rt.handle_input(next()), InputOutcome::Ignored(IgnoreReason::Boundary));
    assert_eq!(rt.snapshot().current_index, Some(2));
}

// ============================================================================
// (3) Wheel
// ============================================================================

#[test]
fn wheel_accumulates_forward_and_back() {
    let (mut rt, _host) = build(a_a_b(), RuntimeConfig::default(), desktop(), true);

    assert_eq!(rt.handle_input(InputEvent::wheel(250.0)), InputOutcome::Absorbed);
    assert!(matches!(
        rt.handle_input(InputEvent::wheel(250.0)),
        InputOutcome::Navigated(_)
    ));
    assert_eq!(rt.snapshot().current_index, Some(1));

    rt.advance_time(ms(700));
    rt.handle_input(InputEvent::wheel(-250.0));
    rt.handle_input(InputEvent::wheel(-250.0));
    assert_eq!(rt.snapshot().current_index, Some(0));
}

#[test]
fn wheel_deltas_summing_to_threshold_commit_once() {
    // Threshold is half the height: 360.5.
    let (mut rt, _host) = build(
        a_a_b(),
        RuntimeConfig::default(),
        ViewportInfo::desktop(1280.0, 721.0),
        true,
    );
    for delta in [100.0, 100.0, 100.0] {
        assert_eq!(rt.handle_input(InputEvent::wheel(delta)), InputOutcome::Absorbed);
    }
    assert!(matches!(
        rt.handle_input(InputEvent::wheel(60.5)),
        InputOutcome::Navigated(_)
    ));
    assert_eq!(rt.snapshot().current_index, Some(1));
    assert_eq!(rt.state().nav.accumulator(), 0.0);
}

#[test]
fn wheel_burst_collapses_into_one_transition() {
    let (mut rt, _host) = build(a_a_b(), RuntimeConfig::default(), desktop(), true);
    let mut navigated = 0;
    for _ in 0..20 {
        rt.advance_time(ms(10));
        if matches!(rt.handle_input(InputEvent::wheel(200.0)), InputOutcome::Navigated(_)) {
            navigated += 1;
        }
    }
    assert_eq!(navigated, 1);
    assert_eq!(rt.snapshot().current_index, Some(1));
}

#[test]
fn wheel_over_surface_is_ignored() {
    let (mut rt, _host) = build(a_a_b(), RuntimeConfig::default(), desktop(), true);
    let event = InputEvent::Wheel {
        delta_y: 200.0,
        target: WheelTarget::Surface,
    };
    assert_eq!(rt.handle_input(event), InputOutcome::Ignored(IgnoreReason::OverSurface));
    assert_eq!(rt.state().nav.accumulator(), 0.0);
}

#[test]
fn swipe_up_moves_forward_on_touch_desktop() {
    let (mut rt, _host) = build(
        a_a_b(),
        RuntimeConfig::default(),
        desktop().with_touch(true),
        true,
    );
    assert_eq!(rt.snapshot().strategy, InputStrategy::TouchScroll);

    rt.handle_input(InputEvent::TouchStart { y: 600.0 });
    assert_eq!(
        rt.handle_input(InputEvent::TouchEnd { y: 550.0 }),
        InputOutcome::Ignored(IgnoreReason::BelowThreshold)
    );

    rt.handle_input(InputEvent::TouchStart { y: 600.0 });
    rt.handle_input(InputEvent::TouchEnd { y: 300.0 });
    assert_eq!(rt.snapshot().current_index, Some(1));
}

// ============================================================================
// (4) Scroll-lock and panels
// ============================================================================

#[test]
fn scroll_lock_blocks_navigation_until_panels_close() {
    let steps = a_a_b()
        .into_iter()
        .map(|s| {
            s.with_layer(PanelLayer::Layer1, "overview")
                .with_layer(PanelLayer::Layer2, "detail")
        })
        .collect();
    let (mut rt, _host) = build(steps, RuntimeConfig::default(), desktop(), true);

    assert_eq!(rt.handle_input(InputEvent::key(NavKey::ArrowRight)), InputOutcome::Panels);
    assert_eq!(rt.handle_input(InputEvent::key(NavKey::ArrowRight)), InputOutcome::Panels);
    let snapshot = rt.snapshot();
    assert!(snapshot.scroll_locked);
    assert_eq!(snapshot.panels.len(), 2);
    assert_eq!(snapshot.panels[1].layer, PanelLayer::Layer2);

    for event in [InputEvent::wheel(500.0), next(), InputEvent::TouchStart { y: 10.0 }] {
        assert_eq!(
            rt.handle_input(event),
            InputOutcome::Ignored(IgnoreReason::ScrollLocked)
        );
    }
    assert_eq!(rt.snapshot().current_index, Some(0));

    assert_eq!(
        rt.handle_input(InputEvent::click(ClickTarget::InsidePanel)),
        InputOutcome::Ignored(IgnoreReason::Unbound)
    );
    rt.handle_input(InputEvent::click(ClickTarget::Outside));
    assert!(rt.snapshot().scroll_locked);
    rt.handle_input(InputEvent::key(NavKey::Escape));
    assert!(!rt.snapshot().scroll_locked);

    assert!(matches!(rt.handle_input(next()), InputOutcome::Navigated(_)));
}

#[test]
fn close_all_releases_lock() {
    let (mut rt, _host) = build(a_a_b(), RuntimeConfig::default(), desktop(), true);
    rt.open_panel(PanelLayer::Layer1, "p");
    rt.open_panel(PanelLayer::Glossary, "term");
    rt.drain_effects();

    let update = rt.close_all_panels();
    assert_eq!(update.closed.len(), 2);
    assert_eq!(
        rt.drain_effects(),
        vec![
            PageEffect::PanelClosed {
                layer: PanelLayer::Glossary,
                reference_id: "term".into(),
            },
            PageEffect::PanelClosed {
                layer: PanelLayer::Layer1,
                reference_id: "p".into(),
            },
            PageEffect::ScrollLock { active: false },
        ]
    );
}

// ============================================================================
// (5) Embedded and button strategy
// ============================================================================

#[test]
fn embedded_mode_ignores_step_keys_and_uses_buttons() {
    let (mut rt, _host) = build(
        a_a_b(),
        RuntimeConfig::default(),
        desktop().with_embedded(true),
        true,
    );
    assert_eq!(rt.snapshot().strategy, InputStrategy::Button);
    assert_eq!(rt.handle_input(next()), InputOutcome::Ignored(IgnoreReason::Embedded));
    assert_eq!(
        rt.handle_input(InputEvent::key(NavKey::ArrowRight)),
        InputOutcome::Ignored(IgnoreReason::Embedded)
    );
    assert_eq!(
        rt.handle_input(InputEvent::wheel(500.0)),
        InputOutcome::Ignored(IgnoreReason::Strategy)
    );

    assert!(matches!(
        rt.handle_input(InputEvent::button(NavButton::Next)),
        InputOutcome::Navigated(_)
    ));
    assert_eq!(
        rt.handle_input(InputEvent::button(NavButton::Next)),
        InputOutcome::Ignored(IgnoreReason::Cooldown)
    );
    rt.advance_time(ms(400));
    rt.handle_input(InputEvent::button(NavButton::Next));
    assert_eq!(rt.snapshot().current_index, Some(2));
}

#[test]
fn embedded_mode_still_closes_panels_from_keyboard() {
    let (mut rt, _host) = build(
        a_a_b(),
        RuntimeConfig::default(),
        desktop().with_embedded(true),
        true,
    );
    rt.open_panel(PanelLayer::Layer1, "p");
    rt.open_panel(PanelLayer::Glossary, "term");
    assert!(rt.snapshot().scroll_locked);

    assert_eq!(rt.handle_input(InputEvent::key(NavKey::Escape)), InputOutcome::Panels);
    assert_eq!(rt.snapshot().panels.len(), 1);
    assert_eq!(rt.handle_input(InputEvent::key(NavKey::ArrowLeft)), InputOutcome::Panels);
    let snapshot = rt.snapshot();
    assert!(snapshot.panels.is_empty());
    assert!(!snapshot.scroll_locked);
    assert_eq!(
        rt.handle_input(InputEvent::key(NavKey::Escape)),
        InputOutcome::Ignored(IgnoreReason::Unbound)
    );
}

#[test]
fn buttons_are_inert_on_desktop() {
    let (mut rt, _host) = build(a_a_b(), RuntimeConfig::default(), desktop(), true);
    assert_eq!(
        rt.handle_input(InputEvent::button(NavButton::Next)),
        InputOutcome::Ignored(IgnoreReason::Strategy)
    );
}

#[test]
fn resize_switches_strategy() {
    let (mut rt, _host) = build(a_a_b(), RuntimeConfig::default(), desktop(), true);
    rt.drain_effects();
    rt.set_viewport(ViewportInfo::desktop(500.0, 800.0));
    assert_eq!(
        rt.drain_effects(),
        vec![PageEffect::StrategySelected {
            strategy: InputStrategy::Button
        }]
    );
}

// ============================================================================
// (6) Readiness and pending activation
// ============================================================================

#[test]
fn readiness_timeout_activates_and_warns() {
    let steps = vec![Step::at("a", 0.5, 0.5, 1.0)];
    let events = with_captured_events(|| {
        let (mut rt, _host) = build(steps, RuntimeConfig::default(), desktop(), false);
        assert_eq!(rt.snapshot().pending_object.as_deref(), Some("a"));
        assert!(rt.advance_time(ms(4_900)).is_empty());
        let ready = rt.advance_time(ms(100));
        assert_eq!(ready.len(), 1);
        let snapshot = rt.snapshot();
        assert_eq!(snapshot.active_object.as_deref(), Some("a"));
        assert_eq!(snapshot.pending_object, None);
    });
    assert!(events.iter().any(|e| {
        e.level == tracing::Level::WARN && e.message.contains("readiness timed out")
    }));
}

#[test]
fn later_switch_supersedes_pending_activation() {
    let steps = vec![Step::at("a", 0.5, 0.5, 1.0), Step::at("b", 0.5, 0.5, 1.0)];
    let (mut rt, host) = build(steps, RuntimeConfig::default(), desktop(), false);
    assert_eq!(rt.snapshot().pending_object.as_deref(), Some("a"));

    rt.handle_input(next());
    assert_eq!(rt.snapshot().pending_object.as_deref(), Some("b"));

    host.make_ready("a");
    rt.advance_time(ms(100));
    assert_eq!(rt.snapshot().active_object, None);

    host.make_ready("b");
    rt.advance_time(ms(100));
    let snapshot = rt.snapshot();
    assert_eq!(snapshot.active_object.as_deref(), Some("b"));
    assert_eq!(snapshot.pending_object, None);
}

#[test]
fn eviction_drops_queued_position_and_pending_activation() {
    let mut config = RuntimeConfig::default();
    config.pool.max_cards = 1;
    let steps = vec![Step::at("a", 0.5, 0.5, 1.0), Step::at("b", 0.5, 0.5, 1.0)];
    let (mut rt, host) = build(steps, config, desktop(), false);
    let a = host.container_for("a").unwrap();

    let outcome = rt.handle_input(next());
    assert_eq!(
        outcome,
        InputOutcome::Navigated(TransitionOutcome::Switched {
            object_id: "b".into(),
            ready: false,
            created: true,
            evicted: Some("a".into()),
        })
    );
    assert_eq!(host.released_objects(), vec!["a".to_owned()]);
    assert_eq!(rt.snapshot().pending_object.as_deref(), Some("b"));

    rt.advance_time(ms(10_000));
    assert!(host.commands_for(a).is_empty());
    assert_eq!(rt.state().pool.pending_watches(), 0);
}

#[test]
fn event_driven_readiness_completes_activation() {
    let factory = HeadlessFactory::new();
    let host = factory.host();
    host.set_signals_readiness(true);
    let mut rt = StoryRuntime::new(
        Story::new(vec![Step::at("a", 0.5, 0.5, 1.0)], ObjectIndex::new()),
        RuntimeConfig::default(),
        factory,
        desktop(),
    );
    rt.initialize().unwrap();

    let container = host.make_ready("a").unwrap();
    assert!(rt.advance_time(ms(500)).is_empty(), "signalled surfaces are not polled");
    assert!(rt.notify_surface_ready(container).is_some());
    assert_eq!(rt.snapshot().active_object.as_deref(), Some("a"));
    assert_eq!(host.commands_for(container).len(), 2);
}

// ============================================================================
// (7) Warming past the pool capacity
// ============================================================================

#[test]
fn warming_keeps_up_when_story_outgrows_pool() {
    let mut config = RuntimeConfig::default();
    config.pool.max_cards = 3;
    let steps = ["a", "b", "c", "d", "e", "f", "g"]
        .into_iter()
        .map(|id| Step::at(id, 0.5, 0.5, 1.0))
        .collect();
    let (mut rt, host) = build(steps, config, desktop(), true);

    for index in 1..=3 {
        rt.go_to_step(index, Direction::Forward);
    }
    let pool = &rt.state().pool;
    let pooled: Vec<&str> = pool.cards().iter().map(|card| card.object_id()).collect();
    assert_eq!(pooled, vec!["c", "d", "e"]);
    assert!(pool.card("d").is_some_and(|card| card.is_active()));
    assert_eq!(rt.snapshot().active_object.as_deref(), Some("d"));
    assert_eq!(host.released_objects().len(), 2);
}

// ============================================================================
// (8) Clock range
// ============================================================================

#[test]
fn navigation_survives_a_clock_at_its_limit() {
    let steps = vec![
        Step::at("a", 0.5, 0.5, 1.0),
        Step::at("b", 0.5, 0.5, 1.0),
        Step::at("c", 0.5, 0.5, 1.0),
    ];
    let (mut rt, host) = build(steps, RuntimeConfig::default(), desktop(), false);
    host.make_ready("a");
    rt.set_time(Duration::MAX);
    assert_eq!(rt.snapshot().active_object.as_deref(), Some("a"));

    assert!(matches!(rt.handle_input(next()), InputOutcome::Navigated(_)));
    rt.advance_time(ms(100));
    assert_eq!(rt.handle_input(InputEvent::wheel(200.0)), InputOutcome::Absorbed);
    assert_eq!(rt.snapshot().current_index, Some(1));
}
