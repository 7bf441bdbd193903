//! Property-based invariant tests for navigation and the panel stack.
//!
//! 1. Scroll-lock is active iff the panel stack is non-empty.
//! 2. The stack never holds two first-level panels.
//! 3. While locked, no navigation input moves the current step.
//! 4. The wheel accumulator stays strictly inside the threshold.
//! 5. The current index always stays inside the story.
//! 6. A burst of wheel events inside one cooldown commits at most once.

use std::time::Duration;

use proptest::prelude::*;
use telar_core::config::NavigationConfig;
use telar_core::headless::HeadlessFactory;
use telar_core::input::{ClickTarget, InputEvent, NavButton, NavKey, WheelTarget};
use telar_core::model::{ObjectIndex, Step, Story};
use telar_core::navigation::{Direction, InputOutcome, ScrollAccumulator, ViewportInfo};
use telar_core::panel::{PanelLayer, PanelStack};
use telar_core::{RuntimeConfig, StoryRuntime};

// ── Strategies ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum PanelOp {
    Open(PanelLayer, u8),
    CloseTop,
    CloseAll,
    Click(ClickTarget),
}

fn panel_op() -> impl Strategy<Value = PanelOp> {
    let layer = prop_oneof![
        Just(PanelLayer::Layer1),
        Just(PanelLayer::Layer2),
        Just(PanelLayer::Glossary),
    ];
    let click = prop_oneof![
        Just(ClickTarget::InsidePanel),
        Just(ClickTarget::Trigger),
        Just(ClickTarget::Outside),
    ];
    prop_oneof![
        3 => (layer, 0u8..4).prop_map(|(l, r)| PanelOp::Open(l, r)),
        2 => Just(PanelOp::CloseTop),
        1 => Just(PanelOp::CloseAll),
        2 => click.prop_map(PanelOp::Click),
    ]
}

fn input_event() -> impl Strategy<Value = InputEvent> {
    let key = prop_oneof![
        Just(NavKey::ArrowDown),
        Just(NavKey::ArrowUp),
        Just(NavKey::PageDown),
        Just(NavKey::PageUp),
        Just(NavKey::Space),
        Just(NavKey::ArrowRight),
        Just(NavKey::ArrowLeft),
        Just(NavKey::Escape),
    ];
    prop_oneof![
        4 => (-400.0f64..400.0, any::<bool>()).prop_map(|(delta_y, over)| InputEvent::Wheel {
            delta_y,
            target: if over { WheelTarget::Surface } else { WheelTarget::Page },
        }),
        1 => (0.0f64..900.0).prop_map(|y| InputEvent::TouchStart { y }),
        1 => (0.0f64..900.0).prop_map(|y| InputEvent::TouchEnd { y }),
        2 => key.prop_map(InputEvent::key),
        1 => prop_oneof![Just(NavButton::Previous), Just(NavButton::Next)].prop_map(InputEvent::button),
        1 => Just(InputEvent::click(ClickTarget::Outside)),
    ]
}

fn story(len: usize) -> Story {
    let steps = (0..len)
        .map(|i| {
            Step::at(format!("obj-{}", i % 3), 0.5, 0.5, 1.0)
                .with_layer(PanelLayer::Layer1, format!("panel-{i}"))
                .with_layer(PanelLayer::Layer2, format!("detail-{i}"))
        })
        .collect();
    Story::new(steps, ObjectIndex::new())
}

fn runtime(len: usize, viewport: ViewportInfo) -> StoryRuntime<HeadlessFactory> {
    let factory = HeadlessFactory::new();
    factory.host().set_ready_on_create(true);
    let mut rt = StoryRuntime::new(story(len), RuntimeConfig::default(), factory, viewport);
    rt.initialize().expect("fresh runtime initializes");
    rt
}

// ═══════════════════════════════════════════════════════════════════════════
// 1-2. Panel stack lock equivalence and single root
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn panel_lock_tracks_stack(ops in proptest::collection::vec(panel_op(), 0..60)) {
        let mut stack = PanelStack::new();
        for op in ops {
            match op {
                PanelOp::Open(layer, r) => { stack.open(layer, format!("ref-{r}")); }
                PanelOp::CloseTop => { stack.close_top(); }
                PanelOp::CloseAll => { stack.close_all(); }
                PanelOp::Click(target) => { stack.handle_click(target); }
            }
            prop_assert_eq!(stack.is_locked(), !stack.is_empty());
            let roots = stack
                .entries()
                .iter()
                .filter(|e| e.layer == PanelLayer::Layer1)
                .count();
            prop_assert!(roots <= 1);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 3. Locked runtime ignores navigation input
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn locked_runtime_holds_position(
        events in proptest::collection::vec(input_event(), 1..40),
        step_ms in 0u64..800,
    ) {
        let mut rt = runtime(6, ViewportInfo::desktop(1280.0, 800.0));
        rt.open_panel(PanelLayer::Glossary, "term");
        rt.open_panel(PanelLayer::Glossary, "other");
        rt.open_panel(PanelLayer::Glossary, "third");
        let index = rt.snapshot().current_index;

        for event in events {
            rt.advance_time(Duration::from_millis(step_ms));
            let outcome = rt.handle_input(event);
            let locked = rt.snapshot().scroll_locked;
            if locked {
                prop_assert_eq!(rt.snapshot().current_index, index);
                prop_assert_eq!(rt.state().nav.accumulator(), 0.0);
            } else {
                // Unlocked only by panel gestures; nothing else moved first.
                prop_assert_eq!(outcome, InputOutcome::Panels);
                break;
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 4-5. Accumulator bound and index range under arbitrary input
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn arbitrary_input_keeps_state_in_range(
        len in 1usize..8,
        narrow in any::<bool>(),
        touch in any::<bool>(),
        events in proptest::collection::vec((input_event(), 0u64..900), 1..80),
    ) {
        let width = if narrow { 600.0 } else { 1280.0 };
        let mut rt = runtime(len, ViewportInfo::desktop(width, 800.0).with_touch(touch));
        let threshold = rt.state().nav.thresholds().scroll;

        for (event, ms) in events {
            rt.advance_time(Duration::from_millis(ms));
            rt.handle_input(event);
            let snapshot = rt.snapshot();
            let index = snapshot.current_index.unwrap_or(0);
            prop_assert!(index < len);
            prop_assert!(rt.state().nav.accumulator().abs() < threshold);
            prop_assert_eq!(snapshot.scroll_locked, !snapshot.panels.is_empty());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 6. Cooldown collapses a wheel burst into one transition
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn wheel_burst_commits_once_per_cooldown(
        deltas in proptest::collection::vec(50.0f64..400.0, 1..60),
    ) {
        let config = NavigationConfig::default();
        let threshold = 400.0;
        let mut acc = ScrollAccumulator::default();
        let mut commits = 0;
        for (i, delta) in deltas.iter().enumerate() {
            // First commit starts the cooldown; the rest of the burst is inside it.
            let cooling = commits > 0;
            if let Some(direction) = acc.feed(*delta, threshold, &config, cooling) {
                prop_assert_eq!(direction, Direction::Forward);
                commits += 1;
            }
            prop_assert!(acc.value().abs() < threshold, "event {i}");
        }
        prop_assert!(commits <= 1);
    }
}
