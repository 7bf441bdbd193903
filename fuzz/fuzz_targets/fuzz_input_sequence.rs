#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use telar_core::headless::HeadlessFactory;
use telar_core::input::{ClickTarget, InputEvent, NavButton, NavKey, WheelTarget};
use telar_core::model::{ObjectIndex, Step, Story};
use telar_core::navigation::ViewportInfo;
use telar_core::panel::PanelLayer;
use telar_core::{RuntimeConfig, StoryRuntime};

#[derive(Debug, Arbitrary)]
enum Op {
    Wheel(i16, bool),
    TouchStart(u16),
    TouchEnd(u16),
    Key(u8),
    Button(bool),
    Click(u8),
    Advance(u16),
    GoTo(u8, bool),
    OpenPanel(u8, u8),
    MakeReady(u8),
    Resize(u16, bool, bool),
}

#[derive(Debug, Arbitrary)]
struct Input {
    steps: Vec<(u8, bool)>,
    capacity: u8,
    ops: Vec<Op>,
}

const KEYS: [NavKey; 8] = [
    NavKey::ArrowDown,
    NavKey::ArrowUp,
    NavKey::ArrowLeft,
    NavKey::ArrowRight,
    NavKey::PageDown,
    NavKey::PageUp,
    NavKey::Space,
    NavKey::Escape,
];

fuzz_target!(|input: Input| {
    if input.steps.is_empty() || input.steps.len() > 32 || input.ops.len() > 256 {
        return;
    }
    let steps = input
        .steps
        .iter()
        .map(|&(object, intro)| {
            if intro {
                Step::intro()
            } else {
                Step::at(format!("obj-{}", object % 6), 0.5, 0.5, 1.0)
                    .with_layer(PanelLayer::Layer1, "root")
                    .with_layer(PanelLayer::Layer2, "detail")
            }
        })
        .collect();
    let len = input.steps.len();
    let mut config = RuntimeConfig::default();
    config.pool.max_cards = usize::from(input.capacity % 5) + 1;
    let capacity = config.pool.max_cards;

    let factory = HeadlessFactory::new();
    let host = factory.host();
    let mut runtime = StoryRuntime::new(
        Story::new(steps, ObjectIndex::new()),
        config,
        factory,
        ViewportInfo::desktop(1280.0, 800.0),
    );
    if runtime.initialize().is_err() {
        return;
    }

    for op in input.ops {
        match op {
            Op::Wheel(delta, over) => {
                let target = if over { WheelTarget::Surface } else { WheelTarget::Page };
                runtime.handle_input(InputEvent::Wheel {
                    delta_y: f64::from(delta),
                    target,
                });
            }
            Op::TouchStart(y) => {
                runtime.handle_input(InputEvent::TouchStart { y: f64::from(y) });
            }
            Op::TouchEnd(y) => {
                runtime.handle_input(InputEvent::TouchEnd { y: f64::from(y) });
            }
            Op::Key(k) => {
                runtime.handle_input(InputEvent::key(KEYS[usize::from(k) % KEYS.len()]));
            }
            Op::Button(next) => {
                let button = if next { NavButton::Next } else { NavButton::Previous };
                runtime.handle_input(InputEvent::button(button));
            }
            Op::Click(c) => {
                let target = match c % 3 {
                    0 => ClickTarget::InsidePanel,
                    1 => ClickTarget::Trigger,
                    _ => ClickTarget::Outside,
                };
                runtime.handle_input(InputEvent::click(target));
            }
            Op::Advance(ms) => {
                runtime.advance_time(Duration::from_millis(u64::from(ms)));
            }
            Op::GoTo(index, forward) => {
                let direction = if forward {
                    telar_core::navigation::Direction::Forward
                } else {
                    telar_core::navigation::Direction::Backward
                };
                runtime.go_to_step(usize::from(index), direction);
            }
            Op::OpenPanel(layer, r) => {
                let layer = match layer % 3 {
                    0 => PanelLayer::Layer1,
                    1 => PanelLayer::Layer2,
                    _ => PanelLayer::Glossary,
                };
                runtime.open_panel(layer, &format!("ref-{r}"));
            }
            Op::MakeReady(object) => {
                host.make_ready(&format!("obj-{}", object % 6));
            }
            Op::Resize(width, touch, embedded) => {
                let viewport = ViewportInfo::desktop(f64::from(width), 800.0)
                    .with_touch(touch)
                    .with_embedded(embedded);
                runtime.set_viewport(viewport);
            }
        }

        // Post-conditions that must always hold:
        let snapshot = runtime.snapshot();
        assert!(snapshot.cards.len() <= capacity, "pool over capacity");
        assert_eq!(host.live_count(), snapshot.cards.len(), "leaked surface");
        assert!(snapshot.current_index.is_some_and(|i| i < len), "index OOB");
        assert_eq!(snapshot.scroll_locked, !snapshot.panels.is_empty());
        assert!(
            snapshot.cards.iter().filter(|card| card.active).count() <= 1,
            "more than one active card"
        );
        let roots = snapshot
            .panels
            .iter()
            .filter(|entry| entry.layer == PanelLayer::Layer1)
            .count();
        assert!(roots <= 1, "two first-level panels");
    }
});
