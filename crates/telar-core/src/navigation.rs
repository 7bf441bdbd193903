#![forbid(unsafe_code)]

//! Navigation controller: input strategies, thresholds and step transitions.
//!
//! Every input path (wheel, swipe, keys, buttons) funnels into one
//! transition routine, [`go_to_step`], which decides between repositioning
//! the active card and switching to another object's card.
//!
//! # Input gating
//!
//! The scroll-lock owned by the panel stack is checked once, at the input
//! boundary, before any navigation input touches state. Panel gestures
//! (outside clicks, Escape, the arrow keys bound to panels) pass the gate,
//! since they are how a reader leaves the locked state.
//!
//! # Invariants
//!
//! 1. While the scroll-lock is active no navigation input changes the
//!    current index or the accumulator.
//! 2. The accumulator stays strictly inside `(-threshold, threshold)` after
//!    every event; a commit resets it to zero.
//! 3. At most one pending activation exists. A later object switch replaces
//!    it; evicting its card clears it.
//!
//! # Failure Modes
//!
//! - Out-of-range indices are ignored with a debug log.
//! - Steps with non-numeric coordinates still switch cards; only the
//!   position command is skipped (warned).

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::clock::Timestamp;
use crate::config::NavigationConfig;
use crate::geometry::ViewSpec;
use crate::input::{InputEvent, NavButton, NavKey, WheelTarget};
use crate::model::object_key;
use crate::panel::{PanelLayer, PanelUpdate};
use crate::pool::{PositionMode, PositionOutcome, ReadyCard};
use crate::preload;
use crate::state::{PageEffect, RuntimeState};
use crate::surface::{ContainerId, SurfaceFactory};

// ---------------------------------------------------------------------------
// Strategy and thresholds
// ---------------------------------------------------------------------------

/// Direction of a step transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

/// How the reader moves between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputStrategy {
    /// Desktop wheel scrolling.
    Scroll,
    /// Desktop-sized viewport on a touch-capable device: wheel and swipe.
    TouchScroll,
    /// Previous/next buttons, for narrow viewports and embeds.
    Button,
}

/// What the host knows about the page viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportInfo {
    pub width: f64,
    pub height: f64,
    /// Rendered inside another page's frame.
    #[serde(default)]
    pub embedded: bool,
    #[serde(default)]
    pub touch_capable: bool,
}

impl ViewportInfo {
    #[must_use]
    pub const fn desktop(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            embedded: false,
            touch_capable: false,
        }
    }

    #[must_use]
    pub const fn with_touch(mut self, touch_capable: bool) -> Self {
        self.touch_capable = touch_capable;
        self
    }

    #[must_use]
    pub const fn with_embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }
}

/// Pick the input strategy for a viewport.
#[must_use]
pub fn select_strategy(viewport: &ViewportInfo, config: &NavigationConfig) -> InputStrategy {
    if viewport.embedded || viewport.width < config.mobile_breakpoint_px {
        InputStrategy::Button
    } else if viewport.touch_capable {
        InputStrategy::TouchScroll
    } else {
        InputStrategy::Scroll
    }
}

/// Pixel thresholds derived from the viewport height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub scroll: f64,
    pub swipe: f64,
}

impl Thresholds {
    #[must_use]
    pub fn compute(viewport: &ViewportInfo, config: &NavigationConfig) -> Self {
        let height = viewport.height.max(1.0);
        Self {
            scroll: height * config.scroll_threshold_ratio,
            swipe: height * config.swipe_threshold_ratio,
        }
    }
}

// ---------------------------------------------------------------------------
// Cooldown and accumulator
// ---------------------------------------------------------------------------

/// A refractory window after a committed transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cooldown {
    until: Option<Timestamp>,
}

impl Cooldown {
    pub fn start(&mut self, now: Timestamp, duration: Duration) {
        self.until = Some(now.saturating_add(duration));
    }

    #[must_use]
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.until.is_some_and(|until| now < until)
    }
}

/// Running sum of wheel deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollAccumulator {
    value: f64,
}

impl ScrollAccumulator {
    /// Add one wheel delta.
    ///
    /// Deltas are clamped to `±max_wheel_delta`. While `cooling`, they are
    /// damped and can never commit. Otherwise crossing `±threshold` commits
    /// a direction and resets the sum.
    pub fn feed(
        &mut self,
        delta: f64,
        threshold: f64,
        config: &NavigationConfig,
        cooling: bool,
    ) -> Option<Direction> {
        if !delta.is_finite() {
            return None;
        }
        let delta = delta.clamp(-config.max_wheel_delta, config.max_wheel_delta);
        if cooling {
            let limit = threshold * (1.0 - f64::EPSILON);
            self.value = (self.value + delta * config.cooldown_damping).clamp(-limit, limit);
            return None;
        }
        self.value += delta;
        let direction = if self.value >= threshold {
            Direction::Forward
        } else if self.value <= -threshold {
            Direction::Backward
        } else {
            return None;
        };
        self.value = 0.0;
        Some(direction)
    }

    #[inline]
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

// ---------------------------------------------------------------------------
// NavigationState
// ---------------------------------------------------------------------------

/// An object switch waiting for its card to become ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingActivation {
    pub object_id: String,
    pub container: ContainerId,
    pub step_index: Option<usize>,
    pub direction: Direction,
}

/// Navigation-owned part of the runtime state.
#[derive(Debug, Clone)]
pub struct NavigationState {
    viewport: ViewportInfo,
    strategy: InputStrategy,
    thresholds: Thresholds,
    current: Option<usize>,
    intro_visible: bool,
    active_object: Option<String>,
    pending: Option<PendingActivation>,
    accumulator: ScrollAccumulator,
    scroll_cooldown: Cooldown,
    button_cooldown: Cooldown,
    touch_start: Option<f64>,
    stacking_counter: u32,
}

impl NavigationState {
    #[must_use]
    pub fn new(viewport: ViewportInfo, config: &NavigationConfig) -> Self {
        Self {
            viewport,
            strategy: select_strategy(&viewport, config),
            thresholds: Thresholds::compute(&viewport, config),
            current: None,
            intro_visible: false,
            active_object: None,
            pending: None,
            accumulator: ScrollAccumulator::default(),
            scroll_cooldown: Cooldown::default(),
            button_cooldown: Cooldown::default(),
            touch_start: None,
            stacking_counter: 0,
        }
    }

    /// Recompute strategy and thresholds. Returns the new strategy when it
    /// changed.
    pub fn reconfigure(
        &mut self,
        viewport: ViewportInfo,
        config: &NavigationConfig,
    ) -> Option<InputStrategy> {
        self.viewport = viewport;
        self.thresholds = Thresholds::compute(&viewport, config);
        self.accumulator.reset();
        self.touch_start = None;
        let strategy = select_strategy(&viewport, config);
        let changed = strategy != self.strategy;
        self.strategy = strategy;
        changed.then_some(strategy)
    }

    /// Current step index; `None` before the first transition.
    #[inline]
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    #[inline]
    #[must_use]
    pub fn strategy(&self) -> InputStrategy {
        self.strategy
    }

    #[inline]
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    #[inline]
    #[must_use]
    pub fn viewport(&self) -> ViewportInfo {
        self.viewport
    }

    #[inline]
    #[must_use]
    pub fn intro_visible(&self) -> bool {
        self.intro_visible
    }

    /// Object whose card is currently shown.
    #[must_use]
    pub fn active_object(&self) -> Option<&str> {
        self.active_object.as_deref()
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingActivation> {
        self.pending.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn accumulator(&self) -> f64 {
        self.accumulator.value()
    }

    /// Whether `object_id` is what the reader is looking at or about to see.
    fn is_target(&self, object_id: &str) -> bool {
        let key = object_key(object_id);
        self.pending
            .as_ref()
            .map(|p| p.object_id.as_str())
            .or(self.active_object.as_deref())
            .is_some_and(|target| object_key(target) == key)
    }

    fn forget_object(&mut self, object_id: &str) {
        let key = object_key(object_id);
        if self
            .pending
            .as_ref()
            .is_some_and(|p| object_key(&p.object_id) == key)
        {
            tracing::debug!(object_id, "pending activation cleared; card evicted");
            self.pending = None;
        }
        if self
            .active_object
            .as_deref()
            .is_some_and(|active| object_key(active) == key)
        {
            self.active_object = None;
        }
    }

    fn next_stacking_order(&mut self) -> u32 {
        self.stacking_counter = self.stacking_counter.saturating_add(1);
        self.stacking_counter
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a transition did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The runtime is not running; nothing changed.
    Inactive,
    /// The index was outside the story; nothing changed.
    OutOfRange,
    /// An intro slide is showing; the pool was not touched.
    Intro,
    /// Same object: the shown card was repositioned.
    Repositioned(PositionOutcome),
    /// A different card was acquired.
    Switched {
        object_id: String,
        /// Activation happened immediately; otherwise it is pending.
        ready: bool,
        created: bool,
        evicted: Option<String>,
    },
    /// The step names no object.
    NoObject,
}

/// Why an input did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotRunning,
    ScrollLocked,
    Cooldown,
    /// The input belongs to another strategy.
    Strategy,
    OverSurface,
    BelowThreshold,
    /// Keyboard navigation is off inside embeds.
    Embedded,
    /// Already at the first or last step.
    Boundary,
    /// Nothing is bound to the input in the current state.
    Unbound,
}

/// Result of one input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOutcome {
    Navigated(TransitionOutcome),
    /// Consumed without a transition (accumulating scroll, touch start).
    Absorbed,
    Panels,
    Ignored(IgnoreReason),
}

// ---------------------------------------------------------------------------
// Input handling
// ---------------------------------------------------------------------------

/// Route one input event.
pub fn handle_input<F: SurfaceFactory>(state: &mut RuntimeState<F>, event: InputEvent) -> InputOutcome {
    if !state.is_running() {
        return InputOutcome::Ignored(IgnoreReason::NotRunning);
    }
    let now = state.clock.now();
    match event {
        InputEvent::Click { target } => {
            let update = state.panels.handle_click(target);
            panel_outcome(state, update)
        }
        InputEvent::Key { key } => handle_key(state, key, now),
        _ if state.panels.is_locked() => {
            tracing::debug!(?event, "navigation input ignored; scroll locked");
            InputOutcome::Ignored(IgnoreReason::ScrollLocked)
        }
        InputEvent::Wheel { delta_y, target } => handle_wheel(state, delta_y, target, now),
        InputEvent::TouchStart { y } => {
            if state.nav.strategy == InputStrategy::Button {
                return InputOutcome::Ignored(IgnoreReason::Strategy);
            }
            state.nav.touch_start = Some(y);
            InputOutcome::Absorbed
        }
        InputEvent::TouchEnd { y } => handle_swipe(state, y, now),
        InputEvent::Button { button } => handle_button(state, button, now),
    }
}

fn handle_key<F: SurfaceFactory>(
    state: &mut RuntimeState<F>,
    key: NavKey,
    now: Timestamp,
) -> InputOutcome {
    match key {
        NavKey::Escape | NavKey::ArrowLeft => {
            let update = state.panels.close_top();
            panel_outcome(state, update)
        }
        // Embeds navigate with buttons only; closing panels stays available.
        _ if state.nav.viewport.embedded => InputOutcome::Ignored(IgnoreReason::Embedded),
        NavKey::ArrowRight => open_layer_for_current_step(state),
        NavKey::ArrowDown | NavKey::PageDown | NavKey::Space => {
            step_with_scroll_cooldown(state, Direction::Forward, now)
        }
        NavKey::ArrowUp | NavKey::PageUp => step_with_scroll_cooldown(state, Direction::Backward, now),
    }
}

fn open_layer_for_current_step<F: SurfaceFactory>(state: &mut RuntimeState<F>) -> InputOutcome {
    let layer = match state.panels.top().map(|entry| entry.layer) {
        None => PanelLayer::Layer1,
        Some(PanelLayer::Layer1) => PanelLayer::Layer2,
        Some(_) => return InputOutcome::Ignored(IgnoreReason::Unbound),
    };
    let reference = state
        .nav
        .current
        .and_then(|index| state.story.step(index))
        .and_then(|step| step.layer_ref(layer))
        .map(str::to_owned);
    match reference {
        Some(reference) => {
            let update = state.panels.open(layer, reference);
            panel_outcome(state, update)
        }
        None => InputOutcome::Ignored(IgnoreReason::Unbound),
    }
}

fn step_with_scroll_cooldown<F: SurfaceFactory>(
    state: &mut RuntimeState<F>,
    direction: Direction,
    now: Timestamp,
) -> InputOutcome {
    if state.panels.is_locked() {
        return InputOutcome::Ignored(IgnoreReason::ScrollLocked);
    }
    if state.nav.scroll_cooldown.is_active(now) {
        return InputOutcome::Ignored(IgnoreReason::Cooldown);
    }
    let outcome = step(state, direction);
    if matches!(outcome, InputOutcome::Navigated(_)) {
        let cooldown = state.config.navigation.scroll_cooldown();
        state.nav.scroll_cooldown.start(now, cooldown);
    }
    outcome
}

fn handle_wheel<F: SurfaceFactory>(
    state: &mut RuntimeState<F>,
    delta_y: f64,
    target: WheelTarget,
    now: Timestamp,
) -> InputOutcome {
    if state.nav.strategy == InputStrategy::Button {
        return InputOutcome::Ignored(IgnoreReason::Strategy);
    }
    if target == WheelTarget::Surface {
        return InputOutcome::Ignored(IgnoreReason::OverSurface);
    }
    let cooling = state.nav.scroll_cooldown.is_active(now);
    let threshold = state.nav.thresholds.scroll;
    let committed = state
        .nav
        .accumulator
        .feed(delta_y, threshold, &state.config.navigation, cooling);
    match committed {
        Some(direction) => {
            let outcome = step(state, direction);
            if matches!(outcome, InputOutcome::Navigated(_)) {
                let cooldown = state.config.navigation.scroll_cooldown();
                state.nav.scroll_cooldown.start(now, cooldown);
            }
            outcome
        }
        None if cooling => InputOutcome::Ignored(IgnoreReason::Cooldown),
        None => InputOutcome::Absorbed,
    }
}

fn handle_swipe<F: SurfaceFactory>(
    state: &mut RuntimeState<F>,
    end_y: f64,
    now: Timestamp,
) -> InputOutcome {
    if state.nav.strategy == InputStrategy::Button {
        return InputOutcome::Ignored(IgnoreReason::Strategy);
    }
    let Some(start_y) = state.nav.touch_start.take() else {
        return InputOutcome::Ignored(IgnoreReason::Unbound);
    };
    if state.nav.scroll_cooldown.is_active(now) {
        return InputOutcome::Ignored(IgnoreReason::Cooldown);
    }
    // Finger moving up (y decreasing) reads forward.
    let travel = start_y - end_y;
    if !travel.is_finite() || travel.abs() <= state.nav.thresholds.swipe {
        return InputOutcome::Ignored(IgnoreReason::BelowThreshold);
    }
    let direction = if travel > 0.0 {
        Direction::Forward
    } else {
        Direction::Backward
    };
    let outcome = step(state, direction);
    if matches!(outcome, InputOutcome::Navigated(_)) {
        let cooldown = state.config.navigation.scroll_cooldown();
        state.nav.scroll_cooldown.start(now, cooldown);
    }
    outcome
}

fn handle_button<F: SurfaceFactory>(
    state: &mut RuntimeState<F>,
    button: NavButton,
    now: Timestamp,
) -> InputOutcome {
    if state.nav.strategy != InputStrategy::Button {
        return InputOutcome::Ignored(IgnoreReason::Strategy);
    }
    if state.nav.button_cooldown.is_active(now) {
        return InputOutcome::Ignored(IgnoreReason::Cooldown);
    }
    let direction = match button {
        NavButton::Previous => Direction::Backward,
        NavButton::Next => Direction::Forward,
    };
    let outcome = step(state, direction);
    if matches!(outcome, InputOutcome::Navigated(_)) {
        let cooldown = state.config.navigation.button_cooldown();
        state.nav.button_cooldown.start(now, cooldown);
    }
    outcome
}

/// Move one step in `direction`, or report the boundary.
fn step<F: SurfaceFactory>(state: &mut RuntimeState<F>, direction: Direction) -> InputOutcome {
    let target = match (direction, state.nav.current) {
        (Direction::Forward, None) => Some(0),
        (Direction::Forward, Some(current)) => Some(current + 1).filter(|&i| i < state.story.len()),
        (Direction::Backward, current) => current.and_then(|c| c.checked_sub(1)),
    };
    match target {
        Some(index) => InputOutcome::Navigated(go_to_step(state, index, direction)),
        None => InputOutcome::Ignored(IgnoreReason::Boundary),
    }
}

fn panel_outcome<F: SurfaceFactory>(state: &mut RuntimeState<F>, update: PanelUpdate) -> InputOutcome {
    if update.is_empty() {
        return InputOutcome::Ignored(IgnoreReason::Unbound);
    }
    state.record_panel_update(update);
    InputOutcome::Panels
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Show step `index`, arriving from `direction`.
///
/// Shared by every input path and by hosts driving the runtime directly.
/// Committed transitions warm the neighborhood of the new step.
pub fn go_to_step<F: SurfaceFactory>(
    state: &mut RuntimeState<F>,
    index: usize,
    direction: Direction,
) -> TransitionOutcome {
    let len = state.story.len();
    let Some(step) = state.story.step(index).cloned() else {
        tracing::debug!(index, len, "step index out of range; ignored");
        return TransitionOutcome::OutOfRange;
    };
    let now = state.clock.now();

    state.nav.current = Some(index);
    state.nav.accumulator.reset();
    state.push_effect(PageEffect::StepChanged { index, direction });
    if direction == Direction::Forward {
        state.push_effect(PageEffect::ActivateStep { index });
    }
    state.push_effect(PageEffect::NavButtons {
        previous_enabled: index > 0,
        next_enabled: index + 1 < len,
    });
    tracing::debug!(index, ?direction, "step changed");

    let outcome = if step.intro {
        set_intro_visible(state, true);
        TransitionOutcome::Intro
    } else {
        let leaving_intro = set_intro_visible(state, false);
        match step.object_id() {
            None => {
                tracing::warn!(index, "step names no object; viewer unchanged");
                TransitionOutcome::NoObject
            }
            Some(object_id) => {
                let view = step.view_spec();
                if view.is_none() {
                    tracing::warn!(index, object_id, "invalid step coordinates; position skipped");
                }
                if !leaving_intro && state.nav.is_target(object_id) {
                    let position = view.map_or(PositionOutcome::Skipped, |view| {
                        state.pool.apply_position(object_id, view, PositionMode::Animate)
                    });
                    TransitionOutcome::Repositioned(position)
                } else {
                    switch_to_object(state, object_id, Some(index), view, direction)
                }
            }
        }
    };

    let keep: Vec<&str> = state
        .nav
        .active_object
        .as_deref()
        .into_iter()
        .chain(state.nav.pending.as_ref().map(|p| p.object_id.as_str()))
        .collect();
    preload::warm(&mut state.pool, &state.story, index, state.preload, &keep, now);
    outcome
}

/// Make `object_id`'s card the shown one, snapping it to `view`.
///
/// When the card is not ready yet, activation is deferred until it is; a
/// later switch replaces the deferred one.
pub fn switch_to_object<F: SurfaceFactory>(
    state: &mut RuntimeState<F>,
    object_id: &str,
    step_index: Option<usize>,
    view: Option<ViewSpec>,
    direction: Direction,
) -> TransitionOutcome {
    let now = state.clock.now();
    let order = state.nav.next_stacking_order();
    let handle = state.pool.acquire(
        &state.story.objects,
        object_id,
        order,
        view.map(|view| (view, PositionMode::Snap)),
        now,
    );
    if let Some(evicted) = handle.evicted.as_deref() {
        state.nav.forget_object(evicted);
    }

    if handle.ready {
        state.nav.pending = None;
        activate(state, &handle.object_id);
    } else {
        let pending = PendingActivation {
            object_id: handle.object_id.clone(),
            container: handle.container,
            step_index,
            direction,
        };
        if let Some(previous) = state.nav.pending.replace(pending) {
            tracing::debug!(
                superseded = %previous.object_id,
                object_id = %handle.object_id,
                "pending activation replaced"
            );
        }
    }

    TransitionOutcome::Switched {
        object_id: handle.object_id,
        ready: handle.ready,
        created: handle.created,
        evicted: handle.evicted,
    }
}

/// Finish a deferred switch if `ready` is the card it waits for.
pub fn complete_pending<F: SurfaceFactory>(state: &mut RuntimeState<F>, ready: &ReadyCard) -> bool {
    let matches = state
        .nav
        .pending
        .as_ref()
        .is_some_and(|p| p.container == ready.container);
    if !matches {
        return false;
    }
    if let Some(pending) = state.nav.pending.take() {
        activate(state, &pending.object_id);
    }
    true
}

fn activate<F: SurfaceFactory>(state: &mut RuntimeState<F>, object_id: &str) {
    let key = object_key(object_id);
    if let Some(previous) = state.nav.active_object.take()
        && object_key(&previous) != key
    {
        state.pool.set_active(&previous, false);
    }
    state.pool.set_active(object_id, true);
    state.nav.active_object = Some(object_id.to_owned());
    tracing::debug!(object_id, "viewer card activated");
}

fn set_intro_visible<F: SurfaceFactory>(state: &mut RuntimeState<F>, visible: bool) -> bool {
    let was_visible = state.nav.intro_visible;
    if was_visible != visible {
        state.nav.intro_visible = visible;
        state.push_effect(PageEffect::IntroVisible { visible });
    }
    was_visible
}
