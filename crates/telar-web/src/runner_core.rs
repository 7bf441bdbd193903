#![forbid(unsafe_code)]

//! Platform-independent runner core wrapping [`StoryRuntime`].
//!
//! This module contains the logic shared between the wasm-bindgen exports
//! and the native test harness. No JS/WASM types here: everything crossing
//! the boundary is JSON text, plain numbers, or small serializable reports.

use serde::Serialize;
use web_time::Duration;

use telar_core::input::{InputEvent, NavKey};
use telar_core::model::Story;
use telar_core::navigation::{
    Direction, IgnoreReason, InputOutcome, TransitionOutcome, ViewportInfo,
};
use telar_core::panel::{PanelLayer, PanelUpdate};
use telar_core::pool::PositionOutcome;
use telar_core::preload::ConnectionTier;
use telar_core::surface::{ContainerId, SurfaceFactory};
use telar_core::{LoadError, RuntimeConfig, StoryRuntime};

/// Everything needed to build a runner, as the site build emits it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerInput<'a> {
    pub steps_json: &'a str,
    pub objects_json: &'a str,
    /// Partial config overrides; `None` or blank uses the defaults.
    pub config_json: Option<&'a str>,
    pub viewport_json: &'a str,
    pub protected: bool,
}

/// JS-facing summary of one input or control call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputReport {
    /// `navigated`, `absorbed`, `panels` or `ignored`.
    pub outcome: &'static str,
    pub transition: Option<&'static str>,
    pub reason: Option<&'static str>,
}

impl InputReport {
    fn from_outcome(outcome: &InputOutcome) -> Self {
        match outcome {
            InputOutcome::Navigated(transition) => Self {
                outcome: "navigated",
                transition: Some(transition_label(transition)),
                reason: None,
            },
            InputOutcome::Absorbed => Self {
                outcome: "absorbed",
                transition: None,
                reason: None,
            },
            InputOutcome::Panels => Self {
                outcome: "panels",
                transition: None,
                reason: None,
            },
            InputOutcome::Ignored(reason) => Self {
                outcome: "ignored",
                transition: None,
                reason: Some(ignore_reason_label(*reason)),
            },
        }
    }

    /// Whether the event did anything.
    #[must_use]
    pub fn accepted(&self) -> bool {
        self.outcome != "ignored"
    }
}

/// Stable label for a transition outcome.
#[must_use]
pub fn transition_label(outcome: &TransitionOutcome) -> &'static str {
    match outcome {
        TransitionOutcome::Inactive => "inactive",
        TransitionOutcome::OutOfRange => "out_of_range",
        TransitionOutcome::Intro => "intro",
        TransitionOutcome::Repositioned(position) => match position {
            PositionOutcome::Applied => "repositioned",
            PositionOutcome::Queued => "reposition_queued",
            PositionOutcome::Skipped => "reposition_skipped",
            PositionOutcome::NoCard => "no_card",
        },
        TransitionOutcome::Switched { ready: true, .. } => "switched",
        TransitionOutcome::Switched { ready: false, .. } => "switch_pending",
        TransitionOutcome::NoObject => "no_object",
    }
}

const fn ignore_reason_label(reason: IgnoreReason) -> &'static str {
    match reason {
        IgnoreReason::NotRunning => "not_running",
        IgnoreReason::ScrollLocked => "scroll_locked",
        IgnoreReason::Cooldown => "cooldown",
        IgnoreReason::Strategy => "strategy",
        IgnoreReason::OverSurface => "over_surface",
        IgnoreReason::BelowThreshold => "below_threshold",
        IgnoreReason::Embedded => "embedded",
        IgnoreReason::Boundary => "boundary",
        IgnoreReason::Unbound => "unbound",
    }
}

/// Stable label for a connection tier.
#[must_use]
pub const fn tier_label(tier: ConnectionTier) -> &'static str {
    match tier {
        ConnectionTier::Fast => "fast",
        ConnectionTier::Moderate => "moderate",
        ConnectionTier::Slow => "slow",
    }
}

/// Parse a panel layer name (`layer1`, `layer2`, `glossary`).
#[must_use]
pub fn parse_layer(name: &str) -> Option<PanelLayer> {
    serde_json::from_value(serde_json::Value::String(name.trim().to_ascii_lowercase())).ok()
}

const fn direction(forward: bool) -> Direction {
    if forward {
        Direction::Forward
    } else {
        Direction::Backward
    }
}

/// Host milliseconds to a duration. Non-finite and negative input is zero.
fn millis(ms: f64) -> Duration {
    if !ms.is_finite() || ms <= 0.0 {
        return Duration::ZERO;
    }
    let max_secs = Duration::MAX.as_secs_f64();
    let secs = (ms / 1000.0).min(max_secs);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Platform-independent story runner.
pub struct RunnerCore<F: SurfaceFactory> {
    runtime: StoryRuntime<F>,
}

impl<F: SurfaceFactory> RunnerCore<F> {
    /// Parse and validate story, config and viewport, then build the runtime.
    pub fn new(factory: F, input: RunnerInput<'_>) -> Result<Self, LoadError> {
        let story = Story::from_json(input.steps_json, input.objects_json)?
            .protected(input.protected);
        let config = match input.config_json.map(str::trim) {
            Some(json) if !json.is_empty() => RuntimeConfig::from_json_str(json)?,
            _ => RuntimeConfig::default(),
        };
        let viewport: ViewportInfo = serde_json::from_str(input.viewport_json)?;
        Ok(Self {
            runtime: StoryRuntime::new(story, config, factory, viewport),
        })
    }

    /// Show the first step. Returns `false` if the story is locked, already
    /// running, or torn down.
    pub fn init(&mut self) -> bool {
        match self.runtime.initialize() {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(%err, "init rejected");
                false
            }
        }
    }

    /// Deliver the unlock signal for a protected story.
    pub fn unlock(&mut self) -> bool {
        match self.runtime.unlock() {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(%err, "unlock rejected");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// Advance the deterministic clock by `dt_ms` milliseconds.
    pub fn advance_time_ms(&mut self, dt_ms: f64) {
        // Host input can be noisy (NaN/inf/negative spikes).
        if !dt_ms.is_finite() || dt_ms <= 0.0 {
            return;
        }
        self.runtime.advance_time(millis(dt_ms));
    }

    /// Set the deterministic clock to absolute milliseconds since start.
    pub fn set_time_ms(&mut self, ts_ms: f64) {
        self.runtime.set_time(millis(ts_ms));
    }

    /// Set the clock from an elapsed duration (the wasm frame loop's path).
    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.runtime.set_time(elapsed);
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    /// Parse a JSON-encoded input event and route it.
    ///
    /// Returns `None` if the JSON is malformed or names an unknown event.
    pub fn push_input_json(&mut self, json: &str) -> Option<InputReport> {
        let event: InputEvent = match serde_json::from_str(json) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(%err, "malformed input event");
                return None;
            }
        };
        Some(self.push_input(event))
    }

    /// Route a DOM `KeyboardEvent.key` value. `None` for keys with no binding.
    pub fn push_dom_key(&mut self, key: &str) -> Option<InputReport> {
        NavKey::from_dom_key(key).map(|key| self.push_input(InputEvent::key(key)))
    }

    pub fn push_input(&mut self, event: InputEvent) -> InputReport {
        InputReport::from_outcome(&self.runtime.handle_input(event))
    }

    /// Apply a new page viewport from JSON. Returns `false` on malformed input.
    pub fn set_viewport_json(&mut self, json: &str) -> bool {
        match serde_json::from_str::<ViewportInfo>(json) {
            Ok(viewport) => {
                self.runtime.set_viewport(viewport);
                true
            }
            Err(err) => {
                tracing::debug!(%err, "malformed viewport");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Control surface
    // -----------------------------------------------------------------------

    pub fn go_to_step(&mut self, index: usize, forward: bool) -> &'static str {
        transition_label(&self.runtime.go_to_step(index, direction(forward)))
    }

    pub fn switch_to_object(
        &mut self,
        object_id: &str,
        x: f64,
        y: f64,
        zoom: f64,
        forward: bool,
    ) -> &'static str {
        let outcome =
            self.runtime
                .switch_to_object(object_id, None, x, y, zoom, direction(forward));
        transition_label(&outcome)
    }

    /// Open a panel by layer name. `None` for unknown layers.
    pub fn open_panel(&mut self, layer: &str, reference_id: &str) -> Option<PanelUpdate> {
        let Some(layer) = parse_layer(layer) else {
            tracing::debug!(layer, "unknown panel layer");
            return None;
        };
        Some(self.runtime.open_panel(layer, reference_id))
    }

    pub fn close_top_panel(&mut self) -> PanelUpdate {
        self.runtime.close_top_panel()
    }

    pub fn close_all_panels(&mut self) -> PanelUpdate {
        self.runtime.close_all_panels()
    }

    /// The adapter for `container` reported readiness.
    pub fn notify_surface_ready(&mut self, container: u64) -> bool {
        self.runtime
            .notify_surface_ready(ContainerId::new(container))
            .is_some()
    }

    // -----------------------------------------------------------------------
    // Manifest prefetch
    // -----------------------------------------------------------------------

    pub fn prefetch_requests_json(&self) -> Result<String, String> {
        serde_json::to_string(self.runtime.prefetch_requests())
            .map_err(|err| format!("prefetch request encode failed: {err}"))
    }

    /// Returns the tier label once the last outstanding fetch is reported.
    pub fn report_prefetch_loaded(&mut self, object_id: &str, elapsed_ms: f64) -> Option<&'static str> {
        self.runtime
            .report_prefetch_loaded(object_id, millis(elapsed_ms))
            .map(tier_label)
    }

    pub fn report_prefetch_failed(&mut self, object_id: &str) -> Option<&'static str> {
        self.runtime
            .report_prefetch_failed(object_id)
            .map(tier_label)
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// Drain queued page effects as a JSON array.
    pub fn take_effects_json(&mut self) -> Result<String, String> {
        let effects = self.runtime.drain_effects();
        serde_json::to_string(&effects).map_err(|err| format!("effect encode failed: {err}"))
    }

    pub fn snapshot_json(&self) -> Result<String, String> {
        serde_json::to_string(&self.runtime.snapshot())
            .map_err(|err| format!("snapshot encode failed: {err}"))
    }

    pub fn teardown(&mut self) {
        self.runtime.teardown();
    }

    #[must_use]
    pub fn runtime(&self) -> &StoryRuntime<F> {
        &self.runtime
    }
}
