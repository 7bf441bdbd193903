#![forbid(unsafe_code)]

//! Story runtime orchestrator and its control surface.
//!
//! [`StoryRuntime`] owns the [`RuntimeState`] and is the only thing a host
//! talks to. Time is host-driven: the host calls [`StoryRuntime::advance_time`]
//! or [`StoryRuntime::set_time`] from its frame loop, which runs readiness
//! polling and completes deferred activations.
//!
//! # Lifecycle
//!
//! ```text
//! new ──► AwaitingUnlock ──unlock()──► Idle ──initialize()──► Running ──teardown()──► TornDown
//!   └──────────────(unprotected)──────► Idle
//! ```
//!
//! `unlock` initializes immediately, so a protected story starts exactly like
//! an unprotected one once the signal arrives.

use serde::Serialize;
use web_time::Duration;

use crate::clock::Timestamp;
use crate::config::{PreloadConfig, RuntimeConfig};
use crate::error::LifecycleError;
use crate::geometry::ViewSpec;
use crate::input::InputEvent;
use crate::model::Story;
use crate::navigation::{
    self, Direction, InputOutcome, InputStrategy, NavigationState, TransitionOutcome, ViewportInfo,
};
use crate::panel::{PanelEntry, PanelLayer, PanelUpdate};
use crate::pool::ReadyCard;
use crate::preload::{ConnectionTier, LatencySummary, ManifestPrefetch, PrefetchRequest};
use crate::state::{Lifecycle, PageEffect, RuntimeState};
use crate::surface::{ContainerId, SurfaceFactory};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Serializable view of one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardSnapshot {
    pub object_id: String,
    pub container: ContainerId,
    pub ready: bool,
    pub active: bool,
    pub stacking_order: u32,
    pub queued_position: bool,
}

/// Serializable view of the whole runtime, for hosts and debugging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeSnapshot {
    pub lifecycle: Lifecycle,
    pub current_index: Option<usize>,
    pub step_count: usize,
    pub strategy: InputStrategy,
    pub intro_visible: bool,
    pub active_object: Option<String>,
    pub pending_object: Option<String>,
    pub scroll_locked: bool,
    pub panels: Vec<PanelEntry>,
    /// Oldest first.
    pub cards: Vec<CardSnapshot>,
    pub preload: PreloadConfig,
    pub connection: Option<ConnectionTier>,
    pub now_ms: u64,
}

// ---------------------------------------------------------------------------
// StoryRuntime
// ---------------------------------------------------------------------------

/// One story's runtime.
pub struct StoryRuntime<F: SurfaceFactory> {
    state: RuntimeState<F>,
}

impl<F: SurfaceFactory> std::fmt::Debug for StoryRuntime<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryRuntime")
            .field("state", &self.state)
            .finish()
    }
}

impl<F: SurfaceFactory> StoryRuntime<F> {
    /// Build a runtime. Nothing is shown until [`initialize`](Self::initialize)
    /// (or [`unlock`](Self::unlock) for protected stories).
    #[must_use]
    pub fn new(story: Story, config: RuntimeConfig, factory: F, viewport: ViewportInfo) -> Self {
        let nav = NavigationState::new(viewport, &config.navigation);
        Self {
            state: RuntimeState::new(story, config, nav, factory),
        }
    }

    /// The external unlock signal for protected stories. Initializes.
    pub fn unlock(&mut self) -> Result<(), LifecycleError> {
        if self.state.lifecycle != Lifecycle::AwaitingUnlock {
            return Err(LifecycleError::NotLocked);
        }
        tracing::info!("story unlocked");
        self.state.lifecycle = Lifecycle::Idle;
        self.initialize()
    }

    /// Select the strategy, show the first step, warm its neighborhood and
    /// plan the manifest prefetch.
    pub fn initialize(&mut self) -> Result<(), LifecycleError> {
        match self.state.lifecycle {
            Lifecycle::AwaitingUnlock => return Err(LifecycleError::Locked),
            Lifecycle::Running => return Err(LifecycleError::AlreadyRunning),
            Lifecycle::TornDown => return Err(LifecycleError::TornDown),
            Lifecycle::Idle => {}
        }
        let state = &mut self.state;
        state.lifecycle = Lifecycle::Running;
        let strategy = state.nav.strategy();
        state.push_effect(PageEffect::StrategySelected { strategy });
        state.prefetch = ManifestPrefetch::plan(&state.story, &state.config.site);
        tracing::info!(
            steps = state.story.len(),
            objects = state.story.objects.len(),
            ?strategy,
            prefetch = state.prefetch.requests().len(),
            "story runtime initialized"
        );
        navigation::go_to_step(state, 0, Direction::Forward);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Control surface
    // -----------------------------------------------------------------------

    /// Jump to a step.
    pub fn go_to_step(&mut self, index: usize, direction: Direction) -> TransitionOutcome {
        if !self.state.is_running() {
            return TransitionOutcome::Inactive;
        }
        navigation::go_to_step(&mut self.state, index, direction)
    }

    /// Show `object_id` at a normalized position without changing the step.
    pub fn switch_to_object(
        &mut self,
        object_id: &str,
        step_index: Option<usize>,
        x: f64,
        y: f64,
        zoom: f64,
        direction: Direction,
    ) -> TransitionOutcome {
        if !self.state.is_running() {
            return TransitionOutcome::Inactive;
        }
        let view = ViewSpec::point(x, y, zoom);
        navigation::switch_to_object(&mut self.state, object_id, step_index, Some(view), direction)
    }

    /// Route one input event.
    pub fn handle_input(&mut self, event: InputEvent) -> InputOutcome {
        navigation::handle_input(&mut self.state, event)
    }

    pub fn open_panel(&mut self, layer: PanelLayer, reference_id: &str) -> PanelUpdate {
        let update = self.state.panels.open(layer, reference_id);
        self.state.record_panel_update(update.clone());
        update
    }

    pub fn close_top_panel(&mut self) -> PanelUpdate {
        let update = self.state.panels.close_top();
        self.state.record_panel_update(update.clone());
        update
    }

    /// Close every panel and release the scroll-lock.
    pub fn close_all_panels(&mut self) -> PanelUpdate {
        let update = self.state.panels.close_all();
        self.state.record_panel_update(update.clone());
        update
    }

    /// The page viewport changed size or mode.
    pub fn set_viewport(&mut self, viewport: ViewportInfo) {
        let state = &mut self.state;
        if let Some(strategy) = state.nav.reconfigure(viewport, &state.config.navigation) {
            tracing::debug!(?strategy, "input strategy changed");
            if state.is_running() {
                state.push_effect(PageEffect::StrategySelected { strategy });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Time and readiness
    // -----------------------------------------------------------------------

    /// Advance host time by `dt` and run due work.
    pub fn advance_time(&mut self, dt: Duration) -> Vec<ReadyCard> {
        self.state.clock.advance(dt);
        self.tick()
    }

    /// Set host time and run due work. Going backwards is ignored.
    pub fn set_time(&mut self, now: Timestamp) -> Vec<ReadyCard> {
        self.state.clock.set(now);
        self.tick()
    }

    /// Run readiness polling and complete deferred activations.
    pub fn tick(&mut self) -> Vec<ReadyCard> {
        if self.state.lifecycle == Lifecycle::TornDown {
            return Vec::new();
        }
        let now = self.state.clock.now();
        let ready = self.state.pool.poll(now);
        for card in &ready {
            navigation::complete_pending(&mut self.state, card);
        }
        ready
    }

    /// Event-driven readiness from a surface adapter.
    pub fn notify_surface_ready(&mut self, container: ContainerId) -> Option<ReadyCard> {
        let card = self.state.pool.notify_ready(container)?;
        navigation::complete_pending(&mut self.state, &card);
        Some(card)
    }

    // -----------------------------------------------------------------------
    // Manifest prefetch
    // -----------------------------------------------------------------------

    /// Manifests the host should fetch once at startup.
    #[must_use]
    pub fn prefetch_requests(&self) -> &[PrefetchRequest] {
        self.state.prefetch.requests()
    }

    /// Report a fetched manifest. Returns the connection tier once the last
    /// outstanding fetch is reported.
    pub fn report_prefetch_loaded(
        &mut self,
        object_id: &str,
        elapsed: Duration,
    ) -> Option<ConnectionTier> {
        if !self.state.prefetch.record_loaded(object_id, elapsed) {
            tracing::debug!(object_id, "prefetch report ignored");
            return None;
        }
        self.finish_prefetch_if_complete()
    }

    /// Report a failed manifest fetch.
    pub fn report_prefetch_failed(&mut self, object_id: &str) -> Option<ConnectionTier> {
        if !self.state.prefetch.record_failed(object_id) {
            return None;
        }
        self.finish_prefetch_if_complete()
    }

    fn finish_prefetch_if_complete(&mut self) -> Option<ConnectionTier> {
        let state = &mut self.state;
        if !state.prefetch.is_complete() || state.connection.is_some() {
            return None;
        }
        let summary: LatencySummary = state.prefetch.summary();
        let tier = summary.tier();
        let tuning = tier.tune(&state.config);
        state.preload = tuning.preload;
        state.pool.set_readiness_timeout(tuning.readiness_timeout);
        state.connection = Some(tier);
        tracing::info!(
            count = summary.count,
            failures = summary.failures,
            mean_ms = ?summary.mean.map(|d| d.as_millis()),
            max_ms = ?summary.max.map(|d| d.as_millis()),
            ?tier,
            steps_ahead = tuning.preload.steps_ahead,
            steps_behind = tuning.preload.steps_behind,
            "manifest prefetch complete"
        );
        Some(tier)
    }

    // -----------------------------------------------------------------------
    // Read access and teardown
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn state(&self) -> &RuntimeState<F> {
        &self.state
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lifecycle
    }

    /// Take queued page effects.
    pub fn drain_effects(&mut self) -> Vec<PageEffect> {
        self.state.drain_effects()
    }

    #[must_use]
    pub fn snapshot(&self) -> RuntimeSnapshot {
        let state = &self.state;
        RuntimeSnapshot {
            lifecycle: state.lifecycle,
            current_index: state.nav.current_index(),
            step_count: state.story.len(),
            strategy: state.nav.strategy(),
            intro_visible: state.nav.intro_visible(),
            active_object: state.nav.active_object().map(str::to_owned),
            pending_object: state.nav.pending().map(|p| p.object_id.clone()),
            scroll_locked: state.panels.is_locked(),
            panels: state.panels.entries().to_vec(),
            cards: state
                .pool
                .cards()
                .into_iter()
                .map(|card| CardSnapshot {
                    object_id: card.object_id().to_owned(),
                    container: card.container(),
                    ready: card.is_ready(),
                    active: card.is_active(),
                    stacking_order: card.stacking_order(),
                    queued_position: card.has_queued_position(),
                })
                .collect(),
            preload: state.preload,
            connection: state.connection,
            now_ms: u64::try_from(state.clock.now().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Release every surface and stop reacting to input.
    pub fn teardown(&mut self) {
        if self.state.lifecycle == Lifecycle::TornDown {
            return;
        }
        let update = self.state.panels.close_all();
        self.state.record_panel_update(update);
        self.state.pool.teardown();
        self.state.lifecycle = Lifecycle::TornDown;
        tracing::info!("story runtime torn down");
    }
}

impl<F: SurfaceFactory> Drop for StoryRuntime<F> {
    fn drop(&mut self) {
        self.teardown();
    }
}
