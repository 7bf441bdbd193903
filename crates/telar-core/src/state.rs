#![forbid(unsafe_code)]

//! The single runtime state store.
//!
//! [`RuntimeState`] is built once per story by the orchestrator and handed
//! to every component by `&mut`. There is no global lookup: the pool, the
//! panel stack and the navigation controller all see the same instance.
//!
//! Page-level presentation (step text, intro overlay, buttons, panels) is the
//! host's business. The runtime only queues [`PageEffect`]s describing what
//! changed; the host drains and renders them.

use serde::Serialize;

use crate::clock::DeterministicClock;
use crate::config::{PreloadConfig, RuntimeConfig};
use crate::model::Story;
use crate::navigation::{Direction, InputStrategy, NavigationState};
use crate::panel::{PanelLayer, PanelStack, PanelUpdate};
use crate::pool::ViewerPool;
use crate::preload::{ConnectionTier, ManifestPrefetch};
use crate::surface::SurfaceFactory;

/// A change the host should reflect on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEffect {
    StepChanged { index: usize, direction: Direction },
    /// Reveal the step's text. Emitted on forward moves only.
    ActivateStep { index: usize },
    IntroVisible { visible: bool },
    NavButtons { previous_enabled: bool, next_enabled: bool },
    PanelOpened { layer: PanelLayer, reference_id: String },
    PanelClosed { layer: PanelLayer, reference_id: String },
    ScrollLock { active: bool },
    StrategySelected { strategy: InputStrategy },
}

/// Where the runtime is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Protected story waiting for the unlock signal.
    AwaitingUnlock,
    /// Constructed; `initialize` has not run.
    Idle,
    Running,
    TornDown,
}

/// Everything the runtime mutates.
pub struct RuntimeState<F: SurfaceFactory> {
    pub story: Story,
    pub config: RuntimeConfig,
    pub clock: DeterministicClock,
    pub nav: NavigationState,
    pub panels: PanelStack,
    pub pool: ViewerPool<F>,
    /// Active warming window; retuned by the prefetch pass.
    pub preload: PreloadConfig,
    pub prefetch: ManifestPrefetch,
    pub connection: Option<ConnectionTier>,
    pub lifecycle: Lifecycle,
    effects: Vec<PageEffect>,
}

impl<F: SurfaceFactory> std::fmt::Debug for RuntimeState<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeState")
            .field("steps", &self.story.len())
            .field("nav", &self.nav)
            .field("panels", &self.panels)
            .field("pool", &self.pool)
            .field("lifecycle", &self.lifecycle)
            .field("effects", &self.effects.len())
            .finish_non_exhaustive()
    }
}

impl<F: SurfaceFactory> RuntimeState<F> {
    #[must_use]
    pub fn new(story: Story, config: RuntimeConfig, nav: NavigationState, factory: F) -> Self {
        let pool = ViewerPool::new(factory, &config);
        let lifecycle = if story.protected {
            Lifecycle::AwaitingUnlock
        } else {
            Lifecycle::Idle
        };
        Self {
            preload: config.preload,
            story,
            clock: DeterministicClock::new(),
            nav,
            panels: PanelStack::new(),
            pool,
            prefetch: ManifestPrefetch::default(),
            connection: None,
            lifecycle,
            effects: Vec::new(),
            config,
        }
    }

    pub fn push_effect(&mut self, effect: PageEffect) {
        self.effects.push(effect);
    }

    /// Take queued effects in emission order.
    pub fn drain_effects(&mut self) -> Vec<PageEffect> {
        std::mem::take(&mut self.effects)
    }

    #[must_use]
    pub fn pending_effects(&self) -> &[PageEffect] {
        &self.effects
    }

    /// Queue the effects of a panel stack change.
    pub fn record_panel_update(&mut self, update: PanelUpdate) {
        for entry in update.closed {
            self.effects.push(PageEffect::PanelClosed {
                layer: entry.layer,
                reference_id: entry.reference_id,
            });
        }
        if let Some(entry) = update.opened {
            self.effects.push(PageEffect::PanelOpened {
                layer: entry.layer,
                reference_id: entry.reference_id,
            });
        }
        if let Some(active) = update.lock_changed {
            self.effects.push(PageEffect::ScrollLock { active });
        }
    }

    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }
}
