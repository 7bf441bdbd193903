#![forbid(unsafe_code)]

//! Bounded pool of viewer cards, one per distinct object.
//!
//! A card pairs a host [`RenderSurface`] with the bookkeeping the runtime
//! needs: creation sequence, readiness, a queued position, the readiness
//! watch's cancellation handle. Cards are created on demand, reused by object
//! identifier and evicted oldest-first when capacity would be exceeded.
//!
//! # Invariants
//!
//! 1. **Bound**: `len() <= capacity()` after every operation.
//! 2. **Uniqueness**: at most one card per normalized object identifier.
//! 3. **Queue-or-apply**: a position aimed at a card that cannot take
//!    commands yet is queued and applied exactly once, on readiness or, for a
//!    card that timed out without a viewport, on the first poll that finds
//!    one. A later position supersedes it; eviction drops it.
//! 4. **Release**: every evicted card has its surface released through the
//!    factory and its readiness watch cancelled.
//!
//! # Failure Modes
//!
//! - Unknown object identifiers still get a card; the manifest URL falls back
//!   to the site-local layout and a warning is logged.
//! - Invalid geometry (non-finite coordinates, degenerate regions) skips the
//!   position command with a warning. Nothing is thrown at the host.
//! - A surface that never reports a viewport is treated as ready once the
//!   readiness timeout elapses. Its queued position stays queued until a
//!   viewport shows up.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use web_time::Duration;

use crate::cancellation::CancellationSource;
use crate::clock::Timestamp;
use crate::config::{RuntimeConfig, SiteConfig};
use crate::geometry::ViewSpec;
use crate::model::{ObjectIndex, object_key};
use crate::readiness::{Readiness, ReadinessWatches};
use crate::surface::{
    AnimationParams, ContainerId, Motion, RenderSurface, SurfaceFactory, SurfaceRequest,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a position is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionMode {
    /// Jump without animation. Used on first appearance and object switches.
    Snap,
    /// Animate from the current view. Used between steps on the same object.
    Animate,
}

/// Result of asking the pool to position a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionOutcome {
    /// Commands were sent to the surface.
    Applied,
    /// The surface cannot take commands yet; the position waits.
    Queued,
    /// Geometry could not be resolved; nothing was sent.
    Skipped,
    /// No card exists for the object.
    NoCard,
}

/// Why a preload was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRejection {
    /// The pool is full and every card is active or pinned.
    Saturated,
}

/// Summary of an `acquire` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardHandle {
    pub object_id: String,
    pub container: ContainerId,
    pub ready: bool,
    /// A new card was created (rather than reused).
    pub created: bool,
    /// Object whose card was evicted to make room.
    pub evicted: Option<String>,
    /// What happened to the requested position, if any.
    pub position: Option<PositionOutcome>,
}

/// A card that just became ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyCard {
    pub object_id: String,
    pub container: ContainerId,
    pub readiness: Readiness,
    /// Outcome of the queued position applied on readiness.
    pub position: Option<PositionOutcome>,
}

#[derive(Debug, Clone, Copy)]
struct QueuedPosition {
    spec: ViewSpec,
    mode: PositionMode,
}

/// One pooled viewer.
pub struct ViewerCard<S> {
    object_id: String,
    container: ContainerId,
    surface: S,
    ready: bool,
    positioned: bool,
    active: bool,
    pending: Option<QueuedPosition>,
    stacking_order: u32,
    sequence: u64,
    watch: CancellationSource,
}

impl<S> ViewerCard<S> {
    #[must_use]
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    #[inline]
    #[must_use]
    pub fn container(&self) -> ContainerId {
        self.container
    }

    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether a position has ever been applied to the surface.
    #[inline]
    #[must_use]
    pub fn is_positioned(&self) -> bool {
        self.positioned
    }

    #[inline]
    #[must_use]
    pub fn has_queued_position(&self) -> bool {
        self.pending.is_some()
    }

    #[inline]
    #[must_use]
    pub fn stacking_order(&self) -> u32 {
        self.stacking_order
    }

    /// Monotonic creation sequence; lower is older.
    #[inline]
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn surface(&self) -> &S {
        &self.surface
    }
}

impl<S> std::fmt::Debug for ViewerCard<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerCard")
            .field("object_id", &self.object_id)
            .field("container", &self.container)
            .field("ready", &self.ready)
            .field("active", &self.active)
            .field("pending", &self.pending)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Manifest resolution
// ---------------------------------------------------------------------------

/// Manifest URL for an object: its external source when the record names
/// one, the site-local layout otherwise.
#[must_use]
pub fn manifest_url(objects: &ObjectIndex, site: &SiteConfig, object_id: &str) -> String {
    match objects.get(object_id) {
        Some(record) => record
            .external_manifest()
            .map_or_else(|| site.local_manifest_url(&record.object_id), str::to_owned),
        None => {
            tracing::warn!(object_id, "object not found in index; using site-local manifest");
            site.local_manifest_url(object_id)
        }
    }
}

// ---------------------------------------------------------------------------
// ViewerPool
// ---------------------------------------------------------------------------

/// Bounded set of viewer cards keyed by object.
pub struct ViewerPool<F: SurfaceFactory> {
    factory: F,
    cards: HashMap<String, ViewerCard<F::Surface>>,
    by_container: HashMap<ContainerId, String>,
    watches: ReadinessWatches,
    capacity: usize,
    animation: AnimationParams,
    site: SiteConfig,
    next_sequence: u64,
}

impl<F: SurfaceFactory> std::fmt::Debug for ViewerPool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerPool")
            .field("cards", &self.cards.len())
            .field("capacity", &self.capacity)
            .field("watches", &self.watches.len())
            .field("next_sequence", &self.next_sequence)
            .finish_non_exhaustive()
    }
}

impl<F: SurfaceFactory> ViewerPool<F> {
    #[must_use]
    pub fn new(factory: F, config: &RuntimeConfig) -> Self {
        Self {
            factory,
            cards: HashMap::new(),
            by_container: HashMap::new(),
            watches: ReadinessWatches::new(
                config.pool.readiness_poll_interval(),
                config.pool.readiness_timeout(),
            ),
            capacity: config.pool.max_cards.max(1),
            animation: AnimationParams {
                duration: config.motion.animation_duration(),
                spring_stiffness: config.motion.spring_stiffness,
            },
            site: config.site.clone(),
            next_sequence: 0,
        }
    }

    /// Get or create the card for `object_id`.
    ///
    /// An existing card takes the new stacking order and, when `target` is
    /// given, is positioned now (ready) or has the position queued. A new
    /// card may evict the oldest card to stay within capacity.
    pub fn acquire(
        &mut self,
        objects: &ObjectIndex,
        object_id: &str,
        stacking_order: u32,
        target: Option<(ViewSpec, PositionMode)>,
        now: Timestamp,
    ) -> CardHandle {
        let key = object_key(object_id);
        let animation = self.animation;
        if let Some(card) = self.cards.get_mut(&key) {
            card.stacking_order = stacking_order;
            card.surface.set_stacking_order(stacking_order);
            let position = target.map(|(spec, mode)| position_card(card, spec, mode, animation));
            return CardHandle {
                object_id: card.object_id.clone(),
                container: card.container,
                ready: card.ready,
                created: false,
                evicted: None,
                position,
            };
        }

        let evicted = if self.cards.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };
        let mut handle = self.create(objects, object_id, key, stacking_order, target, now);
        handle.evicted = evicted;
        handle
    }

    /// Create a card ahead of need.
    ///
    /// Existing cards are left untouched so a preload never repositions a
    /// card the reader is looking at. A full pool gives up its oldest idle
    /// card: one that is not active and whose key is not in `pinned`.
    pub fn try_preload(
        &mut self,
        objects: &ObjectIndex,
        object_id: &str,
        target: Option<ViewSpec>,
        pinned: &HashSet<String>,
        now: Timestamp,
    ) -> Result<CardHandle, PoolRejection> {
        let key = object_key(object_id);
        if let Some(card) = self.cards.get(&key) {
            return Ok(CardHandle {
                object_id: card.object_id.clone(),
                container: card.container,
                ready: card.ready,
                created: false,
                evicted: None,
                position: None,
            });
        }
        let evicted = if self.cards.len() >= self.capacity {
            let Some(evicted) = self.evict_oldest_idle(pinned) else {
                tracing::debug!(object_id, capacity = self.capacity, "preload skipped; pool saturated");
                return Err(PoolRejection::Saturated);
            };
            Some(evicted)
        } else {
            None
        };
        let target = target.map(|spec| (spec, PositionMode::Snap));
        let mut handle = self.create(objects, object_id, key, 0, target, now);
        handle.evicted = evicted;
        Ok(handle)
    }

    fn create(
        &mut self,
        objects: &ObjectIndex,
        object_id: &str,
        key: String,
        stacking_order: u32,
        target: Option<(ViewSpec, PositionMode)>,
        now: Timestamp,
    ) -> CardHandle {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let container = ContainerId::new(sequence);
        let url = manifest_url(objects, &self.site, object_id);

        let mut surface = self.factory.create(SurfaceRequest {
            container,
            object_id,
            manifest_url: &url,
        });
        surface.set_stacking_order(stacking_order);

        let mut card = ViewerCard {
            object_id: object_id.to_owned(),
            container,
            ready: false,
            positioned: false,
            active: false,
            pending: target.map(|(spec, mode)| QueuedPosition { spec, mode }),
            stacking_order,
            sequence,
            watch: CancellationSource::new(),
            surface,
        };
        tracing::debug!(object_id, %container, manifest_url = %url, "viewer card created");

        // Surfaces that come up synchronously skip the watch entirely.
        let mut position = card.pending.is_some().then_some(PositionOutcome::Queued);
        if card.surface.viewport().is_some() {
            position = mark_ready(&mut card, self.animation).or(position);
        } else {
            self.watches.start(
                container,
                now,
                card.surface.signals_readiness(),
                card.watch.token(),
            );
        }

        let handle = CardHandle {
            object_id: card.object_id.clone(),
            container,
            ready: card.ready,
            created: true,
            evicted: None,
            position,
        };
        self.by_container.insert(container, key.clone());
        self.cards.insert(key, card);
        self.debug_check();
        handle
    }

    /// Position the card for `object_id`, now or on readiness.
    pub fn apply_position(
        &mut self,
        object_id: &str,
        spec: ViewSpec,
        mode: PositionMode,
    ) -> PositionOutcome {
        let animation = self.animation;
        match self.cards.get_mut(&object_key(object_id)) {
            Some(card) => position_card(card, spec, mode, animation),
            None => PositionOutcome::NoCard,
        }
    }

    /// Show or demote the card for `object_id`. Returns false without a card.
    pub fn set_active(&mut self, object_id: &str, active: bool) -> bool {
        let Some(card) = self.cards.get_mut(&object_key(object_id)) else {
            return false;
        };
        if card.active != active {
            card.active = active;
            card.surface.set_active(active);
        }
        true
    }

    /// Event-driven readiness for one container. Resolves at most once.
    pub fn notify_ready(&mut self, container: ContainerId) -> Option<ReadyCard> {
        if !self.watches.resolve(container) {
            tracing::debug!(%container, "readiness notification for unknown or resolved container");
            return None;
        }
        self.resolve_card(container, Readiness::Ready)
    }

    /// Run due readiness polls and timeouts, then apply positions that were
    /// waiting on a late viewport.
    pub fn poll(&mut self, now: Timestamp) -> Vec<ReadyCard> {
        let cards = &self.cards;
        let by_container = &self.by_container;
        let resolved = self.watches.poll(now, |container| {
            by_container
                .get(&container)
                .and_then(|key| cards.get(key))
                .is_some_and(|card| card.surface.viewport().is_some())
        });
        let ready = resolved
            .into_iter()
            .filter_map(|(container, readiness)| self.resolve_card(container, readiness))
            .collect();
        self.apply_deferred();
        ready
    }

    fn apply_deferred(&mut self) {
        let animation = self.animation;
        for card in self.cards.values_mut() {
            if !card.ready || card.surface.viewport().is_none() {
                continue;
            }
            if let Some(queued) = card.pending.take() {
                let outcome = apply_now(card, queued.spec, queued.mode, animation);
                tracing::debug!(object_id = %card.object_id, ?outcome, "late viewport; queued position applied");
            }
        }
    }

    fn resolve_card(&mut self, container: ContainerId, readiness: Readiness) -> Option<ReadyCard> {
        let key = self.by_container.get(&container)?;
        let card = self.cards.get_mut(key)?;
        if readiness == Readiness::TimedOut {
            tracing::warn!(
                object_id = %card.object_id,
                %container,
                "surface readiness timed out; treating as ready"
            );
        }
        let position = mark_ready(card, self.animation);
        Some(ReadyCard {
            object_id: card.object_id.clone(),
            container,
            readiness,
            position,
        })
    }

    /// Evict the card with the lowest creation sequence.
    pub fn evict_oldest(&mut self) -> Option<String> {
        let key = self
            .cards
            .iter()
            .min_by_key(|(_, card)| card.sequence)
            .map(|(key, _)| key.clone())?;
        self.release(&key)
    }

    /// Evict the oldest card that is not active and not keyed in `pinned`.
    pub fn evict_oldest_idle(&mut self, pinned: &HashSet<String>) -> Option<String> {
        let key = self
            .cards
            .iter()
            .filter(|(key, card)| !card.active && !pinned.contains(*key))
            .min_by_key(|(_, card)| card.sequence)
            .map(|(key, _)| key.clone())?;
        self.release(&key)
    }

    fn release(&mut self, key: &str) -> Option<String> {
        let card = self.cards.remove(key)?;
        self.by_container.remove(&card.container);
        card.watch.cancel();
        self.watches.resolve(card.container);
        if card.pending.is_some() {
            tracing::debug!(object_id = %card.object_id, "queued position dropped with evicted card");
        }
        tracing::debug!(object_id = %card.object_id, container = %card.container, "viewer card evicted");
        self.factory.release(card.container, card.surface);
        Some(card.object_id)
    }

    /// Release every card.
    pub fn teardown(&mut self) {
        let keys: Vec<String> = self.cards.keys().cloned().collect();
        for key in keys {
            self.release(&key);
        }
        self.debug_check();
    }

    /// Readiness timeout used for cards created from now on.
    pub fn set_readiness_timeout(&mut self, timeout: Duration) {
        self.watches.set_timeout(timeout);
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn contains(&self, object_id: &str) -> bool {
        self.cards.contains_key(&object_key(object_id))
    }

    #[must_use]
    pub fn card(&self, object_id: &str) -> Option<&ViewerCard<F::Surface>> {
        self.cards.get(&object_key(object_id))
    }

    #[must_use]
    pub fn card_by_container(&self, container: ContainerId) -> Option<&ViewerCard<F::Surface>> {
        self.by_container
            .get(&container)
            .and_then(|key| self.cards.get(key))
    }

    #[must_use]
    pub fn is_ready(&self, object_id: &str) -> bool {
        self.card(object_id).is_some_and(ViewerCard::is_ready)
    }

    /// Cards oldest first.
    #[must_use]
    pub fn cards(&self) -> Vec<&ViewerCard<F::Surface>> {
        let mut cards: Vec<_> = self.cards.values().collect();
        cards.sort_by_key(|card| card.sequence);
        cards
    }

    /// Number of readiness watches still in flight.
    #[must_use]
    pub fn pending_watches(&self) -> usize {
        self.watches.len()
    }

    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    fn debug_check(&self) {
        debug_assert!(self.cards.len() <= self.capacity);
        debug_assert_eq!(self.cards.len(), self.by_container.len());
    }
}

// ---------------------------------------------------------------------------
// Card positioning
// ---------------------------------------------------------------------------

fn position_card<S: RenderSurface>(
    card: &mut ViewerCard<S>,
    spec: ViewSpec,
    mode: PositionMode,
    animation: AnimationParams,
) -> PositionOutcome {
    if card.ready && card.surface.viewport().is_some() {
        return apply_now(card, spec, mode, animation);
    }
    // A later request supersedes the queued one, but a snap already owed to
    // an unpositioned card is kept.
    let mode = match card.pending {
        Some(QueuedPosition {
            mode: PositionMode::Snap,
            ..
        }) => PositionMode::Snap,
        _ => mode,
    };
    card.pending = Some(QueuedPosition { spec, mode });
    PositionOutcome::Queued
}

fn mark_ready<S: RenderSurface>(
    card: &mut ViewerCard<S>,
    animation: AnimationParams,
) -> Option<PositionOutcome> {
    card.ready = true;
    tracing::debug!(object_id = %card.object_id, container = %card.container, "viewer card ready");
    if card.surface.viewport().is_none() {
        let kept = card.pending.is_some();
        if kept {
            tracing::debug!(object_id = %card.object_id, "no viewport yet; queued position kept");
        }
        return kept.then_some(PositionOutcome::Queued);
    }
    let queued = card.pending.take()?;
    Some(apply_now(card, queued.spec, queued.mode, animation))
}

fn apply_now<S: RenderSurface>(
    card: &mut ViewerCard<S>,
    spec: ViewSpec,
    mode: PositionMode,
    animation: AnimationParams,
) -> PositionOutcome {
    let Some(viewport) = card.surface.viewport() else {
        tracing::warn!(object_id = %card.object_id, "surface has no viewport; position skipped");
        return PositionOutcome::Skipped;
    };
    let Some(target) = spec.resolve(&viewport) else {
        tracing::warn!(object_id = %card.object_id, ?spec, "invalid geometry; position skipped");
        return PositionOutcome::Skipped;
    };
    let motion = match mode {
        PositionMode::Animate if card.positioned => Motion::Animated(animation),
        _ => Motion::Immediate,
    };
    card.surface.pan_to(target.point, motion);
    card.surface.zoom_to(target.zoom, target.point, motion);
    card.positioned = true;
    PositionOutcome::Applied
}
