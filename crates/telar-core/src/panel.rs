#![forbid(unsafe_code)]

//! Modal panel stack with its scroll-lock.
//!
//! Panels are stacked overlays: a first-level panel for the current step, a
//! second-level panel opened from inside it, and glossary panels that can sit
//! on top of either. Browsing is "drill in, step back": every close gesture
//! removes only the topmost entry.
//!
//! # Invariants
//!
//! 1. **Lock equivalence**: the scroll-lock is active iff the stack is
//!    non-empty, after every operation.
//! 2. **Single root**: the stack never holds two [`PanelLayer::Layer1`]
//!    entries. Opening one clears the stack to length 1.
//! 3. **LIFO**: `close_top` and outside clicks remove exactly the last entry.
//!
//! # Failure Modes
//!
//! - Closing an empty stack is a no-op and reports an empty [`PanelUpdate`].
//! - Re-opening the entry that is already on top is ignored, so a double
//!   click on a trigger does not stack duplicates.

use serde::{Deserialize, Serialize};

/// Which overlay level an entry occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelLayer {
    Layer1,
    Layer2,
    Glossary,
}

/// One open panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelEntry {
    pub layer: PanelLayer,
    pub reference_id: String,
}

impl PanelEntry {
    #[must_use]
    pub fn new(layer: PanelLayer, reference_id: impl Into<String>) -> Self {
        Self {
            layer,
            reference_id: reference_id.into(),
        }
    }
}

/// Where a click on the page landed, as classified by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickTarget {
    /// Inside any open panel.
    InsidePanel,
    /// On a control that opens a panel.
    Trigger,
    /// Anywhere else in the primary content area, including the blocking
    /// surface shown while locked.
    Outside,
}

/// What one stack operation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelUpdate {
    /// Entries removed, topmost first.
    pub closed: Vec<PanelEntry>,
    pub opened: Option<PanelEntry>,
    /// New scroll-lock state, when it changed.
    pub lock_changed: Option<bool>,
}

impl PanelUpdate {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.closed.is_empty() && self.opened.is_none() && self.lock_changed.is_none()
    }
}

/// LIFO stack of open panels plus the scroll-lock it owns.
#[derive(Debug, Clone, Default)]
pub struct PanelStack {
    entries: Vec<PanelEntry>,
    scroll_lock: bool,
}

impl PanelStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a panel.
    ///
    /// A first-level panel replaces the whole stack; deeper layers push.
    pub fn open(&mut self, layer: PanelLayer, reference_id: impl Into<String>) -> PanelUpdate {
        let entry = PanelEntry::new(layer, reference_id);
        if self.entries.last() == Some(&entry) {
            return PanelUpdate::default();
        }

        let mut update = PanelUpdate::default();
        if layer == PanelLayer::Layer1 {
            update.closed = self.entries.drain(..).rev().collect();
        }
        tracing::debug!(?layer, reference_id = %entry.reference_id, "panel opened");
        self.entries.push(entry.clone());
        update.opened = Some(entry);
        update.lock_changed = self.set_lock(true);
        self.debug_check();
        update
    }

    /// Remove the topmost entry. Unlocks only when the stack becomes empty.
    pub fn close_top(&mut self) -> PanelUpdate {
        let Some(entry) = self.entries.pop() else {
            return PanelUpdate::default();
        };
        tracing::debug!(layer = ?entry.layer, reference_id = %entry.reference_id, "panel closed");
        let lock_changed = if self.entries.is_empty() {
            self.set_lock(false)
        } else {
            None
        };
        self.debug_check();
        PanelUpdate {
            closed: vec![entry],
            opened: None,
            lock_changed,
        }
    }

    /// Clear everything and release the lock unconditionally.
    pub fn close_all(&mut self) -> PanelUpdate {
        let closed: Vec<PanelEntry> = self.entries.drain(..).rev().collect();
        if !closed.is_empty() {
            tracing::debug!(count = closed.len(), "all panels closed");
        }
        let lock_changed = self.set_lock(false);
        self.debug_check();
        PanelUpdate {
            closed,
            opened: None,
            lock_changed,
        }
    }

    /// Route a page click. Only outside clicks act, closing the top entry.
    pub fn handle_click(&mut self, target: ClickTarget) -> PanelUpdate {
        match target {
            ClickTarget::Outside => self.close_top(),
            ClickTarget::InsidePanel | ClickTarget::Trigger => PanelUpdate::default(),
        }
    }

    /// Whether navigation input is frozen.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.scroll_lock
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn top(&self) -> Option<&PanelEntry> {
        self.entries.last()
    }

    /// Entries bottom to top.
    #[must_use]
    pub fn entries(&self) -> &[PanelEntry] {
        &self.entries
    }

    fn set_lock(&mut self, active: bool) -> Option<bool> {
        let changed = self.scroll_lock != active;
        self.scroll_lock = active;
        changed.then_some(active)
    }

    fn debug_check(&self) {
        debug_assert_eq!(self.scroll_lock, !self.entries.is_empty());
        debug_assert!(
            self.entries
                .iter()
                .filter(|e| e.layer == PanelLayer::Layer1)
                .count()
                <= 1
        );
    }
}
